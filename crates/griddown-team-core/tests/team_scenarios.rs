//! Multi-node team scenarios
//!
//! Each test wires two or three engines together through recording
//! transports and relays envelopes by hand.
//!
//! ## What These Tests Verify
//!
//! - Join by invite code and by encrypted package
//! - Leader handoff on leave and on promotion keeps exactly one leader
//! - Removal and dissolution tear down the remote record
//! - Rally, comm plan and team info changes converge
//! - Broadcasts are dropped, not queued, while disconnected

mod common;

use std::sync::Arc;

use common::{relay, CapturingMirror, FailingStore, Node, TEST_KDF_ITERATIONS};
use griddown_team_core::permissions::has_permission;
use griddown_team_core::sync::SyncSubtype;
use griddown_team_core::{
    CheckIn, CheckInFrequency, ConnectionState, EngineConfig, IgnoreReason, InboundOutcome,
    MemberId, MemoryStore, NewRallyPoint, NewTeam, PackageOptions, Permission, RallyType,
    RedbStore, Role, TeamEngine, TeamError, TeamEvent, TeamInfoUpdate, TeamSettings,
};
use tempfile::tempdir;

/// Bring `joiner` into `leader`'s team via invite code and exchange rosters
async fn join_by_invite(leader: &mut Node, joiner: &mut Node, name: &str) {
    let code = leader.engine.invite_code().unwrap();
    joiner.engine.join(&code, None, name).await.unwrap();

    // member_joined → leader, leader's member_update → joiner
    relay(joiner, &mut [&mut *leader]).await;
    relay(leader, &mut [&mut *joiner]).await;
}

fn leader_count(node: &Node) -> usize {
    node.engine.team().unwrap().leader_count()
}

#[tokio::test]
async fn test_leave_hands_leadership_to_co_leader() {
    let mut alpha = Node::leader("alpha", "Ridge Runners").await;
    let mut bravo = Node::new("bravo");

    join_by_invite(&mut alpha, &mut bravo, "Bravo").await;
    assert_eq!(bravo.engine.my_role(), Some(Role::Support));
    assert_eq!(alpha.engine.team().unwrap().members.len(), 2);
    assert_eq!(bravo.engine.team().unwrap().members.len(), 2);

    alpha
        .engine
        .set_member_role(&MemberId::from("bravo"), Role::CoLeader)
        .await
        .unwrap();
    relay(&alpha, &mut [&mut bravo]).await;
    assert_eq!(bravo.engine.my_role(), Some(Role::CoLeader));

    alpha.engine.leave().await.unwrap();
    assert!(!alpha.engine.is_in_team());

    let outcomes = relay(&alpha, &mut [&mut bravo]).await;
    assert_eq!(
        outcomes,
        vec![
            InboundOutcome::Applied(SyncSubtype::MemberUpdate),
            InboundOutcome::Applied(SyncSubtype::MemberLeft),
        ]
    );

    let team = bravo.engine.team().unwrap();
    assert_eq!(team.members.len(), 1);
    assert_eq!(bravo.engine.my_role(), Some(Role::Leader));
    assert_eq!(leader_count(&bravo), 1);
}

#[tokio::test]
async fn test_leave_without_co_leader_picks_earliest_joined() {
    let mut alpha = Node::leader("alpha", "Ridge").await;
    let mut bravo = Node::new("bravo");
    let mut charlie = Node::new("charlie");

    join_by_invite(&mut alpha, &mut bravo, "Bravo").await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    join_by_invite(&mut alpha, &mut charlie, "Charlie").await;

    alpha.engine.leave().await.unwrap();
    relay(&alpha, &mut [&mut bravo, &mut charlie]).await;

    assert_eq!(bravo.engine.my_role(), Some(Role::Leader));
    assert_eq!(leader_count(&bravo), 1);
}

#[tokio::test]
async fn test_promoting_new_leader_demotes_previous() {
    let mut alpha = Node::leader("alpha", "Ridge").await;
    let mut bravo = Node::new("bravo");
    join_by_invite(&mut alpha, &mut bravo, "Bravo").await;

    alpha
        .engine
        .set_member_role(&MemberId::from("bravo"), Role::Leader)
        .await
        .unwrap();
    assert_eq!(alpha.engine.my_role(), Some(Role::CoLeader));
    assert_eq!(leader_count(&alpha), 1);

    relay(&alpha, &mut [&mut bravo]).await;
    assert_eq!(bravo.engine.my_role(), Some(Role::Leader));
    assert_eq!(
        bravo.engine.team().unwrap().role_of(&MemberId::from("alpha")),
        Some(Role::CoLeader)
    );
    assert_eq!(leader_count(&bravo), 1);
}

#[tokio::test]
async fn test_join_by_encrypted_package() {
    let mut alpha = Node::leader("alpha", "Ridge").await;
    alpha
        .engine
        .add_rally_point(NewRallyPoint::new("Trailhead", RallyType::Primary, 39.7, -105.5))
        .await
        .unwrap();

    let passphrase = alpha.engine.team().unwrap().passphrase.clone().unwrap();
    let package = alpha
        .engine
        .export_package(PackageOptions::full())
        .await
        .unwrap();
    assert!(package.file_name().ends_with(".gdteam"));
    let json = package.to_json().unwrap();

    let mut bravo = Node::new("bravo");
    assert!(matches!(
        bravo.engine.join(&json, None, "Bravo").await,
        Err(TeamError::PassphraseRequired)
    ));
    assert!(matches!(
        bravo.engine.join(&json, Some("wrong horse"), "Bravo").await,
        Err(TeamError::DecryptionFailed(_))
    ));
    assert!(!bravo.engine.is_in_team());

    bravo.engine.join(&json, Some(&passphrase), "Bravo").await.unwrap();
    let team = bravo.engine.team().unwrap();
    assert_eq!(team.id, alpha.engine.team().unwrap().id);
    assert_eq!(team.rally_points.len(), 1);
    assert_eq!(team.passphrase.as_deref(), Some(passphrase.as_str()));
    assert!(team.created_by.is_none());
}

#[tokio::test]
async fn test_join_rejected_while_in_team() {
    let alpha = Node::leader("alpha", "Ridge").await;
    let mut bravo = Node::leader("bravo", "Basin").await;

    let code = alpha.engine.invite_code().unwrap();
    assert!(matches!(
        bravo.engine.join(&code, None, "Bravo").await,
        Err(TeamError::AlreadyInTeam)
    ));
    assert_eq!(bravo.engine.team().unwrap().name, "Basin");
}

#[tokio::test]
async fn test_join_rejects_garbage() {
    let mut bravo = Node::new("bravo");
    assert!(matches!(
        bravo.engine.join("not a package", None, "Bravo").await,
        Err(TeamError::InvalidPackageFormat(_))
    ));
    assert!(matches!(
        bravo.engine.join(r#"{"type":"waypoints"}"#, None, "Bravo").await,
        Err(TeamError::InvalidPackageFormat(_))
    ));
}

#[tokio::test]
async fn test_denied_mutations_leave_record_unchanged() {
    let mut alpha = Node::leader("alpha", "Ridge").await;
    let mut bravo = Node::new("bravo");
    join_by_invite(&mut alpha, &mut bravo, "Bravo").await;

    let before = bravo.engine.team().unwrap().clone();

    let denied = [
        bravo
            .engine
            .add_rally_point(NewRallyPoint::new("Cache", RallyType::Cache, 1.0, 1.0))
            .await
            .map(|_| ()),
        bravo
            .engine
            .set_member_role(&MemberId::from("bravo"), Role::Scout)
            .await,
        bravo
            .engine
            .update_team_info(TeamInfoUpdate {
                name: Some("Mine".to_string()),
                ..Default::default()
            })
            .await,
        bravo.engine.remove_member(&MemberId::from("alpha")).await,
        bravo.engine.dissolve().await,
        bravo.engine.invite_code().map(|_| ()),
    ];
    for result in denied {
        assert!(
            matches!(result, Err(TeamError::PermissionDenied(_))),
            "expected denial, got {:?}",
            result
        );
    }

    assert_eq!(bravo.engine.team().unwrap(), &before);
    assert_eq!(bravo.radio.sent_count(), 0);
}

#[tokio::test]
async fn test_leader_cannot_be_removed_or_vacate() {
    let mut alpha = Node::leader("alpha", "Ridge").await;
    let mut bravo = Node::new("bravo");
    join_by_invite(&mut alpha, &mut bravo, "Bravo").await;

    alpha
        .engine
        .set_member_role(&MemberId::from("bravo"), Role::CoLeader)
        .await
        .unwrap();
    relay(&alpha, &mut [&mut bravo]).await;

    assert!(matches!(
        bravo.engine.remove_member(&MemberId::from("alpha")).await,
        Err(TeamError::PermissionDenied(_))
    ));
    assert!(matches!(
        alpha
            .engine
            .set_member_role(&MemberId::from("alpha"), Role::Scout)
            .await,
        Err(TeamError::PermissionDenied(_))
    ));
    assert!(matches!(
        alpha.engine.remove_member(&MemberId::from("alpha")).await,
        Err(TeamError::InvalidOperation(_))
    ));
    assert_eq!(leader_count(&alpha), 1);
}

#[tokio::test]
async fn test_removed_member_tears_down() {
    let mut alpha = Node::leader("alpha", "Ridge").await;
    let mut bravo = Node::new("bravo");
    join_by_invite(&mut alpha, &mut bravo, "Bravo").await;
    let mut events = bravo.engine.subscribe_events();

    alpha
        .engine
        .remove_member(&MemberId::from("bravo"))
        .await
        .unwrap();
    assert_eq!(alpha.engine.team().unwrap().members.len(), 1);

    let outcomes = relay(&alpha, &mut [&mut bravo]).await;
    assert_eq!(outcomes, vec![InboundOutcome::RemovedFromTeam]);
    assert!(!bravo.engine.is_in_team());
    assert!(!bravo.store.contains(griddown_team_core::config::DEFAULT_STATE_KEY));

    let event = events.recv().await.unwrap();
    assert!(matches!(event, TeamEvent::RemovedFromTeam { .. }));
    assert!(event.is_teardown());
}

#[tokio::test]
async fn test_dissolve_reaches_everyone() {
    let mut alpha = Node::leader("alpha", "Ridge").await;
    let mut bravo = Node::new("bravo");
    let mut charlie = Node::new("charlie");
    join_by_invite(&mut alpha, &mut bravo, "Bravo").await;
    join_by_invite(&mut alpha, &mut charlie, "Charlie").await;

    alpha.engine.dissolve().await.unwrap();
    let outcomes = relay(&alpha, &mut [&mut bravo, &mut charlie]).await;

    assert_eq!(outcomes, vec![InboundOutcome::Dissolved, InboundOutcome::Dissolved]);
    assert!(!alpha.engine.is_in_team());
    assert!(!bravo.engine.is_in_team());
    assert!(!charlie.engine.is_in_team());
}

#[tokio::test]
async fn test_rally_changes_converge_and_mirror() {
    let mut alpha = Node::leader("alpha", "Ridge").await;

    let mirror = Arc::new(CapturingMirror::default());
    let radio = common::RecordingTransport::new("bravo");
    let mut bravo = Node {
        engine: TeamEngine::builder(Arc::new(MemoryStore::new()))
            .transport(radio.clone())
            .rally_mirror(mirror.clone())
            .config(EngineConfig::default().with_kdf_iterations(TEST_KDF_ITERATIONS))
            .build(),
        radio,
        store: MemoryStore::new(),
    };
    join_by_invite(&mut alpha, &mut bravo, "Bravo").await;

    let id = alpha
        .engine
        .add_rally_point(
            NewRallyPoint::new("Old Mill", RallyType::Emergency, 39.5, -105.0).with_notes("north door"),
        )
        .await
        .unwrap();
    relay(&alpha, &mut [&mut bravo]).await;

    let team = bravo.engine.team().unwrap();
    assert_eq!(team.rally_points.len(), 1);
    assert_eq!(team.rally_point(&id).unwrap().notes, "north door");
    let mirrored = mirror.last.lock().clone().unwrap();
    assert_eq!(mirrored.len(), 1);

    alpha.engine.remove_rally_point(&id).await.unwrap();
    relay(&alpha, &mut [&mut bravo]).await;
    assert!(bravo.engine.team().unwrap().rally_points.is_empty());
    assert!(mirror.last.lock().as_ref().unwrap().is_empty());
}

#[tokio::test]
async fn test_navigator_can_edit_waypoints() {
    let mut alpha = Node::leader("alpha", "Ridge").await;
    let mut bravo = Node::new("bravo");
    join_by_invite(&mut alpha, &mut bravo, "Bravo").await;

    alpha
        .engine
        .set_member_role(&MemberId::from("bravo"), Role::Navigator)
        .await
        .unwrap();
    relay(&alpha, &mut [&mut bravo]).await;

    bravo
        .engine
        .add_rally_point(NewRallyPoint::new("Saddle", RallyType::Secondary, 39.0, -105.0))
        .await
        .unwrap();
    relay(&bravo, &mut [&mut alpha]).await;

    let point = &alpha.engine.team().unwrap().rally_points[0];
    assert_eq!(point.name, "Saddle");
    assert_eq!(point.created_by, MemberId::from("bravo"));
}

#[tokio::test]
async fn test_team_info_and_comm_plan_sync() {
    let mut alpha = Node::leader("alpha", "Ridge").await;
    let mut bravo = Node::new("bravo");
    join_by_invite(&mut alpha, &mut bravo, "Bravo").await;

    alpha
        .engine
        .update_team_info(TeamInfoUpdate {
            name: Some("Ridge North".to_string()),
            description: Some("Search sector 4".to_string()),
            settings: Some(TeamSettings {
                location_interval_secs: 300,
                ..Default::default()
            }),
        })
        .await
        .unwrap();
    alpha
        .engine
        .add_check_in(CheckIn {
            time: "19:00".to_string(),
            frequency: CheckInFrequency::Daily,
            date: None,
            notes: "ch 3".to_string(),
        })
        .await
        .unwrap();
    relay(&alpha, &mut [&mut bravo]).await;

    let team = bravo.engine.team().unwrap();
    assert_eq!(team.name, "Ridge North");
    assert_eq!(team.description, "Search sector 4");
    assert_eq!(team.settings.location_interval_secs, 300);
    assert_eq!(team.comm_plan.check_in_times.len(), 1);
    assert_eq!(team.comm_plan.check_in_times[0].time, "19:00");
}

#[tokio::test]
async fn test_disconnected_broadcasts_are_dropped() {
    let mut alpha = Node::leader("alpha", "Ridge").await;
    alpha.radio.set_state(ConnectionState::Disconnected);

    alpha
        .engine
        .add_rally_point(NewRallyPoint::new("Bridge", RallyType::Primary, 1.0, 1.0))
        .await
        .unwrap();
    assert_eq!(alpha.radio.sent_count(), 0);

    alpha.radio.set_state(ConnectionState::Connected);
    alpha.engine.update_position(1.0, 1.0).await.unwrap();
    // only the position update; nothing was queued
    assert_eq!(alpha.radio.sent_count(), 1);
    assert_eq!(alpha.engine.team().unwrap().rally_points.len(), 1);
}

#[tokio::test]
async fn test_send_failures_are_swallowed() {
    let mut alpha = Node::leader("alpha", "Ridge").await;
    alpha.radio.fail_sends(true);

    alpha
        .engine
        .add_rally_point(NewRallyPoint::new("Bridge", RallyType::Primary, 1.0, 1.0))
        .await
        .unwrap();
    assert_eq!(alpha.engine.team().unwrap().rally_points.len(), 1);
}

#[tokio::test]
async fn test_position_not_broadcast_when_sharing_disabled() {
    let mut alpha = Node::leader("alpha", "Ridge").await;
    alpha
        .engine
        .update_team_info(TeamInfoUpdate {
            settings: Some(TeamSettings {
                share_location: false,
                ..Default::default()
            }),
            ..Default::default()
        })
        .await
        .unwrap();
    alpha.radio.drain();

    alpha.engine.update_position(37.77, -122.42).await.unwrap();
    assert_eq!(alpha.radio.sent_count(), 0);
    assert_eq!(alpha.engine.me().unwrap().position(), Some((37.77, -122.42)));
}

#[tokio::test]
async fn test_member_distances_sorted_with_unknown_last() {
    let mut alpha = Node::leader("alpha", "Ridge").await;
    let mut bravo = Node::new("bravo");
    let mut charlie = Node::new("charlie");
    join_by_invite(&mut alpha, &mut bravo, "Bravo").await;
    join_by_invite(&mut alpha, &mut charlie, "Charlie").await;

    // San Francisco → Los Angeles
    alpha.engine.update_position(37.7749, -122.4194).await.unwrap();
    bravo.engine.update_position(34.0522, -118.2437).await.unwrap();
    relay(&bravo, &mut [&mut alpha]).await;

    let distances = alpha.engine.member_distances().unwrap();
    assert_eq!(distances.len(), 2);
    assert_eq!(distances[0].0.id, MemberId::from("bravo"));
    let fix = distances[0].1.unwrap();
    assert!((fix.miles - 347.0).abs() < 347.0 * 0.01, "got {}", fix.miles);
    assert_eq!(fix.compass(), "SE");
    assert!(distances[1].1.is_none());
}

#[tokio::test]
async fn test_inbound_rally_list_is_truncated() {
    let mut alpha = Node::leader("alpha", "Ridge").await;
    let mut bravo = Node::new("bravo");
    join_by_invite(&mut alpha, &mut bravo, "Bravo").await;

    let team_id = bravo.engine.team().unwrap().id.clone();
    let points: Vec<_> = (0..25)
        .map(|i| {
            griddown_team_core::RallyPoint::new(
                &format!("P{}", i),
                RallyType::Primary,
                0.0,
                0.0,
                MemberId::from("alpha"),
                0,
            )
        })
        .collect();
    let envelope = griddown_team_core::TeamEnvelope::new(
        team_id,
        SyncSubtype::RallyUpdate,
        MemberId::from("alpha"),
        1,
        serde_json::json!({ "rallyPoints": points }),
    );

    bravo
        .engine
        .handle_incoming(&envelope.to_text().unwrap())
        .await;
    assert_eq!(
        bravo.engine.team().unwrap().rally_points.len(),
        griddown_team_core::MAX_RALLY_POINTS
    );
}

#[tokio::test]
async fn test_ignores_traffic_when_not_in_team() {
    let mut alpha = Node::leader("alpha", "Ridge").await;
    let mut bravo = Node::new("bravo");

    alpha
        .engine
        .add_rally_point(NewRallyPoint::new("Bridge", RallyType::Primary, 1.0, 1.0))
        .await
        .unwrap();
    let outcomes = relay(&alpha, &mut [&mut bravo]).await;
    assert_eq!(outcomes, vec![InboundOutcome::Ignored(IgnoreReason::NotInTeam)]);
}

#[tokio::test]
async fn test_redb_snapshot_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("team.redb");

    let team_id = {
        let store = Arc::new(RedbStore::open(&path).unwrap());
        let mut engine = TeamEngine::builder(store).build();
        let id = engine
            .create_team(NewTeam::named("Ridge", "Alpha"))
            .await
            .unwrap();
        engine
            .add_rally_point(NewRallyPoint::new("Bridge", RallyType::Primary, 1.0, 1.0))
            .await
            .unwrap();
        id
    };

    let store = Arc::new(RedbStore::open(&path).unwrap());
    let mut engine = TeamEngine::builder(store).build();
    assert!(engine.load().await.unwrap());
    let team = engine.team().unwrap();
    assert_eq!(team.id, team_id);
    assert_eq!(team.rally_points.len(), 1);
    assert_eq!(engine.my_role(), Some(Role::Leader));
}

#[tokio::test]
async fn test_storage_failures_keep_in_memory_changes() {
    let mut engine = TeamEngine::builder(Arc::new(FailingStore))
        .config(EngineConfig::default().with_kdf_iterations(TEST_KDF_ITERATIONS))
        .build();

    assert!(matches!(engine.load().await, Err(TeamError::Storage(_))));

    let team_id = engine
        .create_team(NewTeam::named("Ridge", "Alpha"))
        .await
        .unwrap();
    assert_eq!(engine.team().unwrap().id, team_id);

    engine
        .add_rally_point(NewRallyPoint::new("Bridge", RallyType::Primary, 1.0, 1.0))
        .await
        .unwrap();
    assert_eq!(engine.team().unwrap().rally_points.len(), 1);

    engine.leave().await.unwrap();
    assert!(engine.team().is_none());
    assert!(!engine.is_in_team());
}

#[tokio::test]
async fn test_state_keys_isolate_teams_in_one_store() {
    let store = MemoryStore::new();
    let engine_with_key = |key: &str| {
        TeamEngine::builder(Arc::new(store.clone()))
            .config(EngineConfig::default().with_state_key(key))
            .build()
    };

    let mut work = engine_with_key("team_work");
    work.create_team(NewTeam::named("Work", "Alpha")).await.unwrap();
    let mut family = engine_with_key("team_family");
    family.create_team(NewTeam::named("Family", "Alpha")).await.unwrap();

    assert!(store.contains("team_work"));
    assert!(store.contains("team_family"));
    assert!(!store.contains("griddown_team"));

    let mut restored = engine_with_key("team_family");
    assert!(restored.load().await.unwrap());
    assert_eq!(restored.team().unwrap().name, "Family");

    work.leave().await.unwrap();
    assert!(!store.contains("team_work"));
    assert!(store.contains("team_family"));
}

/// A mutation paired with the permission it requires
#[derive(Debug, Clone, Copy)]
enum Mutation {
    AddRallyPoint,
    AddCheckIn,
    InviteCode,
    UpdateTeamInfo,
    SetMemberRole,
    RemoveMember,
    Dissolve,
}

impl Mutation {
    const ALL: [Mutation; 7] = [
        Mutation::AddRallyPoint,
        Mutation::AddCheckIn,
        Mutation::InviteCode,
        Mutation::UpdateTeamInfo,
        Mutation::SetMemberRole,
        Mutation::RemoveMember,
        Mutation::Dissolve,
    ];

    fn permission(self) -> Permission {
        match self {
            Mutation::AddRallyPoint => Permission::EditWaypoints,
            Mutation::AddCheckIn => Permission::EditPlan,
            Mutation::InviteCode => Permission::Invite,
            Mutation::UpdateTeamInfo => Permission::EditTeam,
            Mutation::SetMemberRole => Permission::EditMembers,
            Mutation::RemoveMember => Permission::RemoveMembers,
            Mutation::Dissolve => Permission::DissolveTeam,
        }
    }

    async fn run(self, engine: &mut TeamEngine) -> Result<(), TeamError> {
        match self {
            Mutation::AddRallyPoint => engine
                .add_rally_point(NewRallyPoint::new("Cache", RallyType::Cache, 1.0, 1.0))
                .await
                .map(|_| ()),
            Mutation::AddCheckIn => {
                engine
                    .add_check_in(CheckIn {
                        time: "18:00".to_string(),
                        frequency: CheckInFrequency::Daily,
                        date: None,
                        notes: String::new(),
                    })
                    .await
            }
            Mutation::InviteCode => engine.invite_code().map(|_| ()),
            Mutation::UpdateTeamInfo => {
                engine
                    .update_team_info(TeamInfoUpdate {
                        name: Some("Mine".to_string()),
                        ..Default::default()
                    })
                    .await
            }
            Mutation::SetMemberRole => {
                engine
                    .set_member_role(&MemberId::from("charlie"), Role::Medic)
                    .await
            }
            Mutation::RemoveMember => engine.remove_member(&MemberId::from("charlie")).await,
            Mutation::Dissolve => engine.dissolve().await,
        }
    }
}

/// Alpha leads, Bravo holds `role`, Charlie is a plain member; all three
/// know each other.
async fn crew_with_bravo_as(role: Role) -> (Node, Node, Node) {
    let mut alpha = Node::leader("alpha", "Ridge").await;
    let mut bravo = Node::new("bravo");
    let mut charlie = Node::new("charlie");
    join_by_invite(&mut alpha, &mut bravo, "Bravo").await;

    let code = alpha.engine.invite_code().unwrap();
    charlie.engine.join(&code, None, "Charlie").await.unwrap();
    relay(&charlie, &mut [&mut alpha, &mut bravo]).await;
    relay(&alpha, &mut [&mut bravo, &mut charlie]).await;
    relay(&bravo, &mut [&mut alpha, &mut charlie]).await;

    if role != Role::Support {
        alpha
            .engine
            .set_member_role(&MemberId::from("bravo"), role)
            .await
            .unwrap();
        relay(&alpha, &mut [&mut bravo, &mut charlie]).await;
    }
    assert_eq!(bravo.engine.my_role(), Some(role));
    assert_eq!(bravo.engine.team().unwrap().members.len(), 3);
    bravo.radio.drain();

    (alpha, bravo, charlie)
}

#[tokio::test]
async fn test_every_role_matches_its_permission_table() {
    for role in Role::ALL {
        for mutation in Mutation::ALL {
            let (_alpha, mut bravo, _charlie) = crew_with_bravo_as(role).await;
            let before = bravo.engine.team().unwrap().clone();

            let result = mutation.run(&mut bravo.engine).await;

            if has_permission(role, mutation.permission()) {
                assert!(
                    result.is_ok(),
                    "{} should be allowed {:?}, got {:?}",
                    role,
                    mutation,
                    result
                );
            } else {
                assert!(
                    matches!(result, Err(TeamError::PermissionDenied(_))),
                    "{} should be denied {:?}, got {:?}",
                    role,
                    mutation,
                    result
                );
                assert_eq!(bravo.engine.team().unwrap(), &before);
                assert_eq!(bravo.radio.sent_count(), 0);
            }
        }
    }
}
