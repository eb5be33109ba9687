//! TeamEngine - the primary entry point for the team engine
//!
//! TeamEngine owns the local team record and the injected collaborators:
//! - a [`SettingsStore`] the record is snapshotted into after every change
//! - an optional [`MeshTransport`] outbound envelopes are handed to
//! - an optional [`RallyMirror`] that redraws rally points as waypoints
//! - a `tokio::sync::broadcast` channel of [`TeamEvent`]s for UI layers
//!
//! Every mutating call takes `&mut self`, so there is exactly one writer.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use griddown_team_core::{MemoryStore, NewTeam, TeamEngine};
//!
//! let mut engine = TeamEngine::builder(Arc::new(MemoryStore::new())).build();
//! engine.create_team(NewTeam::named("Ridge", "Alpha")).await?;
//!
//! // Hand the invite to a teammate over a trusted channel
//! let invite = engine.invite_code()?;
//!
//! // Feed every mesh text message into the engine
//! engine.handle_incoming(&text).await;
//! ```

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::crypto::PassphraseCipher;
use crate::error::{TeamError, TeamResult};
use crate::geo::{sort_by_distance, Fix};
use crate::package::{build_invite, DisplayPackage, EncryptedPackage, PackageOptions, TeamPackage};
use crate::permissions::{authorize, check_role_change, has_permission, Permission};
use crate::storage::SettingsStore;
use crate::sync::{
    apply_envelope, touch_sender, Effect, MeshTransport, ParsedMessage, RallyMirror, SyncSubtype,
    TeamEnvelope, TeamEvent,
};
use crate::types::member::short_name_for;
use crate::types::{
    now_millis, CheckIn, CommPlan, Member, MemberId, MemberStatus, RallyPoint, RallyPointId,
    RallyPointUpdate, RallyType, Role, Team, TeamId, TeamSettings, TEAM_FORMAT_VERSION,
};

/// Default capacity for event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Unambiguous characters for generated passphrases
const PASSPHRASE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const PASSPHRASE_GROUPS: usize = 4;
const PASSPHRASE_GROUP_LEN: usize = 4;

/// Radio firmware limits channel names to 11 characters
const MESH_CHANNEL_MAX_LEN: usize = 11;
const FALLBACK_MESH_CHANNEL: &str = "GRIDDOWN";
const MESH_PSK_BYTES: usize = 32;

const ANONYMOUS_NAME: &str = "Anonymous";

/// The team record plus which member is us; also the persisted snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Membership {
    team: Team,
    self_id: MemberId,
}

/// Parameters for [`TeamEngine::create_team`]
#[derive(Debug, Clone, Default)]
pub struct NewTeam {
    pub name: String,
    pub description: String,
    /// Shared secret for encrypted exports; generated when `None`
    pub passphrase: Option<String>,
    /// Mesh channel name; derived from the team name when `None`
    pub mesh_channel: Option<String>,
    /// Display name of the creating member
    pub my_name: String,
}

impl NewTeam {
    pub fn named(name: impl Into<String>, my_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            my_name: my_name.into(),
            ..Default::default()
        }
    }
}

/// Edits for [`TeamEngine::update_team_info`]; `None` fields are left alone
#[derive(Debug, Clone, Default)]
pub struct TeamInfoUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub settings: Option<TeamSettings>,
}

/// Edits for [`TeamEngine::update_profile`]
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub short_name: Option<String>,
}

/// Parameters for [`TeamEngine::add_rally_point`]
#[derive(Debug, Clone, PartialEq)]
pub struct NewRallyPoint {
    pub name: String,
    pub kind: RallyType,
    pub lat: f64,
    pub lon: f64,
    pub notes: String,
    pub schedule: Option<String>,
}

impl NewRallyPoint {
    pub fn new(name: impl Into<String>, kind: RallyType, lat: f64, lon: f64) -> Self {
        Self {
            name: name.into(),
            kind,
            lat,
            lon,
            notes: String::new(),
            schedule: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn with_schedule(mut self, schedule: impl Into<String>) -> Self {
        self.schedule = Some(schedule.into());
        self
    }
}

/// Why an inbound message was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Not a team envelope (chat, other apps)
    NotTeamMessage,
    /// Team envelope with unreadable fields or payload
    Malformed,
    /// We hold no team
    NotInTeam,
    /// Envelope for a different team on the same channel
    OtherTeam,
    /// Our own broadcast echoed back by the mesh
    OwnEcho,
}

/// What [`TeamEngine::handle_incoming`] did with a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    Ignored(IgnoreReason),
    /// Merged into the team record
    Applied(SyncSubtype),
    /// We were removed; the local record is gone
    RemovedFromTeam,
    /// The leader dissolved the team; the local record is gone
    Dissolved,
}

/// Builder for [`TeamEngine`]
pub struct TeamEngineBuilder {
    store: Arc<dyn SettingsStore>,
    transport: Option<Arc<dyn MeshTransport>>,
    rally_mirror: Option<Arc<dyn RallyMirror>>,
    config: EngineConfig,
}

impl TeamEngineBuilder {
    pub fn transport(mut self, transport: Arc<dyn MeshTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn rally_mirror(mut self, mirror: Arc<dyn RallyMirror>) -> Self {
        self.rally_mirror = Some(mirror);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Build an engine holding no team. Call [`TeamEngine::load`] to restore
    /// a persisted one.
    pub fn build(self) -> TeamEngine {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        TeamEngine {
            cipher: self.config.cipher(),
            config: self.config,
            store: self.store,
            transport: self.transport,
            rally_mirror: self.rally_mirror,
            event_tx,
            state: None,
        }
    }
}

/// Owns the local team record and drives every team operation
pub struct TeamEngine {
    config: EngineConfig,
    cipher: PassphraseCipher,
    store: Arc<dyn SettingsStore>,
    transport: Option<Arc<dyn MeshTransport>>,
    rally_mirror: Option<Arc<dyn RallyMirror>>,
    event_tx: broadcast::Sender<TeamEvent>,
    state: Option<Membership>,
}

impl TeamEngine {
    pub fn builder(store: Arc<dyn SettingsStore>) -> TeamEngineBuilder {
        TeamEngineBuilder {
            store,
            transport: None,
            rally_mirror: None,
            config: EngineConfig::default(),
        }
    }

    /// Restore the persisted team snapshot, if any.
    ///
    /// Returns `true` if a team was restored.
    ///
    /// # Errors
    ///
    /// Returns `TeamError::AlreadyInTeam` if the engine already holds a team,
    /// and `TeamError::Serialization` if the snapshot is corrupt.
    pub async fn load(&mut self) -> TeamResult<bool> {
        if self.state.is_some() {
            return Err(TeamError::AlreadyInTeam);
        }

        let Some(bytes) = self.store.get(&self.config.state_key).await? else {
            debug!(key = %self.config.state_key, "No persisted team");
            return Ok(false);
        };

        let membership: Membership = serde_json::from_slice(&bytes)?;
        info!(
            team_id = %membership.team.id,
            member_id = %membership.self_id,
            members = membership.team.members.len(),
            "Restored team from settings store"
        );
        self.state = Some(membership);
        self.mirror_rally_points();
        Ok(true)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn team(&self) -> Option<&Team> {
        self.state.as_ref().map(|m| &m.team)
    }

    pub fn is_in_team(&self) -> bool {
        self.state.is_some()
    }

    /// Our member id while in a team
    pub fn self_id(&self) -> Option<&MemberId> {
        self.state.as_ref().map(|m| &m.self_id)
    }

    /// Our own member record
    pub fn me(&self) -> Option<&Member> {
        self.state.as_ref().and_then(|m| m.team.member(&m.self_id))
    }

    pub fn my_role(&self) -> Option<Role> {
        self.me().map(|m| m.role)
    }

    /// Whether our current role carries `permission`
    pub fn can(&self, permission: Permission) -> bool {
        self.my_role()
            .map(|role| has_permission(role, permission))
            .unwrap_or(false)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<TeamEvent> {
        self.event_tx.subscribe()
    }

    fn membership(&self) -> TeamResult<&Membership> {
        self.state.as_ref().ok_or(TeamError::NotInTeam)
    }

    fn membership_mut(&mut self) -> TeamResult<&mut Membership> {
        self.state.as_mut().ok_or(TeamError::NotInTeam)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Create a new team with ourselves as leader.
    ///
    /// # Errors
    ///
    /// - `TeamError::AlreadyInTeam` if a team is already held
    /// - `TeamError::InvalidOperation` for an empty team name
    pub async fn create_team(&mut self, params: NewTeam) -> TeamResult<TeamId> {
        if self.state.is_some() {
            return Err(TeamError::AlreadyInTeam);
        }

        let name = params.name.trim().to_string();
        if name.is_empty() {
            return Err(TeamError::InvalidOperation(
                "team name cannot be empty".to_string(),
            ));
        }

        let now = now_millis();
        let self_id = self.resolve_self_id();
        let leader = Member::new(self_id.clone(), &display_name(&params.my_name), Role::Leader, now);

        let passphrase = params
            .passphrase
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(generate_passphrase);
        let mesh_channel = params
            .mesh_channel
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| default_mesh_channel(&name));

        let team = Team {
            id: TeamId::generate(),
            version: TEAM_FORMAT_VERSION,
            name,
            description: params.description.trim().to_string(),
            created: now,
            created_by: Some(self_id.clone()),
            passphrase: Some(passphrase),
            mesh_channel,
            mesh_psk: generate_mesh_psk(),
            members: vec![leader],
            rally_points: Vec::new(),
            comm_plan: CommPlan::default(),
            settings: TeamSettings::default(),
        };
        let team_id = team.id.clone();

        info!(
            team_id = %team_id,
            member_id = %self_id,
            channel = %team.mesh_channel,
            "Created team"
        );

        self.state = Some(Membership { team, self_id });
        self.persist().await;
        self.emit(TeamEvent::TeamCreated {
            team_id: team_id.clone(),
        });

        Ok(team_id)
    }

    /// Join a team from an invite code, display package or encrypted package.
    ///
    /// We join as `support` and announce ourselves with `member_joined`.
    ///
    /// # Errors
    ///
    /// - `TeamError::AlreadyInTeam` if a team is already held
    /// - `TeamError::InvalidPackageFormat` for unrecognized input
    /// - `TeamError::PassphraseRequired` / `TeamError::DecryptionFailed` for
    ///   encrypted packages
    pub async fn join(
        &mut self,
        input: &str,
        passphrase: Option<&str>,
        my_name: &str,
    ) -> TeamResult<TeamId> {
        if self.state.is_some() {
            return Err(TeamError::AlreadyInTeam);
        }

        let package = TeamPackage::parse(input)?;
        debug!(team_id = %package.team_id(), encrypted = package.requires_passphrase(), "Parsed team package");
        let seed = package.into_seed(passphrase, self.cipher).await?;

        let now = now_millis();
        let self_id = self.resolve_self_id();
        let me = Member::new(self_id.clone(), &display_name(my_name), Role::Support, now);

        let mut rally_points = seed.rally_points;
        rally_points.truncate(self.config.max_rally_points);

        let team = Team {
            id: seed.team_id,
            version: TEAM_FORMAT_VERSION,
            name: seed.name,
            description: seed.description,
            created: now,
            created_by: None,
            passphrase: seed.passphrase,
            mesh_channel: seed.mesh_channel,
            mesh_psk: seed.mesh_psk,
            members: vec![me.clone()],
            rally_points,
            comm_plan: seed.comm_plan.unwrap_or_default(),
            settings: seed.settings.unwrap_or_default(),
        };
        let team_id = team.id.clone();

        info!(team_id = %team_id, member_id = %self_id, "Joined team");

        self.state = Some(Membership { team, self_id });
        self.persist().await;
        self.mirror_rally_points();
        self.broadcast(SyncSubtype::MemberJoined, serde_json::to_value(&me)?)
            .await;
        self.emit(TeamEvent::TeamJoined {
            team_id: team_id.clone(),
        });

        Ok(team_id)
    }

    /// Leave the team.
    ///
    /// A leader leaving a non-empty team hands leadership to a co-leader if
    /// there is one, else to the earliest-joined member, and broadcasts the
    /// handoff before `member_left`.
    pub async fn leave(&mut self) -> TeamResult<()> {
        let (team_id, self_id, successor) = {
            let m = self.membership_mut()?;
            let successor = if m.team.role_of(&m.self_id) == Some(Role::Leader) {
                let next = m
                    .team
                    .members
                    .iter()
                    .filter(|member| member.id != m.self_id)
                    .min_by_key(|member| (member.role != Role::CoLeader, member.joined_at))
                    .map(|member| member.id.clone());
                match next {
                    Some(id) => m.team.member_mut(&id).map(|member| {
                        member.role = Role::Leader;
                        member.clone()
                    }),
                    None => None,
                }
            } else {
                None
            };
            (m.team.id.clone(), m.self_id.clone(), successor)
        };

        if let Some(successor) = successor {
            info!(team_id = %team_id, successor = %successor.id, "Handing off leadership");
            self.broadcast(SyncSubtype::MemberUpdate, serde_json::to_value(&successor)?)
                .await;
        }
        self.broadcast(SyncSubtype::MemberLeft, json!({ "memberId": self_id }))
            .await;

        self.clear_state().await;
        info!(team_id = %team_id, member_id = %self_id, "Left team");
        self.emit(TeamEvent::TeamLeft { team_id });
        Ok(())
    }

    /// Dissolve the team for everyone
    pub async fn dissolve(&mut self) -> TeamResult<()> {
        let team_id = {
            let m = self.membership()?;
            authorize(&m.team, &m.self_id, Permission::DissolveTeam)?;
            m.team.id.clone()
        };

        self.broadcast(SyncSubtype::TeamDissolved, json!({})).await;
        self.clear_state().await;

        info!(team_id = %team_id, "Dissolved team");
        self.emit(TeamEvent::TeamDissolved {
            team_id,
            remote: false,
        });
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Sharing
    // ═══════════════════════════════════════════════════════════════════════

    /// Compact `GDTEAM:` invite code. Carries the passphrase in clear.
    pub fn invite_code(&self) -> TeamResult<String> {
        let m = self.membership()?;
        authorize(&m.team, &m.self_id, Permission::Invite)?;
        build_invite(&m.team)
    }

    /// Unencrypted package for display or QR
    pub fn display_package(&self, options: PackageOptions) -> TeamResult<DisplayPackage> {
        let m = self.membership()?;
        authorize(&m.team, &m.self_id, Permission::Invite)?;
        Ok(DisplayPackage::from_team(&m.team, options, now_millis()))
    }

    /// Passphrase-encrypted `.gdteam` package
    ///
    /// # Errors
    ///
    /// Returns `TeamError::PassphraseRequired` if the team has no passphrase,
    /// e.g. after joining from a plain display package.
    pub async fn export_package(&self, options: PackageOptions) -> TeamResult<EncryptedPackage> {
        let (display, passphrase) = {
            let m = self.membership()?;
            authorize(&m.team, &m.self_id, Permission::Invite)?;
            let passphrase = m
                .team
                .passphrase
                .clone()
                .ok_or(TeamError::PassphraseRequired)?;
            (DisplayPackage::from_team(&m.team, options, now_millis()), passphrase)
        };

        let package = EncryptedPackage::seal(&display, &passphrase, self.cipher).await?;
        debug!(team_id = %package.team_id, "Exported encrypted team package");
        Ok(package)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Team and members
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn update_team_info(&mut self, update: TeamInfoUpdate) -> TeamResult<()> {
        let (team_id, payload) = {
            let m = self.membership_mut()?;
            authorize(&m.team, &m.self_id, Permission::EditTeam)?;

            let name = match update.name {
                Some(name) if name.trim().is_empty() => {
                    return Err(TeamError::InvalidOperation(
                        "team name cannot be empty".to_string(),
                    ))
                }
                Some(name) => Some(name.trim().to_string()),
                None => None,
            };
            let settings = match update.settings {
                Some(settings) => Some(serde_json::to_value(&settings)?),
                None => None,
            };

            let mut payload = Map::new();
            if let Some(name) = name {
                m.team.name = name.clone();
                payload.insert("name".to_string(), Value::String(name));
            }
            if let Some(description) = update.description {
                m.team.description = description.clone();
                payload.insert("description".to_string(), Value::String(description));
            }
            if let Some(value) = settings {
                m.team.settings = serde_json::from_value(value.clone())?;
                payload.insert("settings".to_string(), value);
            }
            (m.team.id.clone(), Value::Object(payload))
        };

        self.persist().await;
        self.broadcast(SyncSubtype::TeamInfo, payload).await;
        self.emit(TeamEvent::TeamInfoChanged { team_id });
        Ok(())
    }

    /// Change a member's role.
    ///
    /// Promoting someone to `leader` demotes the current leader to
    /// `co-leader`; both records are broadcast.
    pub async fn set_member_role(&mut self, target: &MemberId, role: Role) -> TeamResult<()> {
        let changed: Vec<Member> = {
            let m = self.membership_mut()?;
            check_role_change(&m.team, &m.self_id, target, role)?;

            let mut ids = Vec::new();
            if role == Role::Leader {
                ids.extend(m.team.demote_other_leaders(target));
            }
            if let Some(member) = m.team.member_mut(target) {
                member.role = role;
            }
            ids.insert(0, target.clone());
            ids.iter()
                .filter_map(|id| m.team.member(id).cloned())
                .collect()
        };

        info!(member_id = %target, role = %role, "Changed member role");
        self.persist().await;
        for member in &changed {
            self.broadcast(SyncSubtype::MemberUpdate, serde_json::to_value(member)?)
                .await;
            self.emit(TeamEvent::RoleChanged {
                member_id: member.id.clone(),
                role: member.role,
            });
        }
        Ok(())
    }

    /// Remove another member from the team.
    ///
    /// # Errors
    ///
    /// - `TeamError::PermissionDenied` when removing the leader
    /// - `TeamError::InvalidOperation` when removing ourselves (use [`leave`](Self::leave))
    pub async fn remove_member(&mut self, target: &MemberId) -> TeamResult<()> {
        {
            let m = self.membership_mut()?;
            authorize(&m.team, &m.self_id, Permission::RemoveMembers)?;

            let role = m
                .team
                .role_of(target)
                .ok_or_else(|| TeamError::MemberNotFound(target.to_string()))?;
            if target == &m.self_id {
                return Err(TeamError::InvalidOperation(
                    "cannot remove yourself; leave the team instead".to_string(),
                ));
            }
            if role == Role::Leader {
                return Err(TeamError::PermissionDenied(
                    "the leader cannot be removed".to_string(),
                ));
            }
            m.team.members.retain(|member| &member.id != target);
        }

        info!(member_id = %target, "Removed member");
        self.persist().await;
        self.broadcast(SyncSubtype::MemberRemoved, json!({ "memberId": target }))
            .await;
        self.emit(TeamEvent::MemberRemoved {
            member_id: target.clone(),
        });
        Ok(())
    }

    /// Change our own display name or short name. Needs no permission.
    pub async fn update_profile(&mut self, update: ProfileUpdate) -> TeamResult<()> {
        let (self_id, payload) = {
            let m = self.membership_mut()?;
            let self_id = m.self_id.clone();
            let me = m
                .team
                .member_mut(&self_id)
                .ok_or_else(|| TeamError::MemberNotFound(self_id.to_string()))?;

            if let Some(name) = update.name {
                me.name = display_name(&name);
                if update.short_name.is_none() {
                    me.short_name = short_name_for(&me.name);
                }
            }
            if let Some(short_name) = update.short_name {
                me.short_name = short_name_for(&short_name);
            }
            me.last_seen = now_millis();

            let payload = json!({
                "id": me.id,
                "name": me.name,
                "shortName": me.short_name,
                "lastSeen": me.last_seen,
            });
            (self_id, payload)
        };

        self.persist().await;
        self.broadcast(SyncSubtype::MemberUpdate, payload).await;
        self.emit(TeamEvent::MemberUpdated { member_id: self_id });
        Ok(())
    }

    /// Record our position. Broadcast only when the team shares locations.
    pub async fn update_position(&mut self, lat: f64, lon: f64) -> TeamResult<()> {
        validate_coordinates(lat, lon)?;

        let (self_id, payload, share) = {
            let m = self.membership_mut()?;
            let self_id = m.self_id.clone();
            let share = m.team.settings.share_location;
            let me = m
                .team
                .member_mut(&self_id)
                .ok_or_else(|| TeamError::MemberNotFound(self_id.to_string()))?;

            me.lat = Some(lat);
            me.lon = Some(lon);
            me.last_seen = now_millis();

            let payload = json!({
                "id": me.id,
                "lat": lat,
                "lon": lon,
                "lastSeen": me.last_seen,
            });
            (self_id, payload, share)
        };

        self.persist().await;
        if share {
            self.broadcast(SyncSubtype::MemberUpdate, payload).await;
        } else {
            debug!("Location sharing disabled; position kept local");
        }
        self.emit(TeamEvent::MemberUpdated { member_id: self_id });
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Rally points
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn add_rally_point(&mut self, params: NewRallyPoint) -> TeamResult<RallyPointId> {
        validate_coordinates(params.lat, params.lon)?;
        let max = self.config.max_rally_points;

        let id = {
            let m = self.membership_mut()?;
            authorize(&m.team, &m.self_id, Permission::EditWaypoints)?;

            if m.team.rally_points.len() >= max {
                return Err(TeamError::RallyLimitReached(max));
            }
            let name = params.name.trim();
            if name.is_empty() {
                return Err(TeamError::InvalidOperation(
                    "rally point name cannot be empty".to_string(),
                ));
            }

            let mut point = RallyPoint::new(
                name,
                params.kind,
                params.lat,
                params.lon,
                m.self_id.clone(),
                now_millis(),
            )
            .with_notes(&params.notes);
            point.schedule = params.schedule;

            let id = point.id.clone();
            m.team.rally_points.push(point);
            id
        };

        debug!(rally_id = %id, "Added rally point");
        self.rally_points_changed().await?;
        Ok(id)
    }

    pub async fn update_rally_point(
        &mut self,
        id: &RallyPointId,
        mut update: RallyPointUpdate,
    ) -> TeamResult<()> {
        if let Some((lat, lon)) = update.position {
            validate_coordinates(lat, lon)?;
        }

        {
            let m = self.membership_mut()?;
            authorize(&m.team, &m.self_id, Permission::EditWaypoints)?;
            if let Some(name) = update.name.take() {
                let name = name.trim();
                if name.is_empty() {
                    return Err(TeamError::InvalidOperation(
                        "rally point name cannot be empty".to_string(),
                    ));
                }
                update.name = Some(name.to_string());
            }
            let point = m
                .team
                .rally_points
                .iter_mut()
                .find(|p| &p.id == id)
                .ok_or_else(|| TeamError::RallyNotFound(id.to_string()))?;
            update.apply(point);
        }

        debug!(rally_id = %id, "Updated rally point");
        self.rally_points_changed().await
    }

    pub async fn remove_rally_point(&mut self, id: &RallyPointId) -> TeamResult<()> {
        {
            let m = self.membership_mut()?;
            authorize(&m.team, &m.self_id, Permission::EditWaypoints)?;
            let before = m.team.rally_points.len();
            m.team.rally_points.retain(|p| &p.id != id);
            if m.team.rally_points.len() == before {
                return Err(TeamError::RallyNotFound(id.to_string()));
            }
        }

        debug!(rally_id = %id, "Removed rally point");
        self.rally_points_changed().await
    }

    /// Persist, mirror and broadcast the full rally list
    async fn rally_points_changed(&mut self) -> TeamResult<()> {
        let points = self.membership()?.team.rally_points.clone();
        self.persist().await;
        self.mirror_rally_points();
        self.broadcast(SyncSubtype::RallyUpdate, json!({ "rallyPoints": points }))
            .await;
        self.emit(TeamEvent::RallyPointsChanged {
            count: points.len(),
        });
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Comm plan
    // ═══════════════════════════════════════════════════════════════════════

    /// Replace the whole comm plan
    pub async fn set_comm_plan(&mut self, plan: CommPlan) -> TeamResult<()> {
        for check_in in &plan.check_in_times {
            validate_check_in(check_in)?;
        }

        let payload = {
            let m = self.membership_mut()?;
            authorize(&m.team, &m.self_id, Permission::EditPlan)?;
            let payload = serde_json::to_value(&plan)?;
            m.team.comm_plan = plan;
            payload
        };

        self.comm_plan_changed(payload).await;
        Ok(())
    }

    pub async fn add_check_in(&mut self, check_in: CheckIn) -> TeamResult<()> {
        validate_check_in(&check_in)?;

        let payload = {
            let m = self.membership_mut()?;
            authorize(&m.team, &m.self_id, Permission::EditPlan)?;
            m.team.comm_plan.check_in_times.push(check_in);
            json!({ "checkInTimes": m.team.comm_plan.check_in_times })
        };

        self.comm_plan_changed(payload).await;
        Ok(())
    }

    /// Remove the check-in at `index` in schedule order
    pub async fn remove_check_in(&mut self, index: usize) -> TeamResult<CheckIn> {
        let (removed, payload) = {
            let m = self.membership_mut()?;
            authorize(&m.team, &m.self_id, Permission::EditPlan)?;
            let times = &mut m.team.comm_plan.check_in_times;
            if index >= times.len() {
                return Err(TeamError::InvalidOperation(format!(
                    "no check-in at index {} ({} scheduled)",
                    index,
                    times.len()
                )));
            }
            let removed = times.remove(index);
            (removed, json!({ "checkInTimes": times }))
        };

        self.comm_plan_changed(payload).await;
        Ok(removed)
    }

    async fn comm_plan_changed(&mut self, payload: Value) {
        self.persist().await;
        self.broadcast(SyncSubtype::CommPlan, payload).await;
        self.emit(TeamEvent::CommPlanChanged);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════

    /// Other members with distance and bearing from our position, nearest
    /// first. Members without a position (or all, if ours is unknown) come
    /// last with no fix.
    pub fn member_distances(&self) -> TeamResult<Vec<(Member, Option<Fix>)>> {
        let m = self.membership()?;
        let origin = m.team.member(&m.self_id).and_then(Member::position);

        let mut entries: Vec<_> = m
            .team
            .members
            .iter()
            .filter(|member| member.id != m.self_id)
            .map(|member| {
                let fix = origin
                    .zip(member.position())
                    .map(|(from, to)| Fix::between(from, to));
                (member.clone(), fix)
            })
            .collect();
        sort_by_distance(&mut entries);
        Ok(entries)
    }

    /// Rally points with distance and bearing from our position, nearest first
    pub fn rally_distances(&self) -> TeamResult<Vec<(RallyPoint, Option<Fix>)>> {
        let m = self.membership()?;
        let origin = m.team.member(&m.self_id).and_then(Member::position);

        let mut entries: Vec<_> = m
            .team
            .rally_points
            .iter()
            .map(|point| {
                let fix = origin.map(|from| Fix::between(from, (point.lat, point.lon)));
                (point.clone(), fix)
            })
            .collect();
        sort_by_distance(&mut entries);
        Ok(entries)
    }

    /// Liveness of one member using the configured windows
    pub fn member_status(&self, id: &MemberId) -> TeamResult<MemberStatus> {
        let m = self.membership()?;
        let member = m
            .team
            .member(id)
            .ok_or_else(|| TeamError::MemberNotFound(id.to_string()))?;
        Ok(self.status_of(member, now_millis()))
    }

    /// Every member with their liveness, in roster order
    pub fn roster(&self) -> TeamResult<Vec<(Member, MemberStatus)>> {
        let m = self.membership()?;
        let now = now_millis();
        Ok(m.team
            .members
            .iter()
            .map(|member| (member.clone(), self.status_of(member, now)))
            .collect())
    }

    fn status_of(&self, member: &Member, now: i64) -> MemberStatus {
        member.status_with(now, self.config.active_window_ms, self.config.stale_window_ms)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Inbound sync
    // ═══════════════════════════════════════════════════════════════════════

    /// Process one text message received on the mesh.
    ///
    /// Never fails: unreadable or irrelevant messages are dropped and the
    /// reason is returned for diagnostics.
    pub async fn handle_incoming(&mut self, text: &str) -> InboundOutcome {
        let envelope = match TeamEnvelope::parse(text) {
            ParsedMessage::NotTeam => return InboundOutcome::Ignored(IgnoreReason::NotTeamMessage),
            ParsedMessage::Malformed(reason) => {
                debug!(%reason, "Dropping malformed team envelope");
                return InboundOutcome::Ignored(IgnoreReason::Malformed);
            }
            ParsedMessage::Envelope(envelope) => envelope,
        };

        let max_rally_points = self.config.max_rally_points;
        let effect = {
            let Some(m) = self.state.as_mut() else {
                return InboundOutcome::Ignored(IgnoreReason::NotInTeam);
            };
            if envelope.team_id != m.team.id {
                debug!(tid = %envelope.team_id, "Ignoring envelope for another team");
                return InboundOutcome::Ignored(IgnoreReason::OtherTeam);
            }
            if envelope.from == m.self_id {
                return InboundOutcome::Ignored(IgnoreReason::OwnEcho);
            }

            debug!(
                team_id = %envelope.team_id,
                subtype = %envelope.subtype,
                from = %envelope.from,
                "Received team envelope"
            );

            match apply_envelope(&mut m.team, &m.self_id, &envelope, max_rally_points) {
                Ok(effect) => {
                    if matches!(effect, Effect::Changed | Effect::MemberAdded(_)) {
                        touch_sender(&mut m.team, &envelope.from, envelope.timestamp);
                    }
                    effect
                }
                Err(e) => {
                    warn!(
                        subtype = %envelope.subtype,
                        from = %envelope.from,
                        error = %e,
                        "Failed to apply team envelope"
                    );
                    return InboundOutcome::Ignored(IgnoreReason::Malformed);
                }
            }
        };

        let team_id = envelope.team_id;
        let subtype = envelope.subtype;
        match effect {
            Effect::RemovedSelf => {
                self.clear_state().await;
                info!(team_id = %team_id, by = %envelope.from, "Removed from team");
                self.emit(TeamEvent::RemovedFromTeam { team_id });
                InboundOutcome::RemovedFromTeam
            }
            Effect::Dissolved => {
                self.clear_state().await;
                info!(team_id = %team_id, by = %envelope.from, "Team dissolved by leader");
                self.emit(TeamEvent::TeamDissolved {
                    team_id,
                    remote: true,
                });
                InboundOutcome::Dissolved
            }
            Effect::Changed | Effect::MemberAdded(_) => {
                self.persist().await;
                if subtype == SyncSubtype::RallyUpdate {
                    self.mirror_rally_points();
                }
                if subtype == SyncSubtype::MemberJoined && matches!(effect, Effect::MemberAdded(_)) {
                    // newcomers start with only themselves on the roster
                    self.announce_self().await;
                }
                self.emit(TeamEvent::Synced {
                    subtype,
                    from: envelope.from,
                });
                InboundOutcome::Applied(subtype)
            }
        }
    }

    async fn announce_self(&self) {
        let Some(me) = self.me() else {
            return;
        };
        match serde_json::to_value(me) {
            Ok(payload) => self.broadcast(SyncSubtype::MemberUpdate, payload).await,
            Err(e) => warn!(error = %e, "Failed to serialize own member record"),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Plumbing
    // ═══════════════════════════════════════════════════════════════════════

    fn resolve_self_id(&self) -> MemberId {
        self.transport
            .as_ref()
            .and_then(|t| t.node_id())
            .filter(|id| !id.trim().is_empty())
            .map(MemberId::from)
            .unwrap_or_else(MemberId::generate)
    }

    /// Hand an envelope to the mesh. Dropped when offline; send errors are
    /// logged and swallowed.
    async fn broadcast(&self, subtype: SyncSubtype, payload: Value) {
        let Some(m) = self.state.as_ref() else {
            return;
        };
        let Some(transport) = self.transport.as_ref() else {
            debug!(subtype = %subtype, "No mesh transport; dropping broadcast");
            return;
        };
        if !transport.is_connected() {
            debug!(
                subtype = %subtype,
                state = %transport.connection_state(),
                "Mesh not connected; dropping broadcast"
            );
            return;
        }

        let envelope = TeamEnvelope::new(
            m.team.id.clone(),
            subtype,
            m.self_id.clone(),
            now_millis(),
            payload,
        );
        let text = match envelope.to_text() {
            Ok(text) => text,
            Err(e) => {
                warn!(subtype = %subtype, error = %e, "Failed to encode team envelope");
                return;
            }
        };

        match transport.send_text(&text).await {
            Ok(()) => debug!(team_id = %m.team.id, subtype = %subtype, bytes = text.len(), "Sent team envelope"),
            Err(e) => warn!(team_id = %m.team.id, subtype = %subtype, error = %e, "Failed to send team envelope"),
        }
    }

    /// Snapshot the team into the settings store. Failures are logged; the
    /// in-memory change stands.
    async fn persist(&self) {
        let Some(m) = self.state.as_ref() else {
            return;
        };
        let bytes = match serde_json::to_vec(m) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to serialize team snapshot");
                return;
            }
        };
        if let Err(e) = self.store.set(&self.config.state_key, &bytes).await {
            warn!(team_id = %m.team.id, error = %e, "Failed to persist team");
        }
    }

    /// Drop the team from memory and storage
    async fn clear_state(&mut self) {
        let had_rally_points = self
            .state
            .take()
            .map(|m| !m.team.rally_points.is_empty())
            .unwrap_or(false);

        if let Err(e) = self.store.remove(&self.config.state_key).await {
            warn!(error = %e, "Failed to clear persisted team");
        }
        if had_rally_points {
            if let Some(mirror) = &self.rally_mirror {
                mirror.rally_points_changed(&[]);
            }
        }
    }

    fn mirror_rally_points(&self) {
        if let (Some(mirror), Some(m)) = (&self.rally_mirror, &self.state) {
            mirror.rally_points_changed(&m.team.rally_points);
        }
    }

    fn emit(&self, event: TeamEvent) {
        debug!(event = event.name(), "Emitting team event");
        // no subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

fn display_name(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        ANONYMOUS_NAME.to_string()
    } else {
        name.to_string()
    }
}

fn validate_coordinates(lat: f64, lon: f64) -> TeamResult<()> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(TeamError::InvalidOperation(format!(
            "coordinates out of range: {}, {}",
            lat, lon
        )));
    }
    Ok(())
}

fn validate_check_in(check_in: &CheckIn) -> TeamResult<()> {
    chrono::NaiveTime::parse_from_str(&check_in.time, "%H:%M").map_err(|_| {
        TeamError::InvalidOperation(format!(
            "check-in time must be HH:MM, got '{}'",
            check_in.time
        ))
    })?;
    Ok(())
}

/// `XXXX-XXXX-XXXX-XXXX` from an unambiguous alphabet
fn generate_passphrase() -> String {
    let mut rng = rand::rng();
    (0..PASSPHRASE_GROUPS)
        .map(|_| {
            (0..PASSPHRASE_GROUP_LEN)
                .map(|_| PASSPHRASE_ALPHABET[rng.random_range(0..PASSPHRASE_ALPHABET.len())] as char)
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("-")
}

fn generate_mesh_psk() -> String {
    let mut psk = [0u8; MESH_PSK_BYTES];
    rand::rng().fill_bytes(&mut psk);
    STANDARD.encode(psk)
}

/// Uppercase alphanumerics of the team name, clipped to the radio limit
fn default_mesh_channel(name: &str) -> String {
    let channel: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(MESH_CHANNEL_MAX_LEN)
        .collect::<String>()
        .to_ascii_uppercase();
    if channel.is_empty() {
        FALLBACK_MESH_CHANNEL.to_string()
    } else {
        channel
    }
}
