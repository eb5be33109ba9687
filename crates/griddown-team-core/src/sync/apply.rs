//! Inbound merge rules
//!
//! Pure functions that fold one [`TeamEnvelope`] into a [`Team`]. Merges are
//! last-writer-wins by arrival order: nothing here compares timestamps or
//! versions between the envelope and the record.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{TeamError, TeamResult};
use crate::sync::envelope::{SyncSubtype, TeamEnvelope};
use crate::types::member::short_name_for;
use crate::types::{Member, MemberId, RallyPoint, Role, Team};

/// Payload of `member_left` / `member_removed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRef {
    pub member_id: MemberId,
}

/// Payload of `rally_update`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RallyList {
    pub rally_points: Vec<RallyPoint>,
}

/// What an applied envelope did to the local record
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Record changed and stays
    Changed,
    /// A member record was inserted (first sighting)
    MemberAdded(MemberId),
    /// The local member was removed; tear the team down
    RemovedSelf,
    /// The team was dissolved; tear it down
    Dissolved,
}

/// Overlay the top-level keys of `patch` onto `current`.
///
/// Keys absent from `patch` keep their value; nested objects are replaced,
/// not merged.
pub fn shallow_merge<T>(current: &T, patch: &Value) -> TeamResult<T>
where
    T: Serialize + DeserializeOwned,
{
    let patch = patch
        .as_object()
        .ok_or_else(|| TeamError::Serialization("merge patch is not an object".to_string()))?;

    let mut base = serde_json::to_value(current)?;
    let fields = base
        .as_object_mut()
        .ok_or_else(|| TeamError::Serialization("merge target is not an object".to_string()))?;
    for (key, value) in patch {
        fields.insert(key.clone(), value.clone());
    }

    Ok(serde_json::from_value(base)?)
}

/// Apply `envelope` to `team` as seen by `self_id`.
///
/// The caller has already checked the team id and dropped our own echoes.
/// Errors mean the payload was unreadable; the record is left untouched.
pub fn apply_envelope(
    team: &mut Team,
    self_id: &MemberId,
    envelope: &TeamEnvelope,
    max_rally_points: usize,
) -> TeamResult<Effect> {
    match envelope.subtype {
        SyncSubtype::TeamInfo => {
            apply_team_info(team, &envelope.payload)?;
            Ok(Effect::Changed)
        }
        SyncSubtype::MemberJoined | SyncSubtype::MemberUpdate => {
            upsert_member(team, &envelope.from, &envelope.payload)
        }
        SyncSubtype::MemberLeft | SyncSubtype::MemberRemoved => {
            let target = match serde_json::from_value::<MemberRef>(envelope.payload.clone()) {
                Ok(r) => r.member_id,
                // a leaver may send an empty payload; the sender is the subject
                Err(_) if envelope.subtype == SyncSubtype::MemberLeft => envelope.from.clone(),
                Err(e) => return Err(e.into()),
            };
            if &target == self_id {
                return Ok(Effect::RemovedSelf);
            }
            team.members.retain(|m| m.id != target);
            Ok(Effect::Changed)
        }
        SyncSubtype::RallyUpdate => {
            let RallyList { mut rally_points } = serde_json::from_value(envelope.payload.clone())?;
            rally_points.truncate(max_rally_points);
            team.rally_points = rally_points;
            Ok(Effect::Changed)
        }
        SyncSubtype::CommPlan => {
            team.comm_plan = shallow_merge(&team.comm_plan, &envelope.payload)?;
            Ok(Effect::Changed)
        }
        SyncSubtype::TeamDissolved => Ok(Effect::Dissolved),
    }
}

fn apply_team_info(team: &mut Team, payload: &Value) -> TeamResult<()> {
    let fields = payload
        .as_object()
        .ok_or_else(|| TeamError::Serialization("team_info payload is not an object".to_string()))?;

    let settings = match fields.get("settings") {
        Some(patch) if patch.is_object() => Some(shallow_merge(&team.settings, patch)?),
        _ => None,
    };

    if let Some(name) = fields.get("name").and_then(Value::as_str) {
        team.name = name.to_string();
    }
    if let Some(description) = fields.get("description").and_then(Value::as_str) {
        team.description = description.to_string();
    }
    if let Some(settings) = settings {
        team.settings = settings;
    }
    Ok(())
}

fn upsert_member(team: &mut Team, sender: &MemberId, payload: &Value) -> TeamResult<Effect> {
    let fields = payload
        .as_object()
        .ok_or_else(|| TeamError::Serialization("member payload is not an object".to_string()))?;

    let id = fields
        .get("id")
        .and_then(Value::as_str)
        .map(MemberId::from)
        .unwrap_or_else(|| sender.clone());

    let (member, effect) = match team.member(&id) {
        Some(existing) => (shallow_merge(existing, payload)?, Effect::Changed),
        None => {
            let mut fresh: Member = serde_json::from_value(payload.clone())?;
            fresh.id = id.clone();
            if fresh.short_name.is_empty() {
                fresh.short_name = short_name_for(&fresh.name);
            }
            (fresh, Effect::MemberAdded(id.clone()))
        }
    };

    let is_leader = member.role == Role::Leader;
    match team.member_mut(&id) {
        Some(slot) => *slot = member,
        None => team.members.push(member),
    }

    if is_leader {
        let demoted = team.demote_other_leaders(&id);
        if !demoted.is_empty() {
            debug!(leader = %id, ?demoted, "Demoted previous leader after handoff");
        }
    }

    Ok(effect)
}

/// Bump the sender's `last_seen` to the envelope time, never backwards
pub fn touch_sender(team: &mut Team, sender: &MemberId, timestamp: i64) {
    if let Some(member) = team.member_mut(sender) {
        member.last_seen = member.last_seen.max(timestamp);
    }
}
