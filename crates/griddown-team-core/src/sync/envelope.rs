//! Team sync envelopes
//!
//! Every team mutation that propagates over the mesh is wrapped in a small
//! JSON envelope sent as a mesh text message:
//!
//! ```text
//! { "_ts": "team", "tid": <team id>, "sub": <subtype>, "from": <member id>,
//!   "ts": <unix ms>, "d": <subtype payload> }
//! ```
//!
//! `_ts` tells team traffic apart from ordinary chat on the same channel.
//! There is no version, sequence number or acknowledgement.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TeamResult;
use crate::types::{MemberId, TeamId};

/// Value of the `_ts` field on team envelopes
pub const ENVELOPE_TAG: &str = "team";

/// What a sync envelope carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncSubtype {
    /// Name, description and settings
    TeamInfo,
    /// A newcomer announcing their member record
    MemberJoined,
    /// Partial or full member record
    MemberUpdate,
    /// A member leaving voluntarily
    MemberLeft,
    /// A member removed by a leader
    MemberRemoved,
    /// Full rally point list
    RallyUpdate,
    /// Comm plan fields
    CommPlan,
    /// Leader dissolved the team
    TeamDissolved,
}

impl SyncSubtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncSubtype::TeamInfo => "team_info",
            SyncSubtype::MemberJoined => "member_joined",
            SyncSubtype::MemberUpdate => "member_update",
            SyncSubtype::MemberLeft => "member_left",
            SyncSubtype::MemberRemoved => "member_removed",
            SyncSubtype::RallyUpdate => "rally_update",
            SyncSubtype::CommPlan => "comm_plan",
            SyncSubtype::TeamDissolved => "team_dissolved",
        }
    }
}

impl std::fmt::Display for SyncSubtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A team change broadcast over the mesh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamEnvelope {
    #[serde(rename = "_ts")]
    pub tag: String,
    #[serde(rename = "tid")]
    pub team_id: TeamId,
    #[serde(rename = "sub")]
    pub subtype: SyncSubtype,
    pub from: MemberId,
    /// Send time (unix ms)
    #[serde(rename = "ts")]
    pub timestamp: i64,
    #[serde(rename = "d", default)]
    pub payload: Value,
}

/// Result of reading a raw mesh text message
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedMessage {
    /// Ordinary chat or other traffic
    NotTeam,
    /// Tagged as team traffic but unreadable (bad fields, unknown subtype)
    Malformed(String),
    Envelope(TeamEnvelope),
}

impl TeamEnvelope {
    pub fn new(
        team_id: TeamId,
        subtype: SyncSubtype,
        from: MemberId,
        timestamp: i64,
        payload: Value,
    ) -> Self {
        Self {
            tag: ENVELOPE_TAG.to_string(),
            team_id,
            subtype,
            from,
            timestamp,
            payload,
        }
    }

    /// Serialize to the compact text sent over the mesh
    pub fn to_text(&self) -> TeamResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Classify a raw mesh text message
    pub fn parse(text: &str) -> ParsedMessage {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(_) => return ParsedMessage::NotTeam,
        };

        if value.get("_ts").and_then(Value::as_str) != Some(ENVELOPE_TAG) {
            return ParsedMessage::NotTeam;
        }

        match serde_json::from_value(value) {
            Ok(envelope) => ParsedMessage::Envelope(envelope),
            Err(e) => ParsedMessage::Malformed(e.to_string()),
        }
    }
}
