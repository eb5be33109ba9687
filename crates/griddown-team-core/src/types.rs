//! Core types for the team engine
//!
//! Everything here is plain data that travels over the mesh and into the
//! settings store as camelCase JSON.

pub mod comm_plan;
pub mod member;
pub mod rally;

pub use comm_plan::{CheckIn, CheckInFrequency, CommPlan};
pub use member::{Member, MemberStatus, Role, ACTIVE_WINDOW_MS, STALE_WINDOW_MS};
pub use rally::{RallyPoint, RallyPointUpdate, RallyType, MAX_RALLY_POINTS};

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Schema version stamped on every team record and package
pub const TEAM_FORMAT_VERSION: u32 = 1;

/// Current wall-clock time as unix milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh, time-ordered identifier
            pub fn generate() -> Self {
                Self(format!(concat!($prefix, "-{}"), Ulid::new().to_string().to_lowercase()))
            }

            /// Borrow the identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Unique identifier for a team
    TeamId,
    "team"
);

string_id!(
    /// Unique identifier for a member.
    ///
    /// Sourced from the mesh transport's node id when one is available.
    MemberId,
    "member"
);

string_id!(
    /// Unique identifier for a rally point
    RallyPointId,
    "rally"
);

/// Team-wide behaviour toggles shared with every member.
///
/// Unknown keys from newer peers are kept in `extra` so a shallow merge
/// round-trips them untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TeamSettings {
    /// Whether members broadcast their position
    pub share_location: bool,
    /// Position broadcast interval
    pub location_interval_secs: u64,
    /// Whether local edits are broadcast automatically
    pub auto_sync: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for TeamSettings {
    fn default() -> Self {
        Self {
            share_location: true,
            location_interval_secs: 60,
            auto_sync: true,
            extra: serde_json::Map::new(),
        }
    }
}

/// The shared team record.
///
/// A process holds at most one of these at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: TeamId,
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Creation time (unix ms)
    pub created: i64,
    /// Creator's member id; unknown for teams imported from a package
    #[serde(default)]
    pub created_by: Option<MemberId>,
    /// Shared secret for encrypted exports; absent when joined from a plain package
    #[serde(default)]
    pub passphrase: Option<String>,
    pub mesh_channel: String,
    #[serde(rename = "meshPSK")]
    pub mesh_psk: String,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub rally_points: Vec<RallyPoint>,
    #[serde(default)]
    pub comm_plan: CommPlan,
    #[serde(default)]
    pub settings: TeamSettings,
}

impl Team {
    /// Look up a member by id
    pub fn member(&self, id: &MemberId) -> Option<&Member> {
        self.members.iter().find(|m| &m.id == id)
    }

    /// Look up a member by id for mutation
    pub fn member_mut(&mut self, id: &MemberId) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| &m.id == id)
    }

    /// The current leader, if any
    pub fn leader(&self) -> Option<&Member> {
        self.members.iter().find(|m| m.role == Role::Leader)
    }

    /// Number of members holding the leader role
    pub fn leader_count(&self) -> usize {
        self.members.iter().filter(|m| m.role == Role::Leader).count()
    }

    /// Role held by the given member
    pub fn role_of(&self, id: &MemberId) -> Option<Role> {
        self.member(id).map(|m| m.role)
    }

    /// Look up a rally point by id
    pub fn rally_point(&self, id: &RallyPointId) -> Option<&RallyPoint> {
        self.rally_points.iter().find(|r| &r.id == id)
    }

    /// Demote every leader except `keep` to co-leader.
    ///
    /// Returns the ids of members that were demoted.
    pub fn demote_other_leaders(&mut self, keep: &MemberId) -> Vec<MemberId> {
        let mut demoted = Vec::new();
        for member in self.members.iter_mut() {
            if member.role == Role::Leader && &member.id != keep {
                member.role = Role::CoLeader;
                demoted.push(member.id.clone());
            }
        }
        demoted
    }
}
