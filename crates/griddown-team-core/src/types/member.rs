//! Team members and their roles

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TeamError;
use crate::types::MemberId;

/// Members seen within this window are active
pub const ACTIVE_WINDOW_MS: i64 = 5 * 60 * 1000;

/// Members seen within this window (but not the active one) are stale
pub const STALE_WINDOW_MS: i64 = 15 * 60 * 1000;

/// Fixed set of member roles.
///
/// Exactly one member of a non-empty team holds [`Role::Leader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Leader,
    CoLeader,
    Scout,
    Medic,
    Navigator,
    Comms,
    Support,
}

impl Role {
    /// Every role, in rank order
    pub const ALL: [Role; 7] = [
        Role::Leader,
        Role::CoLeader,
        Role::Scout,
        Role::Medic,
        Role::Navigator,
        Role::Comms,
        Role::Support,
    ];

    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Leader => "leader",
            Role::CoLeader => "co-leader",
            Role::Scout => "scout",
            Role::Medic => "medic",
            Role::Navigator => "navigator",
            Role::Comms => "comms",
            Role::Support => "support",
        }
    }

    /// Leader and co-leader can only be granted by the leader
    pub fn is_command(&self) -> bool {
        matches!(self, Role::Leader | Role::CoLeader)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = TeamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == normalized)
            .ok_or_else(|| TeamError::InvalidRole(s.to_string()))
    }
}

/// Liveness derived from `last_seen`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Active,
    Stale,
    Offline,
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberStatus::Active => write!(f, "active"),
            MemberStatus::Stale => write!(f, "stale"),
            MemberStatus::Offline => write!(f, "offline"),
        }
    }
}

/// A participant in a team.
///
/// Deserializes leniently: a partial `member_joined` payload fills the
/// missing fields with defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    pub short_name: String,
    pub role: Role,
    /// When the member joined (unix ms)
    pub joined_at: i64,
    /// Last time any update from this member was seen (unix ms)
    pub last_seen: i64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl Default for Member {
    fn default() -> Self {
        Self {
            id: MemberId(String::new()),
            name: String::new(),
            short_name: String::new(),
            role: Role::Support,
            joined_at: 0,
            last_seen: 0,
            lat: None,
            lon: None,
        }
    }
}

impl Member {
    /// Create a member seen at `now`
    pub fn new(id: MemberId, name: &str, role: Role, now: i64) -> Self {
        Self {
            id,
            name: name.to_string(),
            short_name: short_name_for(name),
            role,
            joined_at: now,
            last_seen: now,
            lat: None,
            lon: None,
        }
    }

    /// Liveness with the default windows
    pub fn status_at(&self, now: i64) -> MemberStatus {
        self.status_with(now, ACTIVE_WINDOW_MS, STALE_WINDOW_MS)
    }

    /// Liveness with explicit windows
    pub fn status_with(&self, now: i64, active_window: i64, stale_window: i64) -> MemberStatus {
        let age = now.saturating_sub(self.last_seen);
        if age < active_window {
            MemberStatus::Active
        } else if age < stale_window {
            MemberStatus::Stale
        } else {
            MemberStatus::Offline
        }
    }

    /// Last known position, if both coordinates are present
    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Up to four uppercase alphanumerics taken from the display name
pub fn short_name_for(name: &str) -> String {
    let short: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(4)
        .collect::<String>()
        .to_ascii_uppercase();
    if short.is_empty() {
        "ANON".to_string()
    } else {
        short
    }
}
