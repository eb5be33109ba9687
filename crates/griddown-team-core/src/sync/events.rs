//! Team events and outward-facing observer hooks
//!
//! The engine publishes [`TeamEvent`]s on a `tokio::sync::broadcast` channel
//! after every local or remote change. UI layers subscribe with
//! [`TeamEngine::subscribe_events`](crate::TeamEngine::subscribe_events) and
//! never get called directly.

use crate::sync::envelope::SyncSubtype;
use crate::types::{MemberId, RallyPoint, Role, TeamId};

/// Notifications about team state
#[derive(Debug, Clone, PartialEq)]
pub enum TeamEvent {
    /// This node created a team and leads it
    TeamCreated { team_id: TeamId },
    /// This node joined a team from a package
    TeamJoined { team_id: TeamId },
    /// This node left its team
    TeamLeft { team_id: TeamId },
    /// The team was dissolved, by us (`remote == false`) or by the leader
    TeamDissolved { team_id: TeamId, remote: bool },
    /// A leader removed this node from the team
    RemovedFromTeam { team_id: TeamId },
    /// Team name, description or settings changed locally
    TeamInfoChanged { team_id: TeamId },
    /// A member's role changed locally
    RoleChanged { member_id: MemberId, role: Role },
    /// A member's profile or position changed locally
    MemberUpdated { member_id: MemberId },
    /// A member was removed locally
    MemberRemoved { member_id: MemberId },
    /// Rally point list changed locally
    RallyPointsChanged { count: usize },
    /// Comm plan changed locally
    CommPlanChanged,
    /// An inbound envelope was merged into the team record
    Synced { subtype: SyncSubtype, from: MemberId },
}

impl TeamEvent {
    /// Stable event name for hosts that route by string
    pub fn name(&self) -> &'static str {
        match self {
            TeamEvent::TeamCreated { .. } => "team:created",
            TeamEvent::TeamJoined { .. } => "team:joined",
            TeamEvent::TeamLeft { .. } => "team:left",
            TeamEvent::TeamDissolved { .. } => "team:dissolved",
            TeamEvent::RemovedFromTeam { .. } => "team:removed",
            TeamEvent::TeamInfoChanged { .. } => "team:info",
            TeamEvent::RoleChanged { .. } => "team:role",
            TeamEvent::MemberUpdated { .. } => "team:member",
            TeamEvent::MemberRemoved { .. } => "team:member_removed",
            TeamEvent::RallyPointsChanged { .. } => "team:rally",
            TeamEvent::CommPlanChanged => "team:comm_plan",
            TeamEvent::Synced { .. } => "team:synced",
        }
    }

    /// Whether the local team record no longer exists after this event
    pub fn is_teardown(&self) -> bool {
        matches!(
            self,
            TeamEvent::TeamLeft { .. }
                | TeamEvent::TeamDissolved { .. }
                | TeamEvent::RemovedFromTeam { .. }
        )
    }
}

/// Receives the full rally list after every change, e.g. to redraw them as
/// map waypoints.
pub trait RallyMirror: Send + Sync {
    fn rally_points_changed(&self, points: &[RallyPoint]);
}
