//! Role-based permission model
//!
//! Each [`Role`] maps to a fixed set of [`Permission`] tokens. Every mutating
//! engine call resolves the caller's role and checks the token it needs
//! before touching the team record.
//!
//! Role changes carry extra rules on top of `edit_members`, enforced by
//! [`check_role_change`]:
//!
//! - only the leader may grant `leader` or `co-leader`
//! - granting `leader` demotes the previous leader to `co-leader`
//! - the leader's own role can only change through a handoff

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{TeamError, TeamResult};
use crate::types::{MemberId, Role, Team};

/// Mutation tokens checked by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    EditTeam,
    EditMembers,
    EditWaypoints,
    EditRoutes,
    EditPlan,
    Invite,
    RemoveMembers,
    DissolveTeam,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::EditTeam => "edit_team",
            Permission::EditMembers => "edit_members",
            Permission::EditWaypoints => "edit_waypoints",
            Permission::EditRoutes => "edit_routes",
            Permission::EditPlan => "edit_plan",
            Permission::Invite => "invite",
            Permission::RemoveMembers => "remove_members",
            Permission::DissolveTeam => "dissolve_team",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const LEADER: &[Permission] = &[
    Permission::EditTeam,
    Permission::EditMembers,
    Permission::EditWaypoints,
    Permission::EditRoutes,
    Permission::EditPlan,
    Permission::Invite,
    Permission::RemoveMembers,
    Permission::DissolveTeam,
];

const CO_LEADER: &[Permission] = &[
    Permission::EditTeam,
    Permission::EditMembers,
    Permission::EditWaypoints,
    Permission::EditRoutes,
    Permission::EditPlan,
    Permission::Invite,
    Permission::RemoveMembers,
];

const NAVIGATOR: &[Permission] = &[Permission::EditWaypoints, Permission::EditRoutes];
const SCOUT: &[Permission] = &[Permission::EditWaypoints];
const COMMS: &[Permission] = &[Permission::EditPlan, Permission::Invite];

/// The fixed permission set of a role
pub fn permissions_for(role: Role) -> &'static [Permission] {
    match role {
        Role::Leader => LEADER,
        Role::CoLeader => CO_LEADER,
        Role::Navigator => NAVIGATOR,
        Role::Scout => SCOUT,
        Role::Comms => COMMS,
        Role::Medic | Role::Support => &[],
    }
}

/// Whether `role` carries `permission`
pub fn has_permission(role: Role, permission: Permission) -> bool {
    permissions_for(role).contains(&permission)
}

/// Resolve `actor`'s role in `team` and require `permission`.
///
/// Returns the actor's role on success.
pub fn authorize(team: &Team, actor: &MemberId, permission: Permission) -> TeamResult<Role> {
    let role = team
        .role_of(actor)
        .ok_or_else(|| TeamError::MemberNotFound(actor.to_string()))?;
    if has_permission(role, permission) {
        Ok(role)
    } else {
        Err(TeamError::PermissionDenied(format!(
            "role '{}' lacks '{}'",
            role, permission
        )))
    }
}

/// Validate a role change of `target` to `new_role` requested by `actor`.
///
/// Does not mutate; the engine applies the change after this passes.
pub fn check_role_change(
    team: &Team,
    actor: &MemberId,
    target: &MemberId,
    new_role: Role,
) -> TeamResult<()> {
    let actor_role = authorize(team, actor, Permission::EditMembers)?;
    let target_role = team
        .role_of(target)
        .ok_or_else(|| TeamError::MemberNotFound(target.to_string()))?;

    if new_role.is_command() && actor_role != Role::Leader {
        return Err(TeamError::PermissionDenied(format!(
            "only the leader can assign '{}'",
            new_role
        )));
    }

    if target_role == Role::Leader && new_role != Role::Leader {
        return Err(TeamError::PermissionDenied(
            "leadership must be transferred, not vacated".to_string(),
        ));
    }

    Ok(())
}
