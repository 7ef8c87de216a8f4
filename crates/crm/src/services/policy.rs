//! Role policy.
//!
//! Every authenticated operation asks this table whether the caller's role
//! may perform it. Prospect-scoped operations additionally check
//! [`ProspectScope`]: a sales rep only reaches prospects assigned to them.

use cellionyx_core::{Role, UserId};

use crate::error::{AppError, Result};
use crate::models::{CurrentUser, Prospect};

/// An operation gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Read, edit, log activity on, schedule for or convert a prospect.
    WorkProspects,
    /// Create a prospect from the portal.
    CreateProspects,
    /// See every prospect, not just assigned ones.
    ViewAllPipeline,
    /// See and update every rep's appointments.
    ViewAllAppointments,
    /// Assign or reassign prospects by hand.
    AssignProspects,
    /// Hard-delete prospects.
    DeleteProspects,
    /// Create users, change roles, activate and deactivate.
    ManageUsers,
    /// Dashboard figures and performance refresh.
    ViewAnalytics,
    /// Read career applications.
    ViewApplications,
    /// Buy and spend device credits.
    UseCredits,
}

/// How far a role reaches into the prospect table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProspectScope {
    /// Every prospect.
    All,
    /// Only prospects assigned to the caller.
    Assigned,
    /// No prospects.
    None,
}

/// Whether `role` may perform `capability`.
#[must_use]
pub const fn allows(role: Role, capability: Capability) -> bool {
    match capability {
        Capability::WorkProspects | Capability::CreateProspects => !matches!(role, Role::Customer),
        // Country heads keep the broad grant over the whole pipeline.
        Capability::ViewAllPipeline => matches!(role, Role::Admin | Role::CountryHead),
        Capability::ViewAllAppointments
        | Capability::AssignProspects
        | Capability::DeleteProspects
        | Capability::ManageUsers
        | Capability::ViewAnalytics
        | Capability::ViewApplications => matches!(role, Role::Admin),
        Capability::UseCredits => matches!(role, Role::Customer),
    }
}

/// The prospect scope of a role.
#[must_use]
pub const fn prospect_scope(role: Role) -> ProspectScope {
    if allows(role, Capability::ViewAllPipeline) {
        ProspectScope::All
    } else if allows(role, Capability::WorkProspects) {
        ProspectScope::Assigned
    } else {
        ProspectScope::None
    }
}

/// Require a capability.
///
/// # Errors
///
/// Returns `AppError::PermissionDenied` if the caller's role lacks it.
pub fn require(caller: &CurrentUser, capability: Capability) -> Result<()> {
    if allows(caller.role, capability) {
        Ok(())
    } else {
        tracing::debug!(user_id = %caller.id, role = %caller.role, ?capability, "Denied");
        Err(AppError::PermissionDenied(denial_message(capability).to_owned()))
    }
}

/// Require access to a specific prospect.
///
/// # Errors
///
/// Returns `AppError::PermissionDenied` unless the caller's scope covers it.
pub fn require_prospect(caller: &CurrentUser, prospect: &Prospect) -> Result<()> {
    let permitted = match prospect_scope(caller.role) {
        ProspectScope::All => true,
        ProspectScope::Assigned => prospect.assigned_rep_id == Some(caller.id),
        ProspectScope::None => false,
    };
    if permitted {
        Ok(())
    } else {
        Err(AppError::PermissionDenied(
            "Not authorized to access this prospect".to_owned(),
        ))
    }
}

/// The rep a prospect write must be scoped to, if any.
///
/// Stores re-check this under their write lock, so a reassignment between
/// the read and the write cannot be raced.
#[must_use]
pub fn required_assignee(caller: &CurrentUser) -> Option<UserId> {
    match prospect_scope(caller.role) {
        ProspectScope::Assigned => Some(caller.id),
        ProspectScope::All | ProspectScope::None => None,
    }
}

const fn denial_message(capability: Capability) -> &'static str {
    match capability {
        Capability::UseCredits => "Customer access required",
        Capability::WorkProspects | Capability::CreateProspects | Capability::ViewAllPipeline => {
            "Sales staff access required"
        }
        _ => "Admin access required",
    }
}
