//! Role to action permission matrix.
//!
//! # Purpose
//! Answers "may this role perform this action on this kind of resource".
//! Consulted by mutating and approving routes; reads that are already scoped
//! by organization do not go through it.
//!
//! # Key invariants
//! - The table is fixed and resource-kind independent.
//! - Anything not listed is denied.
//!
//! # Examples
//! ```rust
//! use atrium_authz::{Action, CanonicalRole, ResourceKind, can};
//!
//! assert!(can(CanonicalRole::Approver, Action::Approve, ResourceKind::Service));
//! assert!(!can(CanonicalRole::Viewer, Action::Create, ResourceKind::Content));
//! ```
use crate::{Action, CanonicalRole, ResourceKind};

const fn mask(actions: &[Action]) -> u8 {
    let mut bits = 0u8;
    let mut i = 0;
    while i < actions.len() {
        bits |= actions[i].bit();
        i += 1;
    }
    bits
}

const ADMIN: u8 = mask(&[
    Action::Create,
    Action::Read,
    Action::Update,
    Action::Delete,
    Action::Approve,
]);
const APPROVER: u8 = mask(&[Action::Read, Action::Approve]);
const EDITOR: u8 = mask(&[Action::Create, Action::Read, Action::Update]);
const VIEWER: u8 = mask(&[Action::Read]);

fn role_mask(role: CanonicalRole) -> u8 {
    match role {
        CanonicalRole::Admin => ADMIN,
        CanonicalRole::Approver => APPROVER,
        CanonicalRole::Editor => EDITOR,
        CanonicalRole::Viewer => VIEWER,
    }
}

pub fn can(role: CanonicalRole, action: Action, _resource: ResourceKind) -> bool {
    role_mask(role) & action.bit() != 0
}

/// Actions granted to `role`, in [`Action::ALL`] order.
pub fn allowed_actions(role: CanonicalRole) -> Vec<Action> {
    Action::ALL
        .into_iter()
        .filter(|action| role_mask(role) & action.bit() != 0)
        .collect()
}
