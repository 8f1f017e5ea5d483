//! Authorization policy.
//!
//! Every record operation is decided here before any data access happens.
//! The decision is a pure function of the caller, the resource, the
//! operation and (for owner-gated rules) whether the caller owns the row.
//! An allowed operation carries the privilege the single store call must
//! run with.

use uuid::Uuid;

use crate::resources::ResourceKind;
use crate::types::{Identity, Operation, Privilege};

/// Who a rule admits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Any authenticated user; row-level restrictions still apply at normal privilege
    Anyone,
    /// The row's owner, or an admin
    AdminOrOwner,
    AdminOnly,
}

/// Whether the caller owns the row under consideration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    NotApplicable,
    Owner,
    NotOwner,
}

impl Ownership {
    pub fn of(owner: Option<&str>, user_id: Uuid) -> Self {
        match owner.and_then(|s| Uuid::parse_str(s).ok()) {
            Some(owner) if owner == user_id => Ownership::Owner,
            _ => Ownership::NotOwner,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow(Privilege),
    Deny(String),
}

struct Rule {
    kind: ResourceKind,
    ops: &'static [Operation],
    audience: Audience,
}

const ALL_OPS: &[Operation] = &[
    Operation::Read,
    Operation::List,
    Operation::Create,
    Operation::Update,
    Operation::Delete,
];
const READS: &[Operation] = &[Operation::Read, Operation::List];
const READS_AND_CREATE: &[Operation] = &[Operation::Read, Operation::List, Operation::Create];
const WRITES: &[Operation] = &[Operation::Create, Operation::Update, Operation::Delete];
const CHANGES: &[Operation] = &[Operation::Update, Operation::Delete];
const OWN_ACCESS: &[Operation] = &[Operation::Read, Operation::List, Operation::Update, Operation::Delete];

static RULES: &[Rule] = &[
    Rule { kind: ResourceKind::Joven, ops: ALL_OPS, audience: Audience::Anyone },
    Rule { kind: ResourceKind::Atencion, ops: READS_AND_CREATE, audience: Audience::Anyone },
    Rule { kind: ResourceKind::Atencion, ops: CHANGES, audience: Audience::AdminOrOwner },
    Rule { kind: ResourceKind::Formulario, ops: READS_AND_CREATE, audience: Audience::Anyone },
    Rule { kind: ResourceKind::Formulario, ops: CHANGES, audience: Audience::AdminOrOwner },
    Rule { kind: ResourceKind::Usuario, ops: ALL_OPS, audience: Audience::AdminOnly },
    Rule { kind: ResourceKind::Rol, ops: ALL_OPS, audience: Audience::AdminOnly },
    Rule { kind: ResourceKind::Modulo, ops: ALL_OPS, audience: Audience::AdminOnly },
    Rule { kind: ResourceKind::Permiso, ops: ALL_OPS, audience: Audience::AdminOnly },
    Rule { kind: ResourceKind::Centro, ops: READS, audience: Audience::Anyone },
    Rule { kind: ResourceKind::Centro, ops: WRITES, audience: Audience::AdminOnly },
    Rule { kind: ResourceKind::Notificacion, ops: OWN_ACCESS, audience: Audience::AdminOrOwner },
    Rule { kind: ResourceKind::Notificacion, ops: &[Operation::Create], audience: Audience::AdminOnly },
];

/// Audience for `(kind, op)`; pairs missing from the table admit admins only
pub fn audience(kind: ResourceKind, op: Operation) -> Audience {
    RULES
        .iter()
        .find(|r| r.kind == kind && r.ops.contains(&op))
        .map(|r| r.audience)
        .unwrap_or(Audience::AdminOnly)
}

/// Whether the row must be loaded to evaluate ownership before deciding
pub fn needs_ownership(identity: &Identity, kind: ResourceKind, op: Operation) -> bool {
    !identity.is_admin()
        && op != Operation::List
        && op != Operation::Create
        && audience(kind, op) == Audience::AdminOrOwner
}

/// Owner column a non-admin listing must be restricted to, if any
pub fn list_scope(identity: &Identity, kind: ResourceKind) -> Option<&'static str> {
    if identity.is_admin() || audience(kind, Operation::List) != Audience::AdminOrOwner {
        return None;
    }
    kind.def().owner_field
}

pub fn decide(identity: &Identity, kind: ResourceKind, op: Operation, ownership: Ownership) -> Decision {
    if identity.is_admin() {
        return Decision::Allow(Privilege::Elevated);
    }

    match audience(kind, op) {
        Audience::Anyone => Decision::Allow(Privilege::Normal),
        Audience::AdminOnly => Decision::Deny(format!("Only administrators may {} {}", op.as_str(), kind)),
        Audience::AdminOrOwner => match ownership {
            Ownership::Owner => Decision::Allow(Privilege::Normal),
            // Listings are narrowed to the caller's own rows instead
            Ownership::NotApplicable if op == Operation::List => Decision::Allow(Privilege::Normal),
            _ => Decision::Deny(format!(
                "Only the owner or an administrator may {} this {}",
                op.as_str(),
                kind
            )),
        },
    }
}
