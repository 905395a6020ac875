//! Document model for scheduling entities.
//!
//! # Responsibility
//! - Define canonical document shapes stored by the entity repository.
//! - Keep lifecycle stamps and relation arrays in one serialized body per entity.
//!
//! # Invariants
//! - Every document is identified by a stable `EntityId`.
//! - Relation arrays behave as sets: no duplicates, insertion order preserved.
//! - Deletion is a soft-delete tombstone first; hard delete is a separate step.

pub mod entities;
pub mod slot;
pub mod validation;

use self::slot::SlotShapeError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for every stored document.
pub type EntityId = Uuid;

/// Document collection discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Branch,
    Subject,
    Batch,
    Teacher,
    RoutineSlot,
    Assignment,
    Test,
}

impl EntityKind {
    /// Stable storage value written to `documents.kind`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Branch => "branch",
            Self::Subject => "subject",
            Self::Batch => "batch",
            Self::Teacher => "teacher",
            Self::RoutineSlot => "routine_slot",
            Self::Assignment => "assignment",
            Self::Test => "test",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed document persisted in the entity repository.
///
/// Serialized field names must match the relation field names used by the
/// edge catalogue (`schedule::edge`).
pub trait Document: Serialize + DeserializeOwned {
    const KIND: EntityKind;

    fn id(&self) -> EntityId;

    fn is_active(&self) -> bool;
}

/// Read access to a document's relation fields by their serialized name.
pub trait Relations {
    /// Current members of `field`; a single ref yields zero or one id.
    /// `None` when the document has no such relation field.
    fn members(&self, field: &str) -> Option<Vec<EntityId>>;

    /// Whether any relation field is non-empty.
    fn has_relations(&self) -> bool;
}

/// Documents that follow the soft-delete / restore / hard-delete lifecycle.
pub trait SoftDeletable: Document + Relations {
    fn deletion(&self) -> &DeletionStamp;

    fn audit_mut(&mut self) -> &mut AuditStamps;

    /// Flags the document inactive and stamps the tombstone.
    fn mark_deleted(&mut self, stamp: DeletionStamp);

    /// Shape checks run before every lifecycle write.
    fn check_shape(&self) -> Result<(), SlotShapeError> {
        Ok(())
    }

    /// Clears the tombstone and reactivates the document.
    fn mark_restored(&mut self);

    fn lifecycle_state(&self) -> LifecycleState {
        LifecycleState::of(self.is_active(), self.deletion())
    }
}

/// Creation/update audit fields shared by all documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStamps {
    pub created_at: i64,
    pub created_by: Option<String>,
    pub updated_at: i64,
    pub updated_by: Option<String>,
}

impl AuditStamps {
    pub fn created(actor_id: &str) -> Self {
        let now = now_epoch_ms();
        Self {
            created_at: now,
            created_by: Some(actor_id.to_string()),
            updated_at: now,
            updated_by: Some(actor_id.to_string()),
        }
    }

    pub fn touch(&mut self, actor_id: &str) {
        self.updated_at = now_epoch_ms();
        self.updated_by = Some(actor_id.to_string());
    }
}

/// Soft-delete tombstone for lifecycle-managed documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionStamp {
    pub deleted_at: Option<i64>,
    pub deleted_by: Option<String>,
    pub delete_reason: Option<String>,
}

impl DeletionStamp {
    pub fn stamped(actor_id: &str, reason: &str) -> Self {
        Self {
            deleted_at: Some(now_epoch_ms()),
            deleted_by: Some(actor_id.to_string()),
            delete_reason: Some(reason.to_string()),
        }
    }

    pub fn is_set(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Lifecycle position derived from `isActive` and the deletion stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Active,
    SoftDeleted,
}

impl LifecycleState {
    pub fn of(is_active: bool, deletion: &DeletionStamp) -> Self {
        if is_active && !deletion.is_set() {
            Self::Active
        } else {
            Self::SoftDeleted
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::SoftDeleted => "soft_deleted",
        }
    }
}

/// Inserts `id` keeping set semantics. Returns whether the set changed.
pub fn insert_member(members: &mut Vec<EntityId>, id: EntityId) -> bool {
    if members.contains(&id) {
        return false;
    }
    members.push(id);
    true
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
