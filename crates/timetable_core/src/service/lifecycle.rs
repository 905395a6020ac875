//! Soft-delete, restore and hard-delete for subjects, batches and slots.
//!
//! # Responsibility
//! - Detach an entity from every peer before it is flagged deleted.
//! - Reactivate soft-deleted entities as empty shells.
//! - Purge only entities that nothing active points at anymore.
//!
//! # Invariants
//! - `ACTIVE -> SOFT_DELETED -> (ACTIVE | purged)`; no other transitions.
//! - A soft-deleted entity has empty relation fields.
//! - Each transition is one retried store transaction.

use crate::access::capability::Capability;
use crate::config::SchedulerConfig;
use crate::model::entities::{Batch, Subject};
use crate::model::slot::RoutineSlot;
use crate::model::validation::FieldError;
use crate::model::{DeletionStamp, EntityId, EntityKind, LifecycleState, SoftDeletable};
use crate::repo::document_store::DocumentStore;
use crate::schedule::conflict::{first_conflict, Placement};
use crate::schedule::edge::{detach_all, inbound_references};
use crate::service::context::{transact, RequestContext};
use crate::service::error::{ScheduleError, ScheduleResult};
use crate::service::lookup::{comparison_slots, require_existing};
use log::info;

/// Entity kinds that follow the soft-delete lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleKind {
    Subject,
    Batch,
    RoutineSlot,
}

impl LifecycleKind {
    pub fn entity_kind(self) -> EntityKind {
        match self {
            Self::Subject => EntityKind::Subject,
            Self::Batch => EntityKind::Batch,
            Self::RoutineSlot => EntityKind::RoutineSlot,
        }
    }

    fn capability(self) -> Capability {
        match self {
            Self::RoutineSlot => Capability::ManageSchedule,
            Self::Subject | Self::Batch => Capability::ManageBatches,
        }
    }
}

/// Lifecycle facade over a document store.
pub struct LifecycleManager<S: DocumentStore> {
    store: S,
    config: SchedulerConfig,
}

impl<S: DocumentStore> LifecycleManager<S> {
    pub fn new(store: S, config: SchedulerConfig) -> Self {
        Self { store, config }
    }

    /// Detaches the entity from all peers and tombstones it with `reason`.
    pub fn soft_delete(
        &self,
        ctx: &RequestContext,
        kind: LifecycleKind,
        id: EntityId,
        reason: &str,
    ) -> ScheduleResult<()> {
        soft_delete_in(&self.store, &self.config, ctx, kind, id, reason)
    }

    /// Reactivates a soft-deleted entity with empty relations.
    ///
    /// A restored slot comes back uncancelled and must not collide on its
    /// room with any active slot.
    pub fn restore(
        &self,
        ctx: &RequestContext,
        kind: LifecycleKind,
        id: EntityId,
    ) -> ScheduleResult<()> {
        ctx.authorize(kind.capability())?;

        transact(&self.store, &self.config, &ctx.deadline, "lifecycle_restore", |store| {
            match kind {
                LifecycleKind::Subject => restore_doc::<Subject, S>(store, ctx, id).map(drop),
                LifecycleKind::Batch => restore_doc::<Batch, S>(store, ctx, id).map(drop),
                LifecycleKind::RoutineSlot => {
                    let slot = restore_doc::<RoutineSlot, S>(store, ctx, id)?;
                    let placement = Placement::from_slot(&slot)?;
                    let pool = comparison_slots(store, &[], &[], slot.room_number.as_deref())?;
                    match first_conflict(&placement, &pool) {
                        Some(conflict) => Err(ScheduleError::Conflict(conflict)),
                        None => Ok(()),
                    }
                }
            }
        })?;

        info!(
            "event=lifecycle_restore module=lifecycle status=ok kind={} id={} actor_id={}",
            kind.entity_kind(),
            id,
            ctx.actor_id()
        );
        Ok(())
    }

    /// Removes a soft-deleted entity permanently.
    ///
    /// Refused while the entity still holds relations or any active document
    /// still points at it.
    pub fn hard_delete(
        &self,
        ctx: &RequestContext,
        kind: LifecycleKind,
        id: EntityId,
    ) -> ScheduleResult<()> {
        ctx.authorize(kind.capability())?;

        transact(&self.store, &self.config, &ctx.deadline, "lifecycle_purge", |store| {
            match kind {
                LifecycleKind::Subject => ensure_purgeable::<Subject, S>(store, id)?,
                LifecycleKind::Batch => ensure_purgeable::<Batch, S>(store, id)?,
                LifecycleKind::RoutineSlot => ensure_purgeable::<RoutineSlot, S>(store, id)?,
            }
            store.delete(kind.entity_kind(), id)?;
            Ok(())
        })?;

        info!(
            "event=lifecycle_purge module=lifecycle status=ok kind={} id={} actor_id={}",
            kind.entity_kind(),
            id,
            ctx.actor_id()
        );
        Ok(())
    }

    /// Current lifecycle state, `NotFound` if the document does not exist.
    pub fn state(&self, kind: LifecycleKind, id: EntityId) -> ScheduleResult<LifecycleState> {
        match kind {
            LifecycleKind::Subject => state_of::<Subject, S>(&self.store, id),
            LifecycleKind::Batch => state_of::<Batch, S>(&self.store, id),
            LifecycleKind::RoutineSlot => state_of::<RoutineSlot, S>(&self.store, id),
        }
    }
}

pub(crate) fn soft_delete_in<S: DocumentStore>(
    store: &S,
    config: &SchedulerConfig,
    ctx: &RequestContext,
    kind: LifecycleKind,
    id: EntityId,
    reason: &str,
) -> ScheduleResult<()> {
    ctx.authorize(kind.capability())?;
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ScheduleError::Validation(vec![FieldError::new(
            "reason",
            "is required",
        )]));
    }

    let peers_changed = transact(store, config, &ctx.deadline, "lifecycle_soft_delete", |tx| {
        match kind {
            LifecycleKind::Subject => soft_delete_doc::<Subject, S>(tx, ctx, id, reason),
            LifecycleKind::Batch => {
                let batch = require_existing::<Batch, S>(tx, id)?;
                if !batch.students.is_empty() {
                    return Err(ScheduleError::integrity(
                        EntityKind::Batch,
                        id,
                        format!("{} student(s) still enrolled", batch.students.len()),
                    ));
                }
                soft_delete_doc::<Batch, S>(tx, ctx, id, reason)
            }
            LifecycleKind::RoutineSlot => soft_delete_doc::<RoutineSlot, S>(tx, ctx, id, reason),
        }
    })?;

    info!(
        "event=lifecycle_soft_delete module=lifecycle status=ok kind={} id={} peers_changed={} actor_id={}",
        kind.entity_kind(),
        id,
        peers_changed,
        ctx.actor_id()
    );
    Ok(())
}

fn soft_delete_doc<D, S>(
    store: &S,
    ctx: &RequestContext,
    id: EntityId,
    reason: &str,
) -> ScheduleResult<usize>
where
    D: SoftDeletable,
    S: DocumentStore,
{
    let doc = require_existing::<D, S>(store, id)?;
    if doc.lifecycle_state() != LifecycleState::Active {
        return Err(ScheduleError::not_found(D::KIND, id));
    }

    let peers_changed = detach_all(store, D::KIND, id)?;
    let mut doc = require_existing::<D, S>(store, id)?;
    doc.mark_deleted(DeletionStamp::stamped(ctx.actor_id(), reason));
    doc.audit_mut().touch(ctx.actor_id());
    doc.check_shape()?;
    store.save(&doc)?;
    Ok(peers_changed)
}

fn restore_doc<D, S>(store: &S, ctx: &RequestContext, id: EntityId) -> ScheduleResult<D>
where
    D: SoftDeletable,
    S: DocumentStore,
{
    let doc = require_existing::<D, S>(store, id)?;
    if doc.lifecycle_state() != LifecycleState::SoftDeleted {
        return Err(ScheduleError::InvalidState {
            kind: D::KIND,
            id,
            expected: LifecycleState::SoftDeleted,
        });
    }

    // Drop anything that re-linked to the tombstone while it was deleted.
    detach_all(store, D::KIND, id)?;
    let mut doc = require_existing::<D, S>(store, id)?;
    doc.mark_restored();
    doc.audit_mut().touch(ctx.actor_id());
    doc.check_shape()?;
    store.save(&doc)?;
    Ok(doc)
}

fn ensure_purgeable<D, S>(store: &S, id: EntityId) -> ScheduleResult<()>
where
    D: SoftDeletable,
    S: DocumentStore,
{
    let doc = require_existing::<D, S>(store, id)?;
    if doc.lifecycle_state() != LifecycleState::SoftDeleted {
        return Err(ScheduleError::integrity(
            D::KIND,
            id,
            "entity must be soft-deleted before it is purged",
        ));
    }
    if doc.has_relations() {
        return Err(ScheduleError::integrity(
            D::KIND,
            id,
            "entity still holds relations",
        ));
    }
    let inbound = inbound_references(store, D::KIND, id)?;
    if let Some((peer_kind, peer_id)) = inbound.first() {
        return Err(ScheduleError::integrity(
            D::KIND,
            id,
            format!(
                "still referenced by {} active document(s), first {peer_kind} {peer_id}",
                inbound.len()
            ),
        ));
    }
    Ok(())
}

fn state_of<D, S>(store: &S, id: EntityId) -> ScheduleResult<LifecycleState>
where
    D: SoftDeletable,
    S: DocumentStore,
{
    Ok(require_existing::<D, S>(store, id)?.lifecycle_state())
}
