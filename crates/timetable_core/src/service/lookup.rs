//! Typed reads shared by the services, dispatched by `EntityKind` where the
//! caller only knows the kind at runtime.

use crate::model::entities::{Assignment, Batch, Branch, Subject, Teacher, Test};
use crate::model::slot::RoutineSlot;
use crate::model::{Document, EntityId, EntityKind, Relations};
use crate::repo::document_store::{DocFilter, DocumentStore};
use crate::service::error::{ScheduleError, ScheduleResult};
use std::collections::HashSet;

/// Loads `id` and fails with `NotFound` when it is absent or inactive.
pub(crate) fn require_active<D, S>(store: &S, id: EntityId) -> ScheduleResult<D>
where
    D: Document,
    S: DocumentStore,
{
    match store.get::<D>(id)? {
        Some(doc) if doc.is_active() => Ok(doc),
        _ => Err(ScheduleError::not_found(D::KIND, id)),
    }
}

/// Loads `id` in any lifecycle state.
pub(crate) fn require_existing<D, S>(store: &S, id: EntityId) -> ScheduleResult<D>
where
    D: Document,
    S: DocumentStore,
{
    store
        .get::<D>(id)?
        .ok_or_else(|| ScheduleError::not_found(D::KIND, id))
}

pub(crate) fn is_active_entity<S: DocumentStore>(
    store: &S,
    kind: EntityKind,
    id: EntityId,
) -> ScheduleResult<bool> {
    fn active<D: Document, S: DocumentStore>(store: &S, id: EntityId) -> ScheduleResult<bool> {
        Ok(store.get::<D>(id)?.is_some_and(|doc| doc.is_active()))
    }

    match kind {
        EntityKind::Branch => active::<Branch, S>(store, id),
        EntityKind::Subject => active::<Subject, S>(store, id),
        EntityKind::Batch => active::<Batch, S>(store, id),
        EntityKind::Teacher => active::<Teacher, S>(store, id),
        EntityKind::RoutineSlot => active::<RoutineSlot, S>(store, id),
        EntityKind::Assignment => active::<Assignment, S>(store, id),
        EntityKind::Test => active::<Test, S>(store, id),
    }
}

/// Current members of `field` on an active `kind` document.
pub(crate) fn active_members<S: DocumentStore>(
    store: &S,
    kind: EntityKind,
    id: EntityId,
    field: &str,
) -> ScheduleResult<Vec<EntityId>> {
    fn members<D, S>(store: &S, id: EntityId, field: &str) -> ScheduleResult<Vec<EntityId>>
    where
        D: Document + Relations,
        S: DocumentStore,
    {
        let doc = require_active::<D, S>(store, id)?;
        Ok(doc.members(field).unwrap_or_default())
    }

    match kind {
        EntityKind::Subject => members::<Subject, S>(store, id, field),
        EntityKind::Batch => members::<Batch, S>(store, id, field),
        EntityKind::Teacher => members::<Teacher, S>(store, id, field),
        EntityKind::RoutineSlot => members::<RoutineSlot, S>(store, id, field),
        EntityKind::Assignment => members::<Assignment, S>(store, id, field),
        EntityKind::Test => members::<Test, S>(store, id, field),
        EntityKind::Branch => Ok(Vec::new()),
    }
}

/// Every active slot that shares a batch, a teacher or the room with the
/// candidate. Cancelled slots are included; the checker skips them.
pub(crate) fn comparison_slots<S: DocumentStore>(
    store: &S,
    batches: &[EntityId],
    teachers: &[EntityId],
    room_number: Option<&str>,
) -> ScheduleResult<Vec<RoutineSlot>> {
    let mut filters = vec![
        DocFilter::active().containing_any("batches", batches),
        DocFilter::active().containing_any("teachers", teachers),
    ];
    if let Some(room) = room_number {
        filters.push(DocFilter::active().with_field("roomNumber", room));
    }

    let mut seen = HashSet::new();
    let mut slots = Vec::new();
    for filter in &filters {
        for slot in store.find::<RoutineSlot>(filter)? {
            if seen.insert(slot.id) {
                slots.push(slot);
            }
        }
    }
    Ok(slots)
}
