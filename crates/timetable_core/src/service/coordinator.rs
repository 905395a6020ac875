//! Slot scheduling and relation assignment use-cases.
//!
//! # Responsibility
//! - Validate, authorize and conflict-check slot writes.
//! - Run every write as one retried store transaction that also fans the
//!   change out to peer documents through `schedule::edge`.
//! - Serve read-only availability and timetable queries.
//!
//! # Invariants
//! - Authorization is checked before input validation.
//! - A rejected write (validation, conflict, missing reference) leaves the
//!   store unchanged.
//! - Relation fields of a slot are never written by `save`; only edge
//!   application changes them.

use crate::access::capability::Capability;
use crate::config::SchedulerConfig;
use crate::model::entities::{Batch, Subject, Teacher};
use crate::model::slot::RoutineSlot;
use crate::model::validation::{
    validate_slot_input, validate_slot_patch, SlotInput, SlotPatchInput,
};
use crate::model::{AuditStamps, DeletionStamp, EntityId, EntityKind};
use crate::repo::document_store::{DocFilter, DocumentStore, RepoError};
use crate::schedule::conflict::{find_conflicts, first_conflict, Conflict, Placement};
use crate::schedule::edge::{self, diff, diff_ref, Edge};
use crate::service::context::{transact, RequestContext};
use crate::service::error::{ScheduleError, ScheduleResult};
use crate::service::lifecycle::{self, LifecycleKind};
use crate::service::lookup::{
    active_members, comparison_slots, is_active_entity, require_active,
};
use log::info;
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

/// A set-valued relation that can be replaced from its parent side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    BatchSubjects,
    BatchMentors,
    BatchAssignments,
    BatchTests,
    SubjectBatches,
    SubjectTeachers,
    TeacherSubjects,
    TeacherBatches,
    SlotBatches,
    SlotTeachers,
}

impl RelationKind {
    pub const ALL: [RelationKind; 10] = [
        Self::BatchSubjects,
        Self::BatchMentors,
        Self::BatchAssignments,
        Self::BatchTests,
        Self::SubjectBatches,
        Self::SubjectTeachers,
        Self::TeacherSubjects,
        Self::TeacherBatches,
        Self::SlotBatches,
        Self::SlotTeachers,
    ];

    pub fn edge(self) -> &'static Edge {
        match self {
            Self::BatchSubjects | Self::SubjectBatches => &edge::SUBJECT_BATCHES,
            Self::BatchMentors | Self::TeacherBatches => &edge::BATCH_MENTORS,
            Self::BatchAssignments => &edge::BATCH_ASSIGNMENTS,
            Self::BatchTests => &edge::BATCH_TESTS,
            Self::SubjectTeachers | Self::TeacherSubjects => &edge::SUBJECT_TEACHERS,
            Self::SlotBatches => &edge::SLOT_BATCHES,
            Self::SlotTeachers => &edge::SLOT_TEACHERS,
        }
    }

    pub fn parent_kind(self) -> EntityKind {
        match self {
            Self::BatchSubjects | Self::BatchMentors | Self::BatchAssignments | Self::BatchTests => {
                EntityKind::Batch
            }
            Self::SubjectBatches | Self::SubjectTeachers => EntityKind::Subject,
            Self::TeacherSubjects | Self::TeacherBatches => EntityKind::Teacher,
            Self::SlotBatches | Self::SlotTeachers => EntityKind::RoutineSlot,
        }
    }

    pub fn capability(self) -> Capability {
        match self.parent_kind() {
            EntityKind::RoutineSlot => Capability::ManageSchedule,
            _ => Capability::ManageBatches,
        }
    }

    /// Looks up the relation stored in `field` on a `parent` document,
    /// e.g. `(Batch, "subjects")`.
    pub fn parse(parent: EntityKind, field: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| {
            kind.parent_kind() == parent
                && kind
                    .edge()
                    .oriented_from(parent)
                    .is_some_and(|(own, _)| own.field == field)
        })
    }
}

/// Outcome of `assign_relation`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentSummary {
    pub added: Vec<EntityId>,
    pub already_present: Vec<EntityId>,
    pub removed: Vec<EntityId>,
    /// Requested ids that are unknown or inactive. They were not linked.
    pub skipped_invalid_ids: Vec<EntityId>,
}

/// Read-only timetable selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimetableQuery {
    Batch(EntityId),
    Teacher(EntityId),
    Room(String),
}

/// Scheduling facade over a document store.
pub struct ScheduleCoordinator<S: DocumentStore> {
    store: S,
    config: SchedulerConfig,
}

impl<S: DocumentStore> ScheduleCoordinator<S> {
    pub fn new(store: S, config: SchedulerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates a slot and links it to its subject, batches and teachers.
    pub fn create_slot(&self, ctx: &RequestContext, input: &SlotInput) -> ScheduleResult<RoutineSlot> {
        ctx.authorize(Capability::ManageSchedule)?;
        let draft = validate_slot_input(input)?;

        let slot = transact(&self.store, &self.config, &ctx.deadline, "slot_create", |store| {
            require_active::<Subject, S>(store, draft.subject)?;
            for batch_id in &draft.batches {
                require_active::<Batch, S>(store, *batch_id)?;
            }
            for teacher_id in &draft.teachers {
                require_active::<Teacher, S>(store, *teacher_id)?;
            }

            let placement = Placement::from_draft(&draft);
            let pool = comparison_slots(
                store,
                &draft.batches,
                &draft.teachers,
                draft.room_number.as_deref(),
            )?;
            if let Some(conflict) = first_conflict(&placement, &pool) {
                return Err(ScheduleError::Conflict(conflict));
            }

            let (day, specific_date) = draft.day.into_columns();
            let slot = RoutineSlot {
                id: Uuid::new_v4(),
                subject: None,
                batches: Vec::new(),
                teachers: Vec::new(),
                day,
                specific_date,
                start_time: draft.window.start,
                end_time: draft.window.end,
                room_number: draft.room_number.clone(),
                mode: draft.mode,
                is_active: true,
                is_cancelled: false,
                audit: AuditStamps::created(ctx.actor_id()),
                deletion: DeletionStamp::default(),
            };
            slot.validate()?;
            store.insert(&slot)?;

            let kind = EntityKind::RoutineSlot;
            let subject_delta = diff_ref(None, Some(draft.subject));
            edge::apply(store, &edge::SLOT_SUBJECT, kind, slot.id, &subject_delta)?;
            edge::reconcile(store, &edge::SLOT_BATCHES, kind, slot.id, &[], &draft.batches)?;
            edge::reconcile(store, &edge::SLOT_TEACHERS, kind, slot.id, &[], &draft.teachers)?;

            require_active::<RoutineSlot, S>(store, slot.id)
        })?;

        info!(
            "event=slot_create module=coordinator status=ok slot_id={} actor_id={}",
            slot.id,
            ctx.actor_id()
        );
        Ok(slot)
    }

    /// Applies a partial update, re-checking conflicts against every other slot.
    pub fn update_slot(
        &self,
        ctx: &RequestContext,
        slot_id: EntityId,
        input: &SlotPatchInput,
    ) -> ScheduleResult<RoutineSlot> {
        ctx.authorize(Capability::ManageSchedule)?;
        let patch = validate_slot_patch(input)?;

        let slot = transact(&self.store, &self.config, &ctx.deadline, "slot_update", |store| {
            let current = require_active::<RoutineSlot, S>(store, slot_id)?;
            if patch.is_empty() {
                return Ok(current);
            }
            let next = patch.merged_onto(&current)?;

            if let Some(subject) = patch.subject {
                if current.subject != Some(subject) {
                    require_active::<Subject, S>(store, subject)?;
                }
            }
            for batch_id in diff(&current.batches, &next.batches).to_add {
                require_active::<Batch, S>(store, batch_id)?;
            }
            for teacher_id in diff(&current.teachers, &next.teachers).to_add {
                require_active::<Teacher, S>(store, teacher_id)?;
            }

            if next.is_schedulable() {
                ensure_no_conflict(store, &next)?;
            }

            let mut staged = next.clone();
            staged.subject = current.subject;
            staged.batches = current.batches.clone();
            staged.teachers = current.teachers.clone();
            staged.audit.touch(ctx.actor_id());
            staged.validate()?;
            store.save(&staged)?;

            let kind = EntityKind::RoutineSlot;
            let subject_delta = diff_ref(current.subject, next.subject);
            edge::apply(store, &edge::SLOT_SUBJECT, kind, slot_id, &subject_delta)?;
            edge::reconcile(
                store,
                &edge::SLOT_BATCHES,
                kind,
                slot_id,
                &current.batches,
                &next.batches,
            )?;
            edge::reconcile(
                store,
                &edge::SLOT_TEACHERS,
                kind,
                slot_id,
                &current.teachers,
                &next.teachers,
            )?;

            require_active::<RoutineSlot, S>(store, slot_id)
        })?;

        info!(
            "event=slot_update module=coordinator status=ok slot_id={} actor_id={}",
            slot.id,
            ctx.actor_id()
        );
        Ok(slot)
    }

    /// Cancels or reinstates a slot. Reinstating re-checks conflicts, since
    /// other slots may have taken the window meanwhile.
    pub fn set_slot_cancelled(
        &self,
        ctx: &RequestContext,
        slot_id: EntityId,
        cancelled: bool,
    ) -> ScheduleResult<RoutineSlot> {
        ctx.authorize(Capability::ManageSchedule)?;

        let slot = transact(&self.store, &self.config, &ctx.deadline, "slot_cancel", |store| {
            let mut slot = require_active::<RoutineSlot, S>(store, slot_id)?;
            if slot.is_cancelled == cancelled {
                return Ok(slot);
            }
            slot.is_cancelled = cancelled;
            if !cancelled {
                ensure_no_conflict(store, &slot)?;
            }
            slot.audit.touch(ctx.actor_id());
            slot.validate()?;
            store.save(&slot)?;
            Ok(slot)
        })?;

        info!(
            "event=slot_cancel module=coordinator status=ok slot_id={} cancelled={}",
            slot.id, slot.is_cancelled
        );
        Ok(slot)
    }

    /// Soft-deletes a slot, detaching it from every peer.
    pub fn delete_slot(
        &self,
        ctx: &RequestContext,
        slot_id: EntityId,
        reason: &str,
    ) -> ScheduleResult<()> {
        lifecycle::soft_delete_in(
            &self.store,
            &self.config,
            ctx,
            LifecycleKind::RoutineSlot,
            slot_id,
            reason,
        )
    }

    /// Replaces the membership of `kind` on `parent_id` with `member_ids`.
    ///
    /// Unknown or inactive member ids are skipped and reported; the rest is
    /// applied. Slot memberships are conflict-checked as a whole and fail
    /// with `Conflict` without applying anything.
    pub fn assign_relation(
        &self,
        ctx: &RequestContext,
        kind: RelationKind,
        parent_id: EntityId,
        member_ids: &[EntityId],
    ) -> ScheduleResult<AssignmentSummary> {
        ctx.authorize(kind.capability())?;
        let parent_kind = kind.parent_kind();
        let edge = kind.edge();
        let Some((own, peer)) = edge.oriented_from(parent_kind) else {
            return Err(ScheduleError::Repo(RepoError::InvalidData(format!(
                "edge `{}` has no `{parent_kind}` endpoint",
                edge.name
            ))));
        };

        let summary = transact(&self.store, &self.config, &ctx.deadline, "relation_assign", |store| {
            let current = active_members(store, parent_kind, parent_id, own.field)?;

            let mut seen = HashSet::new();
            let mut valid = Vec::new();
            let mut skipped_invalid_ids = Vec::new();
            for member_id in member_ids.iter().copied().filter(|id| seen.insert(*id)) {
                if is_active_entity(store, peer.kind, member_id)? {
                    valid.push(member_id);
                } else {
                    skipped_invalid_ids.push(member_id);
                }
            }

            let delta = diff(&current, &valid);
            if parent_kind == EntityKind::RoutineSlot && !delta.to_add.is_empty() {
                let mut proposed = require_active::<RoutineSlot, S>(store, parent_id)?;
                match kind {
                    RelationKind::SlotBatches => proposed.batches = valid.clone(),
                    _ => proposed.teachers = valid.clone(),
                }
                if proposed.is_schedulable() {
                    ensure_no_conflict(store, &proposed)?;
                }
            }
            edge::apply(store, edge, parent_kind, parent_id, &delta)?;

            let already_present = valid
                .iter()
                .copied()
                .filter(|id| current.contains(id))
                .collect();
            Ok(AssignmentSummary {
                added: delta.to_add,
                already_present,
                removed: delta.to_remove,
                skipped_invalid_ids,
            })
        })?;

        info!(
            "event=relation_assign module=coordinator status=ok relation={:?} parent_id={} added={} already_present={} removed={} skipped_invalid={}",
            kind,
            parent_id,
            summary.added.len(),
            summary.already_present.len(),
            summary.removed.len(),
            summary.skipped_invalid_ids.len()
        );
        Ok(summary)
    }

    /// Dry run: every conflict the input would raise, in priority order.
    ///
    /// Reads outside a transaction and does not check that the referenced
    /// entities exist.
    pub fn check_availability(
        &self,
        ctx: &RequestContext,
        input: &SlotInput,
        exclude_slot_id: Option<EntityId>,
    ) -> ScheduleResult<Vec<Conflict>> {
        ctx.authorize(Capability::ManageSchedule)?;
        let draft = validate_slot_input(input)?;
        let placement = Placement::from_draft(&draft).excluding(exclude_slot_id);
        let pool = comparison_slots(
            &self.store,
            &draft.batches,
            &draft.teachers,
            draft.room_number.as_deref(),
        )?;
        Ok(find_conflicts(&placement, &pool))
    }

    /// Active slots of one batch, teacher or room ordered by day then start.
    /// Weekly and dated slots on the same weekday interleave by start time.
    /// Cancelled slots are included.
    pub fn timetable(&self, query: &TimetableQuery) -> ScheduleResult<Vec<RoutineSlot>> {
        let filter = match query {
            TimetableQuery::Batch(id) => DocFilter::active().containing_any("batches", &[*id]),
            TimetableQuery::Teacher(id) => DocFilter::active().containing_any("teachers", &[*id]),
            TimetableQuery::Room(room) => DocFilter::active().with_field("roomNumber", room.trim()),
        };
        let mut slots = self.store.find::<RoutineSlot>(&filter)?;
        slots.sort_by_key(|slot| {
            let weekday = slot.slot_day().ok().map(|day| day.weekday());
            (weekday, slot.start_time, slot.specific_date)
        });
        Ok(slots)
    }
}

fn ensure_no_conflict<S: DocumentStore>(store: &S, slot: &RoutineSlot) -> ScheduleResult<()> {
    let placement = Placement::from_slot(slot)?;
    let pool = comparison_slots(store, &slot.batches, &slot.teachers, slot.room_number.as_deref())?;
    match first_conflict(&placement, &pool) {
        Some(conflict) => Err(ScheduleError::Conflict(conflict)),
        None => Ok(()),
    }
}
