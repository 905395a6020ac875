//! Slot collision detection.
//!
//! # Responsibility
//! - Compare one candidate placement against a set of existing slots.
//! - Report collisions per dimension (batch, teacher, room, subject).
//!
//! # Invariants
//! - Pure: no I/O, output depends only on inputs.
//! - Cancelled, inactive, and self (same id) slots never conflict.
//! - Output order is BATCH, TEACHER, ROOM, SUBJECT, then input order.

use crate::model::slot::{RoutineSlot, SlotDay, SlotShapeError, TimeWindow};
use crate::model::validation::SlotDraft;
use crate::model::EntityId;
use serde::Serialize;
use std::fmt::{Display, Formatter};

/// Collision dimension. Declaration order is the reporting priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    BatchConflict,
    TeacherConflict,
    RoomConflict,
    SubjectConflict,
}

impl ConflictKind {
    pub const PRIORITY: [ConflictKind; 4] = [
        Self::BatchConflict,
        Self::TeacherConflict,
        Self::RoomConflict,
        Self::SubjectConflict,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BatchConflict => "BATCH_CONFLICT",
            Self::TeacherConflict => "TEACHER_CONFLICT",
            Self::RoomConflict => "ROOM_CONFLICT",
            Self::SubjectConflict => "SUBJECT_CONFLICT",
        }
    }
}

impl Display for ConflictKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected collision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub kind: ConflictKind,
    pub conflicting_slot_id: EntityId,
    /// Shared batches/teachers, or the subject for `SubjectConflict`.
    pub conflicting_entity_ids: Vec<EntityId>,
    /// Set for `RoomConflict` only.
    pub room_number: Option<String>,
}

impl Display for Conflict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} with slot {}", self.kind, self.conflicting_slot_id)?;
        if let Some(room) = &self.room_number {
            write!(f, " in room {room}")?;
        }
        if !self.conflicting_entity_ids.is_empty() {
            let ids = self
                .conflicting_entity_ids
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            write!(f, " on [{ids}]")?;
        }
        Ok(())
    }
}

/// The placement under test, borrowed from a draft or an existing slot.
#[derive(Debug, Clone, Copy)]
pub struct Placement<'a> {
    /// Excluded from the comparison set when set.
    pub slot_id: Option<EntityId>,
    pub subject: Option<EntityId>,
    pub batches: &'a [EntityId],
    pub teachers: &'a [EntityId],
    pub day: SlotDay,
    pub window: TimeWindow,
    pub room_number: Option<&'a str>,
}

impl<'a> Placement<'a> {
    pub fn from_draft(draft: &'a SlotDraft) -> Self {
        Self {
            slot_id: None,
            subject: Some(draft.subject),
            batches: &draft.batches,
            teachers: &draft.teachers,
            day: draft.day,
            window: draft.window,
            room_number: draft.room_number.as_deref(),
        }
    }

    pub fn from_slot(slot: &'a RoutineSlot) -> Result<Self, SlotShapeError> {
        Ok(Self {
            slot_id: Some(slot.id),
            subject: slot.subject,
            batches: &slot.batches,
            teachers: &slot.teachers,
            day: slot.slot_day()?,
            window: slot.window()?,
            room_number: slot.room_number.as_deref(),
        })
    }

    pub fn excluding(mut self, slot_id: Option<EntityId>) -> Self {
        self.slot_id = slot_id;
        self
    }
}

/// Returns every collision between `candidate` and `slots`.
///
/// Slots whose persisted shape is invalid are skipped.
pub fn find_conflicts(candidate: &Placement<'_>, slots: &[RoutineSlot]) -> Vec<Conflict> {
    let overlapping: Vec<&RoutineSlot> = slots
        .iter()
        .filter(|slot| slot.is_schedulable())
        .filter(|slot| Some(slot.id) != candidate.slot_id)
        .filter(|slot| occupies_same_time(candidate, slot))
        .collect();

    let mut conflicts = Vec::new();
    for kind in ConflictKind::PRIORITY {
        for slot in &overlapping {
            if let Some(conflict) = collide(kind, candidate, slot) {
                conflicts.push(conflict);
            }
        }
    }
    conflicts
}

/// Returns the highest-priority collision, if any. Used by write paths.
pub fn first_conflict(candidate: &Placement<'_>, slots: &[RoutineSlot]) -> Option<Conflict> {
    find_conflicts(candidate, slots).into_iter().next()
}

fn occupies_same_time(candidate: &Placement<'_>, slot: &RoutineSlot) -> bool {
    let (Ok(day), Ok(window)) = (slot.slot_day(), slot.window()) else {
        return false;
    };
    candidate.day.coincides_with(day) && candidate.window.overlaps(&window)
}

fn collide(kind: ConflictKind, candidate: &Placement<'_>, slot: &RoutineSlot) -> Option<Conflict> {
    let conflict = |ids: Vec<EntityId>, room_number: Option<String>| Conflict {
        kind,
        conflicting_slot_id: slot.id,
        conflicting_entity_ids: ids,
        room_number,
    };

    match kind {
        ConflictKind::BatchConflict => {
            let shared = shared_members(candidate.batches, &slot.batches);
            (!shared.is_empty()).then(|| conflict(shared, None))
        }
        ConflictKind::TeacherConflict => {
            let shared = shared_members(candidate.teachers, &slot.teachers);
            (!shared.is_empty()).then(|| conflict(shared, None))
        }
        ConflictKind::RoomConflict => {
            let room = candidate.room_number.filter(|room| !room.is_empty())?;
            (slot.room_number.as_deref() == Some(room))
                .then(|| conflict(Vec::new(), Some(room.to_string())))
        }
        ConflictKind::SubjectConflict => {
            let subject = candidate.subject?;
            if slot.subject != Some(subject) {
                return None;
            }
            let shared = shared_members(candidate.batches, &slot.batches);
            (!shared.is_empty()).then(|| conflict(vec![subject], None))
        }
    }
}

fn shared_members(left: &[EntityId], right: &[EntityId]) -> Vec<EntityId> {
    left.iter().filter(|id| right.contains(id)).copied().collect()
}
