//! Non-slot documents that slots and relations point at.
//!
//! # Invariants
//! - Relation arrays mirror the peer side; see `schedule::edge` for the catalogue.
//! - `Batch::current_student_count` always equals `students.len()`.

use crate::model::{
    AuditStamps, DeletionStamp, Document, EntityId, EntityKind, Relations, SoftDeletable,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Physical campus a batch belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: EntityId,
    pub name: String,
    pub is_active: bool,
    #[serde(flatten)]
    pub audit: AuditStamps,
}

impl Branch {
    pub fn new(name: impl Into<String>, actor_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            is_active: true,
            audit: AuditStamps::created(actor_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: EntityId,
    pub name: String,
    pub code: Option<String>,
    #[serde(default)]
    pub batches: Vec<EntityId>,
    #[serde(default)]
    pub teachers: Vec<EntityId>,
    #[serde(default)]
    pub routines: Vec<EntityId>,
    pub is_active: bool,
    #[serde(flatten)]
    pub audit: AuditStamps,
    #[serde(flatten)]
    pub deletion: DeletionStamp,
}

impl Subject {
    pub fn new(name: impl Into<String>, code: Option<String>, actor_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            code,
            batches: Vec::new(),
            teachers: Vec::new(),
            routines: Vec::new(),
            is_active: true,
            audit: AuditStamps::created(actor_id),
            deletion: DeletionStamp::default(),
        }
    }
}

/// A cohort of students that attends slots together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: EntityId,
    pub name: String,
    pub branch: Option<EntityId>,
    #[serde(default)]
    pub subjects: Vec<EntityId>,
    #[serde(default)]
    pub mentors: Vec<EntityId>,
    #[serde(default)]
    pub routine_slots: Vec<EntityId>,
    #[serde(default)]
    pub assignments: Vec<EntityId>,
    #[serde(default)]
    pub tests: Vec<EntityId>,
    #[serde(default)]
    pub students: Vec<EntityId>,
    pub student_capacity: u32,
    #[serde(default)]
    pub current_student_count: u32,
    pub is_active: bool,
    #[serde(flatten)]
    pub audit: AuditStamps,
    #[serde(flatten)]
    pub deletion: DeletionStamp,
}

impl Batch {
    pub fn new(
        name: impl Into<String>,
        branch: Option<EntityId>,
        student_capacity: u32,
        actor_id: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            branch,
            subjects: Vec::new(),
            mentors: Vec::new(),
            routine_slots: Vec::new(),
            assignments: Vec::new(),
            tests: Vec::new(),
            students: Vec::new(),
            student_capacity,
            current_student_count: 0,
            is_active: true,
            audit: AuditStamps::created(actor_id),
            deletion: DeletionStamp::default(),
        }
    }

    /// Recomputes the derived counter from the authoritative student list.
    pub fn recount_students(&mut self) {
        self.current_student_count = u32::try_from(self.students.len()).unwrap_or(u32::MAX);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub subjects: Vec<EntityId>,
    #[serde(default)]
    pub batches: Vec<EntityId>,
    #[serde(default)]
    pub routine_slots: Vec<EntityId>,
    pub is_active: bool,
    #[serde(flatten)]
    pub audit: AuditStamps,
}

impl Teacher {
    pub fn new(name: impl Into<String>, actor_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            subjects: Vec::new(),
            batches: Vec::new(),
            routine_slots: Vec::new(),
            is_active: true,
            audit: AuditStamps::created(actor_id),
        }
    }
}

/// Homework handed to one or more batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: EntityId,
    pub title: String,
    #[serde(default)]
    pub batches: Vec<EntityId>,
    pub is_active: bool,
    #[serde(flatten)]
    pub audit: AuditStamps,
}

impl Assignment {
    pub fn new(title: impl Into<String>, actor_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            batches: Vec::new(),
            is_active: true,
            audit: AuditStamps::created(actor_id),
        }
    }
}

/// Exam sat by one or more batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    pub id: EntityId,
    pub title: String,
    #[serde(default)]
    pub batches: Vec<EntityId>,
    pub is_active: bool,
    #[serde(flatten)]
    pub audit: AuditStamps,
}

impl Test {
    pub fn new(title: impl Into<String>, actor_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            batches: Vec::new(),
            is_active: true,
            audit: AuditStamps::created(actor_id),
        }
    }
}

macro_rules! impl_document {
    ($($ty:ty => $kind:expr),+ $(,)?) => {
        $(
            impl Document for $ty {
                const KIND: EntityKind = $kind;

                fn id(&self) -> EntityId {
                    self.id
                }

                fn is_active(&self) -> bool {
                    self.is_active
                }
            }
        )+
    };
}

impl_document!(
    Branch => EntityKind::Branch,
    Subject => EntityKind::Subject,
    Batch => EntityKind::Batch,
    Teacher => EntityKind::Teacher,
    Assignment => EntityKind::Assignment,
    Test => EntityKind::Test,
);

macro_rules! impl_relations {
    ($($ty:ty { $($field:literal => $member:ident),+ $(,)? }),+ $(,)?) => {
        $(
            impl Relations for $ty {
                fn members(&self, field: &str) -> Option<Vec<EntityId>> {
                    match field {
                        $($field => Some(self.$member.clone()),)+
                        _ => None,
                    }
                }

                fn has_relations(&self) -> bool {
                    $(!self.$member.is_empty())||+
                }
            }
        )+
    };
}

impl_relations!(
    Subject {
        "batches" => batches,
        "teachers" => teachers,
        "routines" => routines,
    },
    Batch {
        "subjects" => subjects,
        "mentors" => mentors,
        "routineSlots" => routine_slots,
        "assignments" => assignments,
        "tests" => tests,
    },
    Teacher {
        "subjects" => subjects,
        "batches" => batches,
        "routineSlots" => routine_slots,
    },
    Assignment { "batches" => batches },
    Test { "batches" => batches },
);

macro_rules! impl_soft_deletable {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl SoftDeletable for $ty {
                fn deletion(&self) -> &DeletionStamp {
                    &self.deletion
                }

                fn audit_mut(&mut self) -> &mut AuditStamps {
                    &mut self.audit
                }

                fn mark_deleted(&mut self, stamp: DeletionStamp) {
                    self.is_active = false;
                    self.deletion = stamp;
                }

                fn mark_restored(&mut self) {
                    self.is_active = true;
                    self.deletion = DeletionStamp::default();
                }
            }
        )+
    };
}

impl_soft_deletable!(Subject, Batch);

#[cfg(test)]
mod tests {
    use super::{Batch, Subject};
    use crate::model::{DeletionStamp, LifecycleState, Relations, SoftDeletable};
    use uuid::Uuid;

    #[test]
    fn recount_tracks_student_list() {
        let mut batch = Batch::new("Morning", None, 30, "admin");
        batch.students = vec![Uuid::new_v4(), Uuid::new_v4()];
        batch.current_student_count = 7;
        batch.recount_students();
        assert_eq!(batch.current_student_count, 2);
    }

    #[test]
    fn batch_serializes_relation_fields_in_camel_case() {
        let batch = Batch::new("Evening", None, 20, "admin");
        let value = serde_json::to_value(&batch).unwrap();
        assert!(value.get("routineSlots").is_some());
        assert!(value.get("currentStudentCount").is_some());
        assert_eq!(value.get("isActive"), Some(&serde_json::Value::Bool(true)));
        assert!(value.get("deletedAt").is_some());
    }

    #[test]
    fn students_are_not_a_relation_field() {
        let mut batch = Batch::new("Weekend", None, 10, "admin");
        batch.students.push(Uuid::new_v4());
        assert!(!batch.has_relations());
        assert_eq!(batch.members("students"), None);

        let mentor = Uuid::new_v4();
        batch.mentors.push(mentor);
        assert!(batch.has_relations());
        assert_eq!(batch.members("mentors"), Some(vec![mentor]));
    }

    #[test]
    fn soft_delete_and_restore_flip_lifecycle_state() {
        let mut subject = Subject::new("Physics", Some("PHY".to_string()), "admin");
        assert_eq!(subject.lifecycle_state(), LifecycleState::Active);

        subject.mark_deleted(DeletionStamp::stamped("admin", "merged"));
        assert_eq!(subject.lifecycle_state(), LifecycleState::SoftDeleted);
        assert_eq!(subject.deletion.delete_reason.as_deref(), Some("merged"));

        subject.mark_restored();
        assert_eq!(subject.lifecycle_state(), LifecycleState::Active);
        assert!(!subject.deletion.is_set());
    }
}
