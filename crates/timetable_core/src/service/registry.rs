//! Creation of the entities slots point at, plus batch enrollment.
//!
//! # Invariants
//! - New entities start active with empty relation fields.
//! - `Batch.currentStudentCount == len(Batch.students)` after every write.
//! - Enrollment never exceeds `studentCapacity`.

use crate::access::capability::Capability;
use crate::config::SchedulerConfig;
use crate::model::entities::{Assignment, Batch, Branch, Subject, Teacher, Test};
use crate::model::validation::FieldError;
use crate::model::{insert_member, Document, EntityId};
use crate::repo::document_store::DocumentStore;
use crate::service::context::{transact, RequestContext};
use crate::service::error::{ScheduleError, ScheduleResult};
use crate::service::lookup::require_active;
use log::info;

/// New batch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBatch {
    pub name: String,
    pub branch: Option<EntityId>,
    pub student_capacity: u32,
}

/// Registry facade over a document store.
pub struct EntityRegistry<S: DocumentStore> {
    store: S,
    config: SchedulerConfig,
}

impl<S: DocumentStore> EntityRegistry<S> {
    pub fn new(store: S, config: SchedulerConfig) -> Self {
        Self { store, config }
    }

    pub fn create_branch(&self, ctx: &RequestContext, name: &str) -> ScheduleResult<Branch> {
        ctx.authorize(Capability::ManageBatches)?;
        let branch = Branch::new(required_name("name", name)?, ctx.actor_id());
        self.insert(ctx, branch)
    }

    pub fn create_subject(
        &self,
        ctx: &RequestContext,
        name: &str,
        code: Option<&str>,
    ) -> ScheduleResult<Subject> {
        ctx.authorize(Capability::ManageBatches)?;
        let code = code
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_ascii_uppercase);
        let subject = Subject::new(required_name("name", name)?, code, ctx.actor_id());
        self.insert(ctx, subject)
    }

    /// Creates a batch. A referenced branch must be active.
    pub fn create_batch(&self, ctx: &RequestContext, request: &NewBatch) -> ScheduleResult<Batch> {
        ctx.authorize(Capability::ManageBatches)?;
        let name = required_name("name", &request.name)?;
        if request.student_capacity == 0 {
            return Err(ScheduleError::Validation(vec![FieldError::new(
                "studentCapacity",
                "must be at least 1",
            )]));
        }

        let batch = transact(&self.store, &self.config, &ctx.deadline, "batch_create", |store| {
            if let Some(branch_id) = request.branch {
                require_active::<Branch, S>(store, branch_id)?;
            }
            let batch = Batch::new(
                name.clone(),
                request.branch,
                request.student_capacity,
                ctx.actor_id(),
            );
            store.insert(&batch)?;
            Ok(batch)
        })?;
        log_created(ctx, &batch);
        Ok(batch)
    }

    pub fn create_teacher(&self, ctx: &RequestContext, name: &str) -> ScheduleResult<Teacher> {
        ctx.authorize(Capability::ManageBatches)?;
        let teacher = Teacher::new(required_name("name", name)?, ctx.actor_id());
        self.insert(ctx, teacher)
    }

    pub fn create_assignment(&self, ctx: &RequestContext, title: &str) -> ScheduleResult<Assignment> {
        ctx.authorize(Capability::ManageBatches)?;
        let assignment = Assignment::new(required_name("title", title)?, ctx.actor_id());
        self.insert(ctx, assignment)
    }

    pub fn create_test(&self, ctx: &RequestContext, title: &str) -> ScheduleResult<Test> {
        ctx.authorize(Capability::ManageBatches)?;
        let test = Test::new(required_name("title", title)?, ctx.actor_id());
        self.insert(ctx, test)
    }

    /// Adds students to an active batch. Already-enrolled ids are ignored.
    ///
    /// Fails with `IntegrityViolation` when the batch would exceed capacity.
    pub fn enroll_students(
        &self,
        ctx: &RequestContext,
        batch_id: EntityId,
        student_ids: &[EntityId],
    ) -> ScheduleResult<Batch> {
        ctx.authorize(Capability::ManageBatches)?;

        let batch = transact(&self.store, &self.config, &ctx.deadline, "batch_enroll", |store| {
            let mut batch = require_active::<Batch, S>(store, batch_id)?;
            for student_id in student_ids {
                insert_member(&mut batch.students, *student_id);
            }
            if batch.students.len() > batch.student_capacity as usize {
                return Err(ScheduleError::integrity(
                    Batch::KIND,
                    batch_id,
                    format!(
                        "{} student(s) exceed capacity {}",
                        batch.students.len(),
                        batch.student_capacity
                    ),
                ));
            }
            batch.recount_students();
            batch.audit.touch(ctx.actor_id());
            store.save(&batch)?;
            Ok(batch)
        })?;

        info!(
            "event=batch_enroll module=registry status=ok batch_id={} student_count={}",
            batch.id, batch.current_student_count
        );
        Ok(batch)
    }

    /// Removes students from an active batch. Unknown ids are ignored.
    pub fn withdraw_students(
        &self,
        ctx: &RequestContext,
        batch_id: EntityId,
        student_ids: &[EntityId],
    ) -> ScheduleResult<Batch> {
        ctx.authorize(Capability::ManageBatches)?;

        let batch = transact(&self.store, &self.config, &ctx.deadline, "batch_withdraw", |store| {
            let mut batch = require_active::<Batch, S>(store, batch_id)?;
            batch.students.retain(|id| !student_ids.contains(id));
            batch.recount_students();
            batch.audit.touch(ctx.actor_id());
            store.save(&batch)?;
            Ok(batch)
        })?;

        info!(
            "event=batch_withdraw module=registry status=ok batch_id={} student_count={}",
            batch.id, batch.current_student_count
        );
        Ok(batch)
    }

    fn insert<D: Document>(&self, ctx: &RequestContext, doc: D) -> ScheduleResult<D> {
        ctx.deadline.check()?;
        self.store.insert(&doc)?;
        log_created(ctx, &doc);
        Ok(doc)
    }
}

fn required_name(field: &'static str, value: &str) -> ScheduleResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ScheduleError::Validation(vec![FieldError::new(
            field,
            "must not be blank",
        )]));
    }
    Ok(trimmed.to_string())
}

fn log_created<D: Document>(ctx: &RequestContext, doc: &D) {
    info!(
        "event=entity_create module=registry status=ok kind={} id={} actor_id={}",
        D::KIND,
        doc.id(),
        ctx.actor_id()
    );
}

#[cfg(test)]
mod tests {
    use super::required_name;
    use crate::service::error::ScheduleError;

    #[test]
    fn names_are_trimmed_and_required() {
        assert_eq!(required_name("name", "  Physics ").unwrap(), "Physics");
        assert!(matches!(
            required_name("name", "   "),
            Err(ScheduleError::Validation(errors)) if errors[0].field == "name"
        ));
    }
}
