#![allow(dead_code)]

use rusqlite::Connection;
use timetable_core::model::entities::{Batch, Subject, Teacher};
use timetable_core::{
    AccessContext, Capability, Deadline, DocumentStore, EntityId, EntityRegistry,
    LifecycleManager, NewBatch, RequestContext, ScheduleCoordinator, SchedulerConfig, SlotInput,
    SqliteDocumentStore,
};

/// Services wired to one connection.
pub struct Campus<'conn> {
    pub store: SqliteDocumentStore<'conn>,
    pub registry: EntityRegistry<SqliteDocumentStore<'conn>>,
    pub coordinator: ScheduleCoordinator<SqliteDocumentStore<'conn>>,
    pub lifecycle: LifecycleManager<SqliteDocumentStore<'conn>>,
}

impl<'conn> Campus<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self::with_config(conn, fast_config())
    }

    pub fn with_config(conn: &'conn Connection, config: SchedulerConfig) -> Self {
        let store = SqliteDocumentStore::try_new(conn).unwrap();
        Self {
            store,
            registry: EntityRegistry::new(store, config.clone()),
            coordinator: ScheduleCoordinator::new(store, config.clone()),
            lifecycle: LifecycleManager::new(store, config),
        }
    }

    pub fn subject(&self, name: &str) -> Subject {
        self.registry.create_subject(&admin(), name, None).unwrap()
    }

    pub fn batch(&self, name: &str) -> Batch {
        self.registry
            .create_batch(
                &admin(),
                &NewBatch {
                    name: name.to_string(),
                    branch: None,
                    student_capacity: 40,
                },
            )
            .unwrap()
    }

    pub fn teacher(&self, name: &str) -> Teacher {
        self.registry.create_teacher(&admin(), name).unwrap()
    }

    pub fn reload<D: timetable_core::model::Document>(&self, id: EntityId) -> D {
        self.store.get::<D>(id).unwrap().unwrap()
    }
}

pub fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        max_attempts: 3,
        backoff_base_ms: 1,
        backoff_max_ms: 4,
        default_deadline_ms: None,
        lock_wait_ms: 5,
    }
}

pub fn admin() -> RequestContext {
    RequestContext::new(
        AccessContext::new(
            "admin-1",
            [Capability::ManageSchedule, Capability::ManageBatches],
        ),
        Deadline::unbounded(),
    )
}

pub fn viewer() -> RequestContext {
    RequestContext::new(AccessContext::new("viewer-1", Vec::new()), Deadline::unbounded())
}

/// Weekly slot request.
pub fn weekly(
    subject: EntityId,
    batches: &[EntityId],
    teachers: &[EntityId],
    day: &str,
    start: &str,
    end: &str,
) -> SlotInput {
    SlotInput {
        subject: Some(subject.to_string()),
        batches: batches.iter().map(ToString::to_string).collect(),
        teachers: teachers.iter().map(ToString::to_string).collect(),
        day: Some(day.to_string()),
        specific_date: None,
        start_time: start.to_string(),
        end_time: end.to_string(),
        room_number: None,
        mode: None,
    }
}

pub fn in_room(mut input: SlotInput, room: &str) -> SlotInput {
    input.room_number = Some(room.to_string());
    input
}

pub fn document_count(conn: &Connection, kind: &str) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM documents WHERE kind = ?1;",
        [kind],
        |row| row.get(0),
    )
    .unwrap()
}
