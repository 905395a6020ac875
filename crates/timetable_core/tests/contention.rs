mod common;

use common::{admin, document_count, fast_config, weekly, Campus};
use std::time::{Duration, Instant};
use timetable_core::{
    open_db, AccessContext, Capability, ConflictKind, Deadline, NewBatch, RequestContext,
    ScheduleError, SchedulerConfig,
};

fn new_batch(name: &str) -> NewBatch {
    NewBatch {
        name: name.to_string(),
        branch: None,
        student_capacity: 30,
    }
}

fn batch_manager(deadline: Deadline) -> RequestContext {
    RequestContext::new(
        AccessContext::new("admin-1", [Capability::ManageBatches]),
        deadline,
    )
}

#[test]
fn writer_lock_held_elsewhere_surfaces_as_service_busy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("timetable.db");
    let conn = open_db(&path).unwrap();
    let holder = open_db(&path).unwrap();
    let campus = Campus::new(&conn);

    holder.execute_batch("BEGIN IMMEDIATE;").unwrap();
    let err = campus
        .registry
        .create_batch(&admin(), &new_batch("B1"))
        .unwrap_err();
    assert!(matches!(err, ScheduleError::ServiceBusy { attempts: 3 }));
    assert!(err.is_retryable());
    assert_eq!(err.code(), "service_busy");

    holder.execute_batch("ROLLBACK;").unwrap();
    let batch = campus
        .registry
        .create_batch(&admin(), &new_batch("B1"))
        .unwrap();
    assert_eq!(batch.name, "B1");
    assert_eq!(document_count(&conn, "batch"), 1);
}

#[test]
fn request_deadline_bounds_the_lock_wait() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("timetable.db");
    let conn = open_db(&path).unwrap();
    let holder = open_db(&path).unwrap();
    let campus = Campus::with_config(&conn, SchedulerConfig::default());

    holder.execute_batch("BEGIN IMMEDIATE;").unwrap();
    let started_at = Instant::now();
    let err = campus
        .registry
        .create_batch(&batch_manager(Deadline::after(Duration::from_millis(100))), &new_batch("B1"))
        .unwrap_err();
    let elapsed = started_at.elapsed();
    holder.execute_batch("ROLLBACK;").unwrap();

    assert!(matches!(err, ScheduleError::Timeout { .. }), "got {err}");
    assert!(elapsed < Duration::from_secs(1), "waited {elapsed:?}");
    assert_eq!(document_count(&conn, "batch"), 0);
}

#[test]
fn retries_stop_at_the_request_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("timetable.db");
    let conn = open_db(&path).unwrap();
    let holder = open_db(&path).unwrap();
    let patient = SchedulerConfig {
        max_attempts: 1_000,
        backoff_base_ms: 20,
        backoff_max_ms: 20,
        default_deadline_ms: None,
        lock_wait_ms: 5,
    };
    let campus = Campus::with_config(&conn, patient);

    holder.execute_batch("BEGIN IMMEDIATE;").unwrap();
    let err = campus
        .registry
        .create_batch(&batch_manager(Deadline::after(Duration::from_millis(60))), &new_batch("B1"))
        .unwrap_err();
    assert!(matches!(err, ScheduleError::Timeout { .. }), "got {err}");
    holder.execute_batch("ROLLBACK;").unwrap();
}

#[test]
fn second_connection_sees_the_committed_slot_as_a_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("timetable.db");
    let conn_a = open_db(&path).unwrap();
    let conn_b = open_db(&path).unwrap();
    let first = Campus::new(&conn_a);
    let second = Campus::new(&conn_b);
    let ctx = admin();

    let math = first.subject("Math");
    let batch = first.batch("B1");
    let (t1, t2) = (first.teacher("T1"), first.teacher("T2"));

    let committed = first
        .coordinator
        .create_slot(&ctx, &weekly(math.id, &[batch.id], &[t1.id], "MONDAY", "09:00", "10:00"))
        .unwrap();
    let err = second
        .coordinator
        .create_slot(&ctx, &weekly(math.id, &[batch.id], &[t2.id], "MONDAY", "09:30", "10:30"))
        .unwrap_err();

    assert!(matches!(
        err,
        ScheduleError::Conflict(ref conflict)
            if conflict.kind == ConflictKind::BatchConflict
                && conflict.conflicting_slot_id == committed.id
    ));
    assert_eq!(document_count(&conn_b, "routine_slot"), 1);
    assert!(second.reload::<timetable_core::model::entities::Teacher>(t2.id)
        .routine_slots
        .is_empty());
}

#[test]
fn expired_deadline_rejects_before_any_write() {
    let conn = timetable_core::open_db_in_memory().unwrap();
    let campus = Campus::new(&conn);

    let err = campus
        .registry
        .create_batch(&batch_manager(Deadline::after(Duration::ZERO)), &new_batch("B1"))
        .unwrap_err();
    assert!(matches!(err, ScheduleError::Timeout { .. }));
    assert_eq!(document_count(&conn, "batch"), 0);
}

#[test]
fn default_deadline_comes_from_config() {
    let config = SchedulerConfig {
        default_deadline_ms: Some(50),
        ..fast_config()
    };
    let ctx = RequestContext::with_default_deadline(
        AccessContext::new("admin-1", [Capability::ManageBatches]),
        &config,
    );
    let left = ctx.deadline.remaining().unwrap();
    assert!(left <= Duration::from_millis(50));

    let unbounded = RequestContext::with_default_deadline(
        AccessContext::new("admin-1", [Capability::ManageBatches]),
        &fast_config(),
    );
    assert_eq!(unbounded.deadline.remaining(), None);
}
