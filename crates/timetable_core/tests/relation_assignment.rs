mod common;

use common::{admin, weekly, Campus};
use timetable_core::model::entities::{Assignment, Batch, Subject, Teacher};
use timetable_core::model::slot::RoutineSlot;
use timetable_core::{
    open_db_in_memory, AccessContext, Capability, ConflictKind, Deadline, EntityKind,
    LifecycleKind, RelationKind, RequestContext, ScheduleError,
};
use uuid::Uuid;

#[test]
fn assigning_the_same_teachers_twice_changes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let campus = Campus::new(&conn);
    let math = campus.subject("Math");
    let batch = campus.batch("B3");
    let (t3, t4) = (campus.teacher("T3"), campus.teacher("T4"));
    let ctx = admin();

    let slot = campus
        .coordinator
        .create_slot(&ctx, &weekly(math.id, &[batch.id], &[t3.id], "MONDAY", "10:00", "11:00"))
        .unwrap();

    let first = campus
        .coordinator
        .assign_relation(&ctx, RelationKind::SlotTeachers, slot.id, &[t3.id, t4.id])
        .unwrap();
    assert_eq!(first.added, vec![t4.id]);
    assert_eq!(first.already_present, vec![t3.id]);

    let second = campus
        .coordinator
        .assign_relation(&ctx, RelationKind::SlotTeachers, slot.id, &[t3.id, t4.id])
        .unwrap();
    assert!(second.added.is_empty());
    assert_eq!(second.already_present.len(), 2);
    assert!(second.removed.is_empty());

    assert_eq!(campus.reload::<RoutineSlot>(slot.id).teachers, vec![t3.id, t4.id]);
    assert_eq!(campus.reload::<Teacher>(t4.id).routine_slots, vec![slot.id]);
}

#[test]
fn replacing_membership_updates_both_sides() {
    let conn = open_db_in_memory().unwrap();
    let campus = Campus::new(&conn);
    let math = campus.subject("Math");
    let batch = campus.batch("B1");
    let (t1, t2, t3) = (campus.teacher("T1"), campus.teacher("T2"), campus.teacher("T3"));
    let ctx = admin();

    let slot = campus
        .coordinator
        .create_slot(
            &ctx,
            &weekly(math.id, &[batch.id], &[t1.id, t2.id], "MONDAY", "09:00", "10:00"),
        )
        .unwrap();

    let summary = campus
        .coordinator
        .assign_relation(&ctx, RelationKind::SlotTeachers, slot.id, &[t2.id, t3.id])
        .unwrap();
    assert_eq!(summary.added, vec![t3.id]);
    assert_eq!(summary.removed, vec![t1.id]);

    assert!(campus.reload::<Teacher>(t1.id).routine_slots.is_empty());
    assert_eq!(campus.reload::<Teacher>(t3.id).routine_slots, vec![slot.id]);
    for teacher in [t1.id, t2.id, t3.id] {
        let listed = campus.reload::<RoutineSlot>(slot.id).teachers.contains(&teacher);
        let back = campus.reload::<Teacher>(teacher).routine_slots.contains(&slot.id);
        assert_eq!(listed, back, "edge drifted for teacher {teacher}");
    }
}

#[test]
fn invalid_member_ids_are_reported_and_the_rest_applied() {
    let conn = open_db_in_memory().unwrap();
    let campus = Campus::new(&conn);
    let batch = campus.batch("B1");
    let (physics, retired) = (campus.subject("Physics"), campus.subject("Latin"));
    let ctx = admin();
    campus
        .lifecycle
        .soft_delete(&ctx, LifecycleKind::Subject, retired.id, "dropped")
        .unwrap();

    let ghost = Uuid::new_v4();
    let summary = campus
        .coordinator
        .assign_relation(
            &ctx,
            RelationKind::BatchSubjects,
            batch.id,
            &[physics.id, ghost, retired.id],
        )
        .unwrap();

    assert_eq!(summary.added, vec![physics.id]);
    assert_eq!(summary.skipped_invalid_ids, vec![ghost, retired.id]);
    assert_eq!(campus.reload::<Batch>(batch.id).subjects, vec![physics.id]);
    assert_eq!(campus.reload::<Subject>(physics.id).batches, vec![batch.id]);
    assert!(campus.reload::<Subject>(retired.id).batches.is_empty());
}

#[test]
fn relations_assigned_from_either_side_meet_in_the_middle() {
    let conn = open_db_in_memory().unwrap();
    let campus = Campus::new(&conn);
    let batch = campus.batch("B1");
    let mentor = campus.teacher("Grace");
    let subject = campus.subject("Math");
    let ctx = admin();

    campus
        .coordinator
        .assign_relation(&ctx, RelationKind::TeacherBatches, mentor.id, &[batch.id])
        .unwrap();
    assert_eq!(campus.reload::<Batch>(batch.id).mentors, vec![mentor.id]);

    campus
        .coordinator
        .assign_relation(&ctx, RelationKind::SubjectTeachers, subject.id, &[mentor.id])
        .unwrap();
    let summary = campus
        .coordinator
        .assign_relation(&ctx, RelationKind::TeacherSubjects, mentor.id, &[])
        .unwrap();
    assert_eq!(summary.removed, vec![subject.id]);
    assert!(campus.reload::<Subject>(subject.id).teachers.is_empty());
}

#[test]
fn batch_homework_and_tests_are_linked_both_ways() {
    let conn = open_db_in_memory().unwrap();
    let campus = Campus::new(&conn);
    let batch = campus.batch("B1");
    let ctx = admin();
    let homework = campus.registry.create_assignment(&ctx, "Worksheet 1").unwrap();
    let exam = campus.registry.create_test(&ctx, "Midterm").unwrap();

    campus
        .coordinator
        .assign_relation(&ctx, RelationKind::BatchAssignments, batch.id, &[homework.id])
        .unwrap();
    campus
        .coordinator
        .assign_relation(&ctx, RelationKind::BatchTests, batch.id, &[exam.id])
        .unwrap();

    let stored = campus.reload::<Batch>(batch.id);
    assert_eq!(stored.assignments, vec![homework.id]);
    assert_eq!(stored.tests, vec![exam.id]);
    assert_eq!(campus.reload::<Assignment>(homework.id).batches, vec![batch.id]);
}

#[test]
fn adding_a_busy_teacher_to_a_slot_fails_as_a_whole() {
    let conn = open_db_in_memory().unwrap();
    let campus = Campus::new(&conn);
    let math = campus.subject("Math");
    let (b1, b2) = (campus.batch("B1"), campus.batch("B2"));
    let (t1, t2, t3) = (campus.teacher("T1"), campus.teacher("T2"), campus.teacher("T3"));
    let ctx = admin();

    let busy = campus
        .coordinator
        .create_slot(&ctx, &weekly(math.id, &[b1.id], &[t1.id], "MONDAY", "09:00", "10:00"))
        .unwrap();
    let slot = campus
        .coordinator
        .create_slot(&ctx, &weekly(math.id, &[b2.id], &[t2.id], "MONDAY", "09:30", "10:30"))
        .unwrap();

    let err = campus
        .coordinator
        .assign_relation(&ctx, RelationKind::SlotTeachers, slot.id, &[t1.id, t3.id])
        .unwrap_err();
    assert!(matches!(
        err,
        ScheduleError::Conflict(ref conflict)
            if conflict.kind == ConflictKind::TeacherConflict && conflict.conflicting_slot_id == busy.id
    ));
    assert_eq!(campus.reload::<RoutineSlot>(slot.id).teachers, vec![t2.id]);
    assert!(campus.reload::<Teacher>(t3.id).routine_slots.is_empty());
}

#[test]
fn inactive_parent_and_missing_capability_are_rejected() {
    let conn = open_db_in_memory().unwrap();
    let campus = Campus::new(&conn);
    let batch = campus.batch("B1");
    let subject = campus.subject("Math");

    let scheduler_only = RequestContext::new(
        AccessContext::new("planner", [Capability::ManageSchedule]),
        Deadline::unbounded(),
    );
    let err = campus
        .coordinator
        .assign_relation(&scheduler_only, RelationKind::BatchSubjects, batch.id, &[subject.id])
        .unwrap_err();
    assert!(matches!(
        err,
        ScheduleError::Unauthorized {
            capability: Capability::ManageBatches,
            ..
        }
    ));

    let missing = Uuid::new_v4();
    let err = campus
        .coordinator
        .assign_relation(&admin(), RelationKind::BatchSubjects, missing, &[subject.id])
        .unwrap_err();
    assert!(matches!(
        err,
        ScheduleError::NotFound { kind: EntityKind::Batch, id } if id == missing
    ));
    assert!(campus.reload::<Subject>(subject.id).batches.is_empty());
}
