mod common;

use common::{admin, weekly, Campus};
use serde_json::{json, Map};
use timetable_core::model::entities::{Batch, Subject};
use timetable_core::model::slot::RoutineSlot;
use timetable_core::{
    open_db_in_memory, DocFilter, DocumentStore, EntityKind, RepoError, SqliteDocumentStore,
};
use uuid::Uuid;

#[test]
fn insert_get_and_save_round_trip_a_document() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteDocumentStore::try_new(&conn).unwrap();
    let mut subject = Subject::new("Math", Some("MTH".to_string()), "admin-1");

    store.insert(&subject).unwrap();
    subject.name = "Mathematics".to_string();
    store.save(&subject).unwrap();

    let loaded = store.get::<Subject>(subject.id).unwrap().unwrap();
    assert_eq!(loaded.name, "Mathematics");
    assert_eq!(loaded.code.as_deref(), Some("MTH"));
    assert!(store.get::<Subject>(Uuid::new_v4()).unwrap().is_none());
}

#[test]
fn saving_a_missing_document_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteDocumentStore::try_new(&conn).unwrap();
    let subject = Subject::new("Ghost", None, "admin-1");

    let err = store.save(&subject).unwrap_err();
    assert!(matches!(err, RepoError::NotFound { kind: EntityKind::Subject, .. }));
}

#[test]
fn set_operations_keep_members_unique() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteDocumentStore::try_new(&conn).unwrap();
    let batch = Batch::new("B1", None, 20, "admin-1");
    store.insert(&batch).unwrap();
    let subject = Uuid::new_v4();

    assert!(store.add_to_set(EntityKind::Batch, batch.id, "subjects", subject).unwrap());
    assert!(!store.add_to_set(EntityKind::Batch, batch.id, "subjects", subject).unwrap());
    assert_eq!(store.get::<Batch>(batch.id).unwrap().unwrap().subjects, vec![subject]);

    assert!(store.pull(EntityKind::Batch, batch.id, "subjects", subject).unwrap());
    assert!(!store.pull(EntityKind::Batch, batch.id, "subjects", subject).unwrap());
    assert!(!store.pull(EntityKind::Batch, Uuid::new_v4(), "subjects", subject).unwrap());

    let err = store
        .add_to_set(EntityKind::Batch, Uuid::new_v4(), "subjects", subject)
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound { .. }));
}

#[test]
fn referencing_sees_arrays_and_single_refs_and_honours_activity() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteDocumentStore::try_new(&conn).unwrap();
    let subject = Uuid::new_v4();
    let active = Batch::new("Active", None, 20, "admin-1");
    let mut retired = Batch::new("Retired", None, 20, "admin-1");
    retired.is_active = false;
    store.insert(&active).unwrap();
    store.insert(&retired).unwrap();
    for batch in [active.id, retired.id] {
        store.add_to_set(EntityKind::Batch, batch, "subjects", subject).unwrap();
    }

    assert_eq!(
        store.referencing(EntityKind::Batch, "subjects", subject, true).unwrap(),
        vec![active.id]
    );
    assert_eq!(
        store.referencing(EntityKind::Batch, "subjects", subject, false).unwrap(),
        vec![active.id, retired.id]
    );

    let campus = Campus::new(&conn);
    let math = campus.subject("Math");
    let slot = campus
        .coordinator
        .create_slot(&admin(), &weekly(math.id, &[active.id], &[], "MONDAY", "09:00", "10:00"))
        .unwrap();
    assert_eq!(
        store.referencing(EntityKind::RoutineSlot, "subject", math.id, true).unwrap(),
        vec![slot.id]
    );
    assert!(store.pull(EntityKind::RoutineSlot, slot.id, "subject", math.id).unwrap());
    assert_eq!(store.get::<RoutineSlot>(slot.id).unwrap().unwrap().subject, None);

    let mut patch = Map::new();
    patch.insert("subject".to_string(), json!(math.id.to_string()));
    store
        .set_fields(EntityKind::RoutineSlot, slot.id, &patch)
        .unwrap();
    assert_eq!(store.get::<RoutineSlot>(slot.id).unwrap().unwrap().subject, Some(math.id));
}

#[test]
fn find_filters_by_scalar_field_in_insertion_order() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteDocumentStore::try_new(&conn).unwrap();
    let first = Batch::new("B1", None, 20, "admin-1");
    let second = Batch::new("B2", None, 20, "admin-1");
    let other = Batch::new("B3", None, 30, "admin-1");
    for batch in [&first, &second, &other] {
        store.insert(batch).unwrap();
    }

    let found = store
        .find::<Batch>(&DocFilter::active().with_field("studentCapacity", 20))
        .unwrap();
    let ids: Vec<Uuid> = found.iter().map(|batch| batch.id).collect();
    assert_eq!(ids, vec![first.id, second.id]);
}

#[test]
fn failed_transaction_rolls_back_every_write() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteDocumentStore::try_new(&conn).unwrap();
    let batch = Batch::new("B1", None, 20, "admin-1");

    let outcome: Result<(), RepoError> = store.with_transaction(|tx| {
        tx.insert(&batch)?;
        Err(RepoError::InvalidData("abort".to_string()))
    });
    assert!(outcome.is_err());
    assert!(store.get::<Batch>(batch.id).unwrap().is_none());

    store
        .with_transaction(|tx| tx.insert(&batch))
        .unwrap();
    assert!(store.get::<Batch>(batch.id).unwrap().is_some());
}
