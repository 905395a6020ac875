//! Document store contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist one JSON body per entity in the `documents` table.
//! - Provide point reads, filtered finds, and field-level writes including
//!   set-insert / set-remove on relation arrays.
//! - Wrap a unit of work in one immediate transaction.
//!
//! # Invariants
//! - Bodies are re-validated as typed documents on every typed read.
//! - `add_to_set` never creates duplicates; `pull` removes every occurrence.
//! - Results of `find` follow insertion order.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::{Document, EntityId, EntityKind};
use rusqlite::types::Value as SqlValue;
use rusqlite::{
    params, params_from_iter, Connection, ErrorCode, OptionalExtension, Transaction,
    TransactionBehavior,
};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Store-level error for document persistence and queries.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound { kind: EntityKind, id: EntityId },
    AlreadyExists { kind: EntityKind, id: EntityId },
    /// Field is missing or does not hold the expected JSON shape.
    FieldShape {
        kind: EntityKind,
        id: EntityId,
        field: String,
    },
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    InvalidData(String),
}

impl RepoError {
    /// Whether the failure came from lock contention and the unit of work may
    /// succeed if run again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Db(DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _))) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { kind, id } => write!(f, "{kind} not found: {id}"),
            Self::AlreadyExists { kind, id } => write!(f, "{kind} already exists: {id}"),
            Self::FieldShape { kind, id, field } => {
                write!(f, "{kind} {id} has malformed field `{field}`")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "document store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted document: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Filter for `find` and `referencing` queries. Clauses are AND-ed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocFilter {
    pub active_only: bool,
    /// `field` (array or single ref) holds at least one of the ids.
    pub contains_any: Vec<(&'static str, Vec<EntityId>)>,
    /// `field` equals the JSON scalar. `Value::Null` matches missing/null.
    pub field_equals: Vec<(&'static str, Value)>,
}

impl DocFilter {
    pub fn active() -> Self {
        Self {
            active_only: true,
            ..Self::default()
        }
    }

    pub fn any_state() -> Self {
        Self::default()
    }

    pub fn containing_any(mut self, field: &'static str, ids: &[EntityId]) -> Self {
        self.contains_any.push((field, ids.to_vec()));
        self
    }

    pub fn with_field(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.field_equals.push((field, value.into()));
        self
    }

    fn matches_nothing(&self) -> bool {
        self.contains_any.iter().any(|(_, ids)| ids.is_empty())
    }
}

/// Repository interface over the scheduling documents.
///
/// All methods run on the caller's current transaction when invoked inside
/// `with_transaction`.
pub trait DocumentStore {
    fn get<D: Document>(&self, id: EntityId) -> RepoResult<Option<D>>;
    fn find<D: Document>(&self, filter: &DocFilter) -> RepoResult<Vec<D>>;
    fn insert<D: Document>(&self, doc: &D) -> RepoResult<()>;
    /// Replaces the body of an existing document.
    fn save<D: Document>(&self, doc: &D) -> RepoResult<()>;
    /// Overwrites top-level fields of an existing document.
    fn set_fields(&self, kind: EntityKind, id: EntityId, patch: &Map<String, Value>)
        -> RepoResult<()>;
    /// Set-insert into an array field. Fails with `NotFound` for a missing document.
    fn add_to_set(
        &self,
        kind: EntityKind,
        id: EntityId,
        field: &str,
        member: EntityId,
    ) -> RepoResult<bool>;
    /// Set-remove from an array field, or clears a single ref holding `member`.
    /// A missing document is not an error.
    fn pull(&self, kind: EntityKind, id: EntityId, field: &str, member: EntityId)
        -> RepoResult<bool>;
    fn delete(&self, kind: EntityKind, id: EntityId) -> RepoResult<bool>;
    /// Ids of `kind` documents whose `field` holds `member`.
    fn referencing(
        &self,
        kind: EntityKind,
        field: &'static str,
        member: EntityId,
        active_only: bool,
    ) -> RepoResult<Vec<EntityId>>;
    /// Bounds how long the next statements block on a lock held elsewhere.
    fn set_lock_wait(&self, wait: Duration) -> RepoResult<()>;
    /// Runs `work` as one atomic unit; any `Err` rolls every write back.
    fn with_transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RepoError>;
}

/// SQLite-backed document store.
///
/// Cheap to copy; copies share the borrowed connection and its transaction.
#[derive(Debug, Clone, Copy)]
pub struct SqliteDocumentStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDocumentStore<'conn> {
    /// Creates a store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_store_ready(conn)?;
        Ok(Self { conn })
    }

    fn load_body(&self, kind: EntityKind, id: EntityId) -> RepoResult<Option<String>> {
        let body = self
            .conn
            .query_row(
                "SELECT body FROM documents WHERE kind = ?1 AND id = ?2;",
                params![kind.as_str(), id.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(body)
    }

    fn write_body(&self, kind: EntityKind, id: EntityId, body: &str) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE documents
             SET body = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE kind = ?1 AND id = ?2;",
            params![kind.as_str(), id.to_string(), body],
        )?;
        Ok(changed > 0)
    }

    /// Loads a body as a JSON object, lets `edit` mutate it, and writes it back
    /// when `edit` reports a change. `None` means the document does not exist.
    fn edit_body(
        &self,
        kind: EntityKind,
        id: EntityId,
        edit: impl FnOnce(&mut Map<String, Value>) -> RepoResult<bool>,
    ) -> RepoResult<Option<bool>> {
        let Some(body) = self.load_body(kind, id)? else {
            return Ok(None);
        };
        let mut value: Value = serde_json::from_str(&body).map_err(|err| {
            RepoError::InvalidData(format!("{kind} {id} body is not JSON: {err}"))
        })?;
        let object = value.as_object_mut().ok_or_else(|| {
            RepoError::InvalidData(format!("{kind} {id} body is not a JSON object"))
        })?;

        let changed = edit(object)?;
        if changed {
            self.write_body(kind, id, &value.to_string())?;
        }
        Ok(Some(changed))
    }

    fn select_bodies(&self, kind: EntityKind, filter: &DocFilter) -> RepoResult<Vec<String>> {
        if filter.matches_nothing() {
            return Ok(Vec::new());
        }

        let mut sql = String::from("SELECT body FROM documents WHERE kind = ?");
        let mut bind_values = vec![SqlValue::Text(kind.as_str().to_string())];

        if filter.active_only {
            sql.push_str(" AND json_extract(body, '$.isActive') = 1");
        }

        for (field, ids) in &filter.contains_any {
            let placeholders = vec!["?"; ids.len()].join(", ");
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM json_each(documents.body, ?) AS member WHERE member.value IN ({placeholders}))"
            ));
            bind_values.push(SqlValue::Text(json_path(field)));
            bind_values.extend(ids.iter().map(|id| SqlValue::Text(id.to_string())));
        }

        for (field, value) in &filter.field_equals {
            match json_scalar_to_sql(value) {
                Some(sql_value) => {
                    sql.push_str(" AND json_extract(body, ?) = ?");
                    bind_values.push(SqlValue::Text(json_path(field)));
                    bind_values.push(sql_value);
                }
                None => {
                    sql.push_str(" AND json_extract(body, ?) IS NULL");
                    bind_values.push(SqlValue::Text(json_path(field)));
                }
            }
        }

        sql.push_str(" ORDER BY rowid ASC;");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut bodies = Vec::new();
        while let Some(row) = rows.next()? {
            bodies.push(row.get::<_, String>(0)?);
        }
        Ok(bodies)
    }
}

impl DocumentStore for SqliteDocumentStore<'_> {
    fn get<D: Document>(&self, id: EntityId) -> RepoResult<Option<D>> {
        self.load_body(D::KIND, id)?
            .map(|body| parse_document::<D>(&body))
            .transpose()
    }

    fn find<D: Document>(&self, filter: &DocFilter) -> RepoResult<Vec<D>> {
        self.select_bodies(D::KIND, filter)?
            .iter()
            .map(|body| parse_document::<D>(body))
            .collect()
    }

    fn insert<D: Document>(&self, doc: &D) -> RepoResult<()> {
        let body = serialize_document(doc)?;
        let inserted = self.conn.execute(
            "INSERT INTO documents (kind, id, body)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (kind, id) DO NOTHING;",
            params![D::KIND.as_str(), doc.id().to_string(), body],
        )?;
        if inserted == 0 {
            return Err(RepoError::AlreadyExists {
                kind: D::KIND,
                id: doc.id(),
            });
        }
        Ok(())
    }

    fn save<D: Document>(&self, doc: &D) -> RepoResult<()> {
        let body = serialize_document(doc)?;
        if !self.write_body(D::KIND, doc.id(), &body)? {
            return Err(RepoError::NotFound {
                kind: D::KIND,
                id: doc.id(),
            });
        }
        Ok(())
    }

    fn set_fields(
        &self,
        kind: EntityKind,
        id: EntityId,
        patch: &Map<String, Value>,
    ) -> RepoResult<()> {
        let outcome = self.edit_body(kind, id, |object| {
            let mut changed = false;
            for (field, value) in patch {
                if object.get(field) != Some(value) {
                    object.insert(field.clone(), value.clone());
                    changed = true;
                }
            }
            Ok(changed)
        })?;
        match outcome {
            Some(_) => Ok(()),
            None => Err(RepoError::NotFound { kind, id }),
        }
    }

    fn add_to_set(
        &self,
        kind: EntityKind,
        id: EntityId,
        field: &str,
        member: EntityId,
    ) -> RepoResult<bool> {
        let member_value = Value::String(member.to_string());
        let outcome = self.edit_body(kind, id, |object| {
            let members = array_field(object, kind, id, field)?;
            if members.contains(&member_value) {
                return Ok(false);
            }
            members.push(member_value.clone());
            Ok(true)
        })?;
        outcome.ok_or(RepoError::NotFound { kind, id })
    }

    fn pull(
        &self,
        kind: EntityKind,
        id: EntityId,
        field: &str,
        member: EntityId,
    ) -> RepoResult<bool> {
        let member_value = Value::String(member.to_string());
        let outcome = self.edit_body(kind, id, |object| match object.get_mut(field) {
            Some(Value::Array(members)) => {
                let before = members.len();
                members.retain(|value| value != &member_value);
                Ok(members.len() != before)
            }
            Some(single) if *single == member_value => {
                *single = Value::Null;
                Ok(true)
            }
            Some(Value::Null | Value::String(_)) | None => Ok(false),
            Some(_) => Err(RepoError::FieldShape {
                kind,
                id,
                field: field.to_string(),
            }),
        })?;
        Ok(outcome.unwrap_or(false))
    }

    fn delete(&self, kind: EntityKind, id: EntityId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM documents WHERE kind = ?1 AND id = ?2;",
            params![kind.as_str(), id.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn referencing(
        &self,
        kind: EntityKind,
        field: &'static str,
        member: EntityId,
        active_only: bool,
    ) -> RepoResult<Vec<EntityId>> {
        let filter = DocFilter {
            active_only,
            ..DocFilter::default()
        }
        .containing_any(field, &[member]);

        self.select_bodies(kind, &filter)?
            .iter()
            .map(|body| extract_id(kind, body))
            .collect()
    }

    fn set_lock_wait(&self, wait: Duration) -> RepoResult<()> {
        self.conn.busy_timeout(wait)?;
        Ok(())
    }

    fn with_transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RepoError>,
    {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(RepoError::from)?;
        // Statements issued through `self.conn` run inside `tx`; dropping `tx`
        // on the error path rolls them back.
        let output = work(self)?;
        tx.commit().map_err(RepoError::from)?;
        Ok(output)
    }
}

fn parse_document<D: Document>(body: &str) -> RepoResult<D> {
    serde_json::from_str(body)
        .map_err(|err| RepoError::InvalidData(format!("invalid {} document: {err}", D::KIND)))
}

fn serialize_document<D: Document>(doc: &D) -> RepoResult<String> {
    serde_json::to_string(doc).map_err(|err| {
        RepoError::InvalidData(format!(
            "cannot serialize {} {}: {err}",
            D::KIND,
            doc.id()
        ))
    })
}

fn extract_id(kind: EntityKind, body: &str) -> RepoResult<EntityId> {
    let value: Value = serde_json::from_str(body)
        .map_err(|err| RepoError::InvalidData(format!("{kind} body is not JSON: {err}")))?;
    value
        .get("id")
        .and_then(Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| RepoError::InvalidData(format!("{kind} body has no valid `id`")))
}

fn array_field<'a>(
    object: &'a mut Map<String, Value>,
    kind: EntityKind,
    id: EntityId,
    field: &str,
) -> RepoResult<&'a mut Vec<Value>> {
    object
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| RepoError::FieldShape {
            kind,
            id,
            field: field.to_string(),
        })
}

fn json_path(field: &str) -> String {
    format!("$.{field}")
}

fn json_scalar_to_sql(value: &Value) -> Option<SqlValue> {
    match value {
        Value::Null => None,
        Value::Bool(flag) => Some(SqlValue::Integer(i64::from(*flag))),
        Value::Number(number) => Some(
            number
                .as_i64()
                .map(SqlValue::Integer)
                .unwrap_or_else(|| SqlValue::Real(number.as_f64().unwrap_or_default())),
        ),
        Value::String(text) => Some(SqlValue::Text(text.clone())),
        // Arrays/objects compare by their JSON text.
        other => Some(SqlValue::Text(other.to_string())),
    }
}

fn ensure_store_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }
    Ok(())
}
