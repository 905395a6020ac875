//! Timetable scheduling core.
//! Places routine slots without collisions and keeps the two-sided relation
//! fields between batches, subjects, teachers and slots in sync.

pub mod access;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod schedule;
pub mod service;

pub use access::capability::{AccessContext, Capability};
pub use config::{ConfigError, SchedulerConfig};
pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig, LoggingError};
pub use model::validation::{FieldError, SlotInput, SlotPatchInput};
pub use model::{EntityId, EntityKind, LifecycleState};
pub use repo::document_store::{DocFilter, DocumentStore, RepoError, SqliteDocumentStore};
pub use schedule::conflict::{Conflict, ConflictKind};
pub use service::context::{Deadline, RequestContext};
pub use service::coordinator::{
    AssignmentSummary, RelationKind, ScheduleCoordinator, TimetableQuery,
};
pub use service::error::{ScheduleError, ScheduleResult};
pub use service::lifecycle::{LifecycleKind, LifecycleManager};
pub use service::registry::{EntityRegistry, NewBatch};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
