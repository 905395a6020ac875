//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the document-store contract the scheduling services depend on.
//! - Isolate SQLite/JSON details from service orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, `AlreadyExists`) in
//!   addition to DB transport errors.
//! - Transient lock contention is distinguishable via `RepoError::is_transient`.

pub mod document_store;
