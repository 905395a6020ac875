//! Scheduling use-case services.
//!
//! # Responsibility
//! - Orchestrate store transactions, conflict checks and edge sync into
//!   caller-facing operations.
//! - Map every failure onto `ScheduleError`.

pub mod context;
pub mod coordinator;
pub mod error;
pub mod lifecycle;
mod lookup;
pub mod registry;
