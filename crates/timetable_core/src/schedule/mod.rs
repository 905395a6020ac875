//! Scheduling primitives shared by the coordinator and lifecycle services.
//!
//! # Responsibility
//! - `conflict`: decide whether a placement collides with existing slots.
//! - `edge`: the only code path that mutates relation arrays.

pub mod conflict;
pub mod edge;
