//! Caller identity and capability checks consumed by write operations.

pub mod capability;
