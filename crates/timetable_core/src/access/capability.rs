//! Capability declarations and the per-call access context.
//!
//! # Responsibility
//! - Parse capability strings granted by the surrounding application.
//! - Answer "does this caller hold capability X" without defining the policy.
//!
//! # Invariants
//! - Capabilities are denied unless explicitly granted.
//! - The context is passed into every write call; nothing is read from
//!   process-global session state.

use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Capability gating a family of write operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    /// Create, move, cancel, and delete routine slots.
    ManageSchedule,
    /// Manage batches, subjects, and their relations.
    ManageBatches,
}

/// Granted-capability string for schedule management.
pub const CAPABILITY_MANAGE_SCHEDULE: &str = "manage_schedule";
/// Granted-capability string for batch management.
pub const CAPABILITY_MANAGE_BATCHES: &str = "manage_batches";

impl Capability {
    /// Stable string id used by the granting application.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManageSchedule => CAPABILITY_MANAGE_SCHEDULE,
            Self::ManageBatches => CAPABILITY_MANAGE_BATCHES,
        }
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses one capability string. Unknown values are rejected, not ignored.
pub fn parse_capability(value: &str) -> Result<Capability, CapabilityError> {
    let normalized = value.trim();
    if normalized.is_empty() {
        return Err(CapabilityError::EmptyCapability);
    }

    match normalized {
        CAPABILITY_MANAGE_SCHEDULE => Ok(Capability::ManageSchedule),
        CAPABILITY_MANAGE_BATCHES => Ok(Capability::ManageBatches),
        other => Err(CapabilityError::UnsupportedCapability(other.to_string())),
    }
}

/// Capability parse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    EmptyCapability,
    UnsupportedCapability(String),
}

impl Display for CapabilityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCapability => write!(f, "capability value must not be empty"),
            Self::UnsupportedCapability(value) => write!(f, "capability is unsupported: {value}"),
        }
    }
}

impl Error for CapabilityError {}

/// Opaque caller identity plus the capabilities granted to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessContext {
    pub actor_id: String,
    granted: BTreeSet<Capability>,
}

impl AccessContext {
    pub fn new(actor_id: impl Into<String>, granted: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            actor_id: actor_id.into(),
            granted: granted.into_iter().collect(),
        }
    }

    /// Builds a context from raw granted strings, rejecting unknown entries.
    pub fn from_grants<'a>(
        actor_id: impl Into<String>,
        grants: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, CapabilityError> {
        let granted = grants
            .into_iter()
            .map(parse_capability)
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self {
            actor_id: actor_id.into(),
            granted,
        })
    }

    pub fn allows(&self, capability: Capability) -> bool {
        self.granted.contains(&capability)
    }
}
