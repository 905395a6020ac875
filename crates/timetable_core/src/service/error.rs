//! Error taxonomy returned by every scheduling use-case.

use crate::access::capability::Capability;
use crate::model::validation::FieldError;
use crate::model::slot::SlotShapeError;
use crate::model::{EntityId, EntityKind, LifecycleState};
use crate::repo::document_store::RepoError;
use crate::schedule::conflict::Conflict;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Service error for scheduling, relation and lifecycle operations.
#[derive(Debug)]
pub enum ScheduleError {
    /// Input is malformed; every offending field is listed.
    Validation(Vec<FieldError>),
    /// Referenced entity is absent or inactive.
    NotFound { kind: EntityKind, id: EntityId },
    /// The placement collides with an existing slot.
    Conflict(Conflict),
    Unauthorized {
        actor_id: String,
        capability: Capability,
    },
    /// The operation would leave dangling or inconsistent references.
    IntegrityViolation {
        kind: EntityKind,
        id: EntityId,
        reason: String,
    },
    /// Entity exists but is not in the lifecycle state the operation needs.
    InvalidState {
        kind: EntityKind,
        id: EntityId,
        expected: LifecycleState,
    },
    /// Store stayed contended through every retry.
    ServiceBusy { attempts: u32 },
    /// The caller's deadline expired before commit.
    Timeout { elapsed_ms: u128 },
    Repo(RepoError),
}

impl ScheduleError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Unauthorized { .. } => "unauthorized",
            Self::IntegrityViolation { .. } => "integrity_violation",
            Self::InvalidState { .. } => "invalid_state",
            Self::ServiceBusy { .. } => "service_busy",
            Self::Timeout { .. } => "timeout",
            Self::Repo(_) => "repo",
        }
    }

    /// Whether a caller may reasonably resubmit the same request later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ServiceBusy { .. } | Self::Timeout { .. } => true,
            Self::Repo(err) => err.is_transient(),
            _ => false,
        }
    }

    pub(crate) fn is_transient(&self) -> bool {
        matches!(self, Self::Repo(err) if err.is_transient())
    }

    pub(crate) fn not_found(kind: EntityKind, id: EntityId) -> Self {
        Self::NotFound { kind, id }
    }

    pub(crate) fn integrity(kind: EntityKind, id: EntityId, reason: impl Into<String>) -> Self {
        Self::IntegrityViolation {
            kind,
            id,
            reason: reason.into(),
        }
    }
}

impl Display for ScheduleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(errors) => {
                let details = errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                write!(f, "validation failed: {details}")
            }
            Self::NotFound { kind, id } => write!(f, "{kind} not found: {id}"),
            Self::Conflict(conflict) => write!(f, "schedule conflict: {conflict}"),
            Self::Unauthorized {
                actor_id,
                capability,
            } => write!(f, "actor `{actor_id}` lacks capability `{capability}`"),
            Self::IntegrityViolation { kind, id, reason } => {
                write!(f, "integrity violation on {kind} {id}: {reason}")
            }
            Self::InvalidState { kind, id, expected } => write!(
                f,
                "{kind} {id} is not in state `{}`",
                expected.as_str()
            ),
            Self::ServiceBusy { attempts } => {
                write!(f, "store busy after {attempts} attempt(s)")
            }
            Self::Timeout { elapsed_ms } => write!(f, "deadline exceeded after {elapsed_ms}ms"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ScheduleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ScheduleError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { kind, id } => Self::NotFound { kind, id },
            other => Self::Repo(other),
        }
    }
}

impl From<SlotShapeError> for ScheduleError {
    fn from(value: SlotShapeError) -> Self {
        Self::Repo(RepoError::InvalidData(value.to_string()))
    }
}

impl From<Vec<FieldError>> for ScheduleError {
    fn from(value: Vec<FieldError>) -> Self {
        Self::Validation(value)
    }
}

#[cfg(test)]
mod tests {
    use super::ScheduleError;
    use crate::model::validation::FieldError;
    use crate::model::EntityKind;
    use crate::repo::document_store::RepoError;
    use uuid::Uuid;

    #[test]
    fn repo_not_found_maps_to_not_found() {
        let id = Uuid::new_v4();
        let err = ScheduleError::from(RepoError::NotFound {
            kind: EntityKind::Batch,
            id,
        });
        assert!(matches!(
            err,
            ScheduleError::NotFound { kind: EntityKind::Batch, id: found } if found == id
        ));
        assert_eq!(err.code(), "not_found");
        assert!(!err.is_retryable());
    }

    #[test]
    fn busy_and_timeout_are_retryable() {
        assert!(ScheduleError::ServiceBusy { attempts: 3 }.is_retryable());
        assert!(ScheduleError::Timeout { elapsed_ms: 5 }.is_retryable());
        assert!(!ScheduleError::from(vec![FieldError::new("day", "bad")]).is_retryable());
    }

    #[test]
    fn validation_message_lists_every_field() {
        let err = ScheduleError::Validation(vec![
            FieldError::new("startTime", "bad"),
            FieldError::new("endTime", "bad"),
        ]);
        let message = err.to_string();
        assert!(message.contains("startTime"));
        assert!(message.contains("endTime"));
    }
}
