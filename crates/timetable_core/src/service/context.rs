//! Per-request context and the retrying transaction runner.
//!
//! # Invariants
//! - The deadline is checked before every attempt, before every backoff
//!   sleep and right before commit. An expired deadline never commits.
//! - Only transient store failures are retried; every other error is
//!   returned from the first attempt unchanged.

use crate::access::capability::{AccessContext, Capability};
use crate::config::SchedulerConfig;
use crate::repo::document_store::DocumentStore;
use crate::service::error::{ScheduleError, ScheduleResult};
use log::{info, warn};
use std::time::{Duration, Instant};

/// Point in time after which a request must not commit.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started_at: Instant,
    expires_at: Option<Instant>,
}

impl Deadline {
    /// Deadline that never expires.
    pub fn unbounded() -> Self {
        Self {
            started_at: Instant::now(),
            expires_at: None,
        }
    }

    pub fn after(limit: Duration) -> Self {
        let started_at = Instant::now();
        Self {
            started_at,
            expires_at: started_at.checked_add(limit),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Time left, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.remaining(), Some(left) if left.is_zero())
    }

    /// Fails with `Timeout` once expired.
    pub fn check(&self) -> ScheduleResult<()> {
        if self.is_expired() {
            return Err(self.timeout());
        }
        Ok(())
    }

    fn timeout(&self) -> ScheduleError {
        ScheduleError::Timeout {
            elapsed_ms: self.elapsed().as_millis(),
        }
    }

    /// `wait`, shortened to the time left.
    pub fn cap(&self, wait: Duration) -> Duration {
        match self.remaining() {
            Some(left) => left.min(wait),
            None => wait,
        }
    }

    fn allows_wait(&self, wait: Duration) -> bool {
        match self.remaining() {
            Some(left) => left > wait,
            None => true,
        }
    }
}

/// Who is calling and how long they are willing to wait.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub access: AccessContext,
    pub deadline: Deadline,
}

impl RequestContext {
    pub fn new(access: AccessContext, deadline: Deadline) -> Self {
        Self { access, deadline }
    }

    /// Uses `config.default_deadline_ms`, or no deadline when unset.
    pub fn with_default_deadline(access: AccessContext, config: &SchedulerConfig) -> Self {
        let deadline = config
            .default_deadline()
            .map(Deadline::after)
            .unwrap_or_else(Deadline::unbounded);
        Self::new(access, deadline)
    }

    pub fn actor_id(&self) -> &str {
        &self.access.actor_id
    }

    pub fn authorize(&self, capability: Capability) -> ScheduleResult<()> {
        if self.access.allows(capability) {
            return Ok(());
        }
        warn!(
            "event=authorize module=service status=denied actor_id={} capability={}",
            self.access.actor_id, capability
        );
        Err(ScheduleError::Unauthorized {
            actor_id: self.access.actor_id.clone(),
            capability,
        })
    }
}

/// Runs `work` in one store transaction, retrying on lock contention.
///
/// `work` may run several times; each run starts from a rolled-back state.
/// No attempt waits on the write lock past the deadline.
pub(crate) fn transact<S, T, F>(
    store: &S,
    config: &SchedulerConfig,
    deadline: &Deadline,
    operation: &'static str,
    work: F,
) -> ScheduleResult<T>
where
    S: DocumentStore,
    F: FnMut(&S) -> ScheduleResult<T>,
{
    let outcome = run_attempts(store, config, deadline, operation, work);
    if let Err(err) = store.set_lock_wait(config.lock_wait()) {
        warn!(
            "event=transaction module=service status=error op={operation} error_code=lock_wait_reset error={err}"
        );
    }
    outcome
}

fn run_attempts<S, T, F>(
    store: &S,
    config: &SchedulerConfig,
    deadline: &Deadline,
    operation: &'static str,
    mut work: F,
) -> ScheduleResult<T>
where
    S: DocumentStore,
    F: FnMut(&S) -> ScheduleResult<T>,
{
    let started_at = Instant::now();
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        deadline.check()?;
        store.set_lock_wait(deadline.cap(config.lock_wait()))?;

        let outcome: ScheduleResult<T> = store.with_transaction(|tx| {
            let output = work(tx)?;
            deadline.check()?;
            Ok(output)
        });

        match outcome {
            Ok(output) => {
                info!(
                    "event=transaction module=service status=ok op={operation} attempts={attempt} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                return Ok(output);
            }
            Err(err) if err.is_transient() => {
                if attempt >= config.max_attempts {
                    warn!(
                        "event=transaction module=service status=error op={operation} attempts={attempt} error_code=service_busy error={err}"
                    );
                    return Err(ScheduleError::ServiceBusy { attempts: attempt });
                }
                let backoff = config.backoff_for(attempt);
                if !deadline.allows_wait(backoff) {
                    warn!(
                        "event=transaction module=service status=error op={operation} attempts={attempt} error_code=timeout"
                    );
                    return Err(deadline.timeout());
                }
                warn!(
                    "event=transaction module=service status=retry op={operation} attempt={attempt} backoff_ms={} error={err}",
                    backoff.as_millis()
                );
                std::thread::sleep(backoff);
            }
            Err(err) => {
                info!(
                    "event=transaction module=service status=rejected op={operation} attempts={attempt} error_code={}",
                    err.code()
                );
                return Err(err);
            }
        }
    }
}
