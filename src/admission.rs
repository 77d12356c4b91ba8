//! # Admission Control
//!
//! Process-wide ceiling on the number of units of work executing at once. Every
//! concurrent component acquires an [`AdmissionTicket`] before starting a unit and
//! holds it until the unit finishes. Dropping the ticket releases the slot, so capacity
//! comes back on success, failure, panic and task abort alike.
//!
//! The limit can be changed at runtime. Work admitted under an old limit is never
//! evicted; a lowered limit only stops new admissions until enough tickets drain.
//!
//! ```rust
//! use tasker_concurrency::admission::AdmissionController;
//!
//! # tokio_test::block_on(async {
//! let admission = AdmissionController::new(2).unwrap();
//!
//! let ticket = admission.acquire().await;
//! assert_eq!(admission.stats().in_flight, 1);
//!
//! admission.release(ticket);
//! assert_eq!(admission.stats().in_flight, 0);
//! # });
//! ```

use crate::config::{ConcurrencyConfig, ConfigResult, ConfigurationError};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, info, trace};

#[derive(Debug)]
struct AdmissionState {
    limit: usize,
    in_flight: usize,
    peak_in_flight: usize,
    total_admitted: u64,
}

#[derive(Debug)]
struct AdmissionInner {
    state: Mutex<AdmissionState>,
    capacity_freed: Notify,
}

impl AdmissionInner {
    fn try_admit(&self) -> bool {
        let mut state = self.state.lock();
        if state.in_flight >= state.limit {
            return false;
        }
        state.in_flight += 1;
        state.total_admitted += 1;
        state.peak_in_flight = state.peak_in_flight.max(state.in_flight);
        true
    }

    fn release_slot(&self) {
        let has_room = {
            let mut state = self.state.lock();
            debug_assert!(
                state.in_flight > 0,
                "admission ticket released more times than it was admitted"
            );
            state.in_flight = state.in_flight.saturating_sub(1);
            state.in_flight < state.limit
        };

        if has_room {
            self.capacity_freed.notify_one();
        }
    }
}

/// Snapshot of admission capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdmissionStats {
    pub limit: usize,
    pub in_flight: usize,
    pub available: usize,
    pub peak_in_flight: usize,
    pub total_admitted: u64,
}

/// Shared concurrency ceiling. Clones share the same state.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    inner: Arc<AdmissionInner>,
}

impl AdmissionController {
    /// Create a controller admitting at most `limit` concurrent units
    pub fn new(limit: usize) -> ConfigResult<Self> {
        validate_limit(limit)?;
        Ok(Self {
            inner: Arc::new(AdmissionInner {
                state: Mutex::new(AdmissionState {
                    limit,
                    in_flight: 0,
                    peak_in_flight: 0,
                    total_admitted: 0,
                }),
                capacity_freed: Notify::new(),
            }),
        })
    }

    pub fn from_config(config: &ConcurrencyConfig) -> ConfigResult<Self> {
        Self::new(config.concurrency_limit)
    }

    /// Wait until a slot is free and take it.
    pub async fn acquire(&self) -> AdmissionTicket {
        let wait_start = Instant::now();
        loop {
            // Register interest before checking so a release in between is not lost
            let notified = self.inner.capacity_freed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(ticket) = self.try_acquire() {
                let waited = wait_start.elapsed();
                if waited > Duration::from_millis(1) {
                    debug!(
                        waited_ms = waited.as_millis() as u64,
                        "Admission granted after waiting for capacity"
                    );
                }
                return ticket;
            }

            trace!(limit = self.limit(), "Waiting for admission capacity");
            notified.await;
        }
    }

    /// Take a slot if one is free right now
    pub fn try_acquire(&self) -> Option<AdmissionTicket> {
        if self.inner.try_admit() {
            Some(AdmissionTicket {
                inner: Arc::clone(&self.inner),
                admitted_at: Instant::now(),
            })
        } else {
            None
        }
    }

    /// Give a slot back. Equivalent to dropping the ticket.
    pub fn release(&self, ticket: AdmissionTicket) {
        debug_assert!(
            Arc::ptr_eq(&self.inner, &ticket.inner),
            "admission ticket released to a controller that did not issue it"
        );
        drop(ticket);
    }

    /// Change the ceiling. Raising it wakes every waiter; lowering it never evicts
    /// admitted work.
    pub fn set_limit(&self, limit: usize) -> ConfigResult<()> {
        validate_limit(limit)?;

        let previous = {
            let mut state = self.inner.state.lock();
            std::mem::replace(&mut state.limit, limit)
        };

        if limit > previous {
            self.inner.capacity_freed.notify_waiters();
        }

        info!(
            previous_limit = previous,
            new_limit = limit,
            "Concurrency limit updated"
        );
        Ok(())
    }

    pub fn limit(&self) -> usize {
        self.inner.state.lock().limit
    }

    pub fn stats(&self) -> AdmissionStats {
        let state = self.inner.state.lock();
        AdmissionStats {
            limit: state.limit,
            in_flight: state.in_flight,
            available: state.limit.saturating_sub(state.in_flight),
            peak_in_flight: state.peak_in_flight,
            total_admitted: state.total_admitted,
        }
    }
}

fn validate_limit(limit: usize) -> ConfigResult<()> {
    if limit == 0 {
        return Err(ConfigurationError::invalid_value(
            "concurrency_limit",
            "0",
            "concurrency limit must be a positive integer",
        ));
    }
    Ok(())
}

/// One unit of in-flight capacity. Released on drop.
#[must_use = "dropping the ticket immediately releases the admission slot"]
#[derive(Debug)]
pub struct AdmissionTicket {
    inner: Arc<AdmissionInner>,
    admitted_at: Instant,
}

impl AdmissionTicket {
    /// How long this ticket has been held
    pub fn held_for(&self) -> Duration {
        self.admitted_at.elapsed()
    }
}

impl Drop for AdmissionTicket {
    fn drop(&mut self) {
        self.inner.release_slot();
    }
}
