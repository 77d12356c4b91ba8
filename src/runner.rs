//! Admitted execution of a list of units of work.
//!
//! Shared by the orchestrator, the batch processor and HTTP fan-out. Every unit takes
//! an admission ticket before it starts and holds it until it finishes. Results always
//! come back in unit order, whatever order the units completed in.

use crate::admission::AdmissionController;
use crate::config::ConcurrencyConfig;
use crate::error::{ConcurrencyError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinSet;
use tracing::debug;

/// How a multi-unit call schedules its units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Units run as separate tokio tasks, bounded by admission control
    #[default]
    Concurrent,
    /// Units run one at a time in a deterministic order
    Sequential,
}

impl ExecutionMode {
    pub fn from_config(config: &ConcurrencyConfig) -> Self {
        if config.disable_concurrency_in_testing {
            ExecutionMode::Sequential
        } else {
            ExecutionMode::Concurrent
        }
    }

    pub fn is_sequential(self) -> bool {
        self == ExecutionMode::Sequential
    }
}

/// Work that has not started yet. Invoked only once an admission ticket is held.
pub(crate) type DeferredWork<T> =
    Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<T>> + Send>;

/// A labelled unit of work ready to be driven
pub(crate) struct Unit<T> {
    pub label: String,
    pub work: DeferredWork<T>,
}

impl<T> Unit<T> {
    pub fn new(label: impl Into<String>, work: DeferredWork<T>) -> Self {
        Self {
            label: label.into(),
            work,
        }
    }
}

/// Run every unit; the first failure aborts the call and the remaining tasks.
pub(crate) async fn run_all_or_nothing<T>(
    admission: &AdmissionController,
    mode: ExecutionMode,
    units: Vec<Unit<T>>,
) -> Result<Vec<T>>
where
    T: Send + 'static,
{
    if units.is_empty() {
        return Ok(Vec::new());
    }

    if mode.is_sequential() {
        let mut values = Vec::with_capacity(units.len());
        for unit in units {
            let _ticket = admission.acquire().await;
            match guarded(unit.work).await {
                Ok(value) => values.push(value),
                Err(err) => return Err(ConcurrencyError::operation_failed(unit.label, &err)),
            }
        }
        return Ok(values);
    }

    let total = units.len();
    let mut labels = Vec::with_capacity(total);
    let mut tasks = JoinSet::new();
    for (index, unit) in units.into_iter().enumerate() {
        labels.push(unit.label);
        let admission = admission.clone();
        let work = unit.work;
        tasks.spawn(async move {
            let _ticket = admission.acquire().await;
            (index, guarded(work).await)
        });
    }

    let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(total).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, Ok(value))) => slots[index] = Some(value),
            Ok((index, Err(err))) => {
                tasks.abort_all();
                debug!(
                    failed = %labels[index],
                    aborted = tasks.len(),
                    "Unit failed, aborting remaining units"
                );
                return Err(ConcurrencyError::operation_failed(
                    labels[index].clone(),
                    &err,
                ));
            }
            Err(join_error) => {
                tasks.abort_all();
                return Err(ConcurrencyError::OperationFailed {
                    name: "<task>".to_string(),
                    message: join_error.to_string(),
                });
            }
        }
    }

    let values: Vec<T> = slots.into_iter().flatten().collect();
    debug_assert_eq!(values.len(), total, "every unit must produce a value");
    Ok(values)
}

/// Run every unit to completion and keep each outcome, success or failure.
pub(crate) async fn run_isolated<T>(
    admission: &AdmissionController,
    mode: ExecutionMode,
    units: Vec<Unit<T>>,
) -> Vec<anyhow::Result<T>>
where
    T: Send + 'static,
{
    if mode.is_sequential() {
        let mut outcomes = Vec::with_capacity(units.len());
        for unit in units {
            let _ticket = admission.acquire().await;
            outcomes.push(guarded(unit.work).await);
        }
        return outcomes;
    }

    let total = units.len();
    let mut tasks = JoinSet::new();
    for (index, unit) in units.into_iter().enumerate() {
        let admission = admission.clone();
        let work = unit.work;
        tasks.spawn(async move {
            let _ticket = admission.acquire().await;
            (index, guarded(work).await)
        });
    }

    let mut slots: Vec<Option<anyhow::Result<T>>> =
        std::iter::repeat_with(|| None).take(total).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => slots[index] = Some(outcome),
            // Panics are caught inside the task, so only cancellation lands here
            Err(join_error) => debug!(error = %join_error, "Isolated unit did not complete"),
        }
    }

    slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| Err(anyhow::anyhow!("unit was cancelled"))))
        .collect()
}

/// Start and await a unit, turning a panic into an ordinary error. Callers hold an
/// admission ticket for the whole call.
async fn guarded<T>(work: DeferredWork<T>) -> anyhow::Result<T> {
    AssertUnwindSafe(async move { work().await })
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(panic_error(payload)))
}

fn panic_error(payload: Box<dyn Any + Send>) -> anyhow::Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    anyhow::anyhow!("panicked: {message}")
}
