//! # Task Orchestrator
//!
//! Runs a named map of independent operations concurrently under admission control and
//! returns their values keyed exactly like the input.
//!
//! Failure is all-or-nothing: the first operation to fail fails the call, its original
//! message is carried in [`ConcurrencyError::OperationFailed`], and the remaining
//! operations are aborted. A partial result map is never returned.
//!
//! ```rust
//! use std::collections::HashMap;
//! use tasker_concurrency::admission::AdmissionController;
//! use tasker_concurrency::orchestrator::{Operation, TaskOrchestrator};
//! use tasker_concurrency::runner::ExecutionMode;
//!
//! # tokio_test::block_on(async {
//! let orchestrator = TaskOrchestrator::new(
//!     AdmissionController::new(4).unwrap(),
//!     ExecutionMode::Concurrent,
//! );
//!
//! let mut operations = HashMap::new();
//! operations.insert("open_tasks".to_string(), Operation::new(|| async { Ok(12) }));
//! operations.insert("overdue_tasks".to_string(), Operation::new(|| async { Ok(3) }));
//!
//! let results = orchestrator.run_concurrently(operations).await.unwrap();
//! assert_eq!(results["open_tasks"], 12);
//! assert_eq!(results["overdue_tasks"], 3);
//! # });
//! ```

use crate::admission::AdmissionController;
use crate::config::ConcurrencyConfig;
use crate::error::{ConcurrencyError, Result};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::runner::{run_all_or_nothing, DeferredWork, ExecutionMode, Unit};
use futures::FutureExt;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// A deferred, zero-argument unit of work. Nothing runs until the operation is
/// admitted.
pub struct Operation<T> {
    work: DeferredWork<T>,
}

impl<T: Send + 'static> Operation<T> {
    pub fn new<F, Fut>(work: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            work: Box::new(move || work().boxed()),
        }
    }

    /// An operation that reruns `work` under `policy` before giving up.
    pub fn with_retry<F, Fut>(policy: RetryPolicy, work: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::new(move || async move {
            run_with_retry(work, &policy)
                .await
                .map_err(anyhow::Error::from)
        })
    }

    pub(crate) fn into_work(self) -> DeferredWork<T> {
        self.work
    }
}

impl<T> fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation").finish_non_exhaustive()
    }
}

/// Concurrent runner for named operation maps
#[derive(Debug, Clone)]
pub struct TaskOrchestrator {
    admission: AdmissionController,
    mode: ExecutionMode,
}

impl TaskOrchestrator {
    pub fn new(admission: AdmissionController, mode: ExecutionMode) -> Self {
        Self { admission, mode }
    }

    pub fn from_config(config: &ConcurrencyConfig, admission: AdmissionController) -> Self {
        Self::new(admission, ExecutionMode::from_config(config))
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Run every operation and return all values, or the first failure.
    pub async fn run_concurrently<T>(
        &self,
        operations: HashMap<String, Operation<T>>,
    ) -> Result<HashMap<String, T>>
    where
        T: Send + 'static,
    {
        if operations.is_empty() {
            return Ok(HashMap::new());
        }

        let call_id = Uuid::new_v4();
        let count = operations.len();
        let span = info_span!("run_concurrently", %call_id, operations = count, mode = ?self.mode);

        async move {
            let started = Instant::now();

            // Sorted keys give sequential mode a stable order
            let mut entries: Vec<(String, Operation<T>)> = operations.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            let names: Vec<String> = entries.iter().map(|(name, _)| name.clone()).collect();
            let units = entries
                .into_iter()
                .map(|(name, operation)| Unit::new(name, operation.into_work()))
                .collect();

            match run_all_or_nothing(&self.admission, self.mode, units).await {
                Ok(values) => {
                    info!(
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Concurrent operations completed"
                    );
                    Ok(names.into_iter().zip(values).collect())
                }
                Err(err) => {
                    error!(
                        operation = err.operation_name().unwrap_or("unknown"),
                        error = %err,
                        "Concurrent operations failed"
                    );
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// [`Self::run_concurrently`] with an overall deadline. On timeout every still
    /// running operation is aborted.
    pub async fn run_concurrently_with_timeout<T>(
        &self,
        operations: HashMap<String, Operation<T>>,
        deadline: Duration,
    ) -> Result<HashMap<String, T>>
    where
        T: Send + 'static,
    {
        tokio::time::timeout(deadline, self.run_concurrently(operations))
            .await
            .map_err(|_| ConcurrencyError::Timeout { after: deadline })?
    }
}
