//! # Batch Processing
//!
//! Applies a processor to every item of an ordered collection. Items are split into
//! contiguous chunks of at most `batch_size`; chunks run one after another and the
//! items inside a chunk run concurrently under admission control. Output order always
//! equals input order.
//!
//! A single failing item fails the whole call, the same all-or-nothing contract as
//! [`crate::orchestrator::TaskOrchestrator`]. Callers that want per-item error handling
//! wrap it into their processor.

use crate::admission::AdmissionController;
use crate::config::ConcurrencyConfig;
use crate::error::{ConcurrencyError, Result};
use crate::runner::{run_all_or_nothing, DeferredWork, ExecutionMode, Unit};
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct BatchProcessor {
    admission: AdmissionController,
    mode: ExecutionMode,
    default_batch_size: usize,
}

impl BatchProcessor {
    pub fn new(
        admission: AdmissionController,
        mode: ExecutionMode,
        default_batch_size: usize,
    ) -> Self {
        Self {
            admission,
            mode,
            default_batch_size: default_batch_size.max(1),
        }
    }

    pub fn from_config(config: &ConcurrencyConfig, admission: AdmissionController) -> Self {
        Self::new(
            admission,
            ExecutionMode::from_config(config),
            config.default_batch_size,
        )
    }

    pub fn default_batch_size(&self) -> usize {
        self.default_batch_size
    }

    /// Process `items` in chunks of `batch_size`, preserving input order.
    pub async fn run_batch<I, V, P, Fut>(
        &self,
        items: Vec<I>,
        processor: P,
        batch_size: usize,
    ) -> Result<Vec<V>>
    where
        I: Send + 'static,
        V: Send + 'static,
        P: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        if batch_size == 0 {
            return Err(ConcurrencyError::InvalidBatchSize(batch_size));
        }
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let total = items.len();
        let batches = total.div_ceil(batch_size);
        let span = info_span!(
            "run_batch",
            call_id = %Uuid::new_v4(),
            items = total,
            batch_size,
            batches,
            mode = ?self.mode
        );

        async move {
            let started = Instant::now();
            let processor = Arc::new(processor);
            let mut results = Vec::with_capacity(total);
            let mut remaining = items.into_iter().enumerate().peekable();
            let mut batch_number = 0;

            while remaining.peek().is_some() {
                batch_number += 1;
                let units: Vec<Unit<V>> = remaining
                    .by_ref()
                    .take(batch_size)
                    .map(|(index, item)| {
                        let processor = Arc::clone(&processor);
                        let work: DeferredWork<V> = Box::new(move || (*processor)(item).boxed());
                        Unit::new(format!("item[{index}]"), work)
                    })
                    .collect();

                debug!(batch = batch_number, size = units.len(), "Processing batch");
                let values = run_all_or_nothing(&self.admission, self.mode, units).await?;
                results.extend(values);
            }

            info!(
                duration_ms = started.elapsed().as_millis() as u64,
                "Batch processing completed"
            );
            Ok(results)
        }
        .instrument(span)
        .await
    }

    /// [`Self::run_batch`] with the configured default batch size.
    pub async fn process_collection<I, V, P, Fut>(
        &self,
        items: Vec<I>,
        processor: P,
    ) -> Result<Vec<V>>
    where
        I: Send + 'static,
        V: Send + 'static,
        P: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        self.run_batch(items, processor, self.default_batch_size).await
    }
}
