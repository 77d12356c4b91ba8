//! # HTTP Fan-out
//!
//! Issues many independent requests concurrently under admission control. Unlike the
//! orchestrator and batch processor, failures are isolated: a transport error, a
//! timeout or a non-2xx status for one key is recorded as that key's
//! [`Outcome::Error`] and never aborts sibling requests or the call. No retries happen
//! at this layer.

use super::request::{FanoutRequestSpec, HttpResponse, Outcome};
use super::transport::{HttpTransport, ReqwestTransport};
use crate::admission::AdmissionController;
use crate::config::ConcurrencyConfig;
use crate::runner::{run_isolated, DeferredWork, ExecutionMode, Unit};
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct HttpFanoutClient {
    admission: AdmissionController,
    mode: ExecutionMode,
    transport: Arc<dyn HttpTransport>,
}

impl std::fmt::Debug for HttpFanoutClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFanoutClient")
            .field("mode", &self.mode)
            .field("limit", &self.admission.limit())
            .finish()
    }
}

impl HttpFanoutClient {
    pub fn new(
        admission: AdmissionController,
        mode: ExecutionMode,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            admission,
            mode,
            transport,
        }
    }

    /// Client using [`ReqwestTransport`] with the configured timeout
    pub fn from_config(config: &ConcurrencyConfig, admission: AdmissionController) -> Self {
        Self::new(
            admission,
            ExecutionMode::from_config(config),
            Arc::new(ReqwestTransport::new(config.timeout())),
        )
    }

    /// Send every request and return exactly one outcome per key.
    pub async fn run_concurrent_http_requests(
        &self,
        requests: HashMap<String, FanoutRequestSpec>,
    ) -> HashMap<String, Outcome> {
        if requests.is_empty() {
            return HashMap::new();
        }

        let span = info_span!(
            "run_concurrent_http_requests",
            call_id = %Uuid::new_v4(),
            requests = requests.len(),
            mode = ?self.mode
        );

        async move {
            let started = Instant::now();

            let mut entries: Vec<(String, FanoutRequestSpec)> = requests.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            let keys: Vec<String> = entries.iter().map(|(key, _)| key.clone()).collect();
            let units = entries
                .into_iter()
                .map(|(key, spec)| {
                    let transport = Arc::clone(&self.transport);
                    let work: DeferredWork<HttpResponse> =
                        Box::new(move || async move { transport.send(&spec).await }.boxed());
                    Unit::new(key, work)
                })
                .collect();

            let outcomes = run_isolated(&self.admission, self.mode, units).await;

            let mut results = HashMap::with_capacity(keys.len());
            let mut failed = 0usize;
            for (key, outcome) in keys.into_iter().zip(outcomes) {
                let outcome = match outcome.and_then(HttpResponse::error_for_status) {
                    Ok(response) => Outcome::from(response),
                    Err(err) => {
                        failed += 1;
                        warn!(key = %key, error = %format!("{err:#}"), "Fan-out request failed");
                        Outcome::from(err)
                    }
                };
                results.insert(key, outcome);
            }

            info!(
                total = results.len(),
                failed = failed,
                duration_ms = started.elapsed().as_millis() as u64,
                "HTTP fan-out completed"
            );
            results
        }
        .instrument(span)
        .await
    }
}
