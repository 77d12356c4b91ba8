//! # Concurrency Service
//!
//! Single entry point for request handlers and background jobs. Owns one
//! [`AdmissionController`] shared by the orchestrator, batch processor and HTTP
//! fan-out client, so the concurrency limit applies across all three.
//!
//! ```rust
//! use std::collections::HashMap;
//! use tasker_concurrency::config::ConcurrencyConfig;
//! use tasker_concurrency::orchestrator::Operation;
//! use tasker_concurrency::service::ConcurrencyService;
//!
//! # tokio_test::block_on(async {
//! let service = ConcurrencyService::new(ConcurrencyConfig::default()).unwrap();
//! service.set_concurrency_limit(2).unwrap();
//!
//! let operations: HashMap<_, _> = (0..5)
//!     .map(|i| {
//!         let operation = Operation::new(move || async move { Ok(format!("result{i}")) });
//!         (format!("op{i}"), operation)
//!     })
//!     .collect();
//!
//! let results = service.run_concurrently(operations).await.unwrap();
//! assert_eq!(results["op4"], "result4");
//! # });
//! ```

use crate::admission::{AdmissionController, AdmissionStats};
use crate::batch::BatchProcessor;
use crate::config::{ConcurrencyConfig, ConfigManager, ConfigResult};
use crate::error::Result;
use crate::http::{FanoutRequestSpec, HttpFanoutClient, HttpTransport, Outcome};
use crate::orchestrator::{Operation, TaskOrchestrator};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::runner::ExecutionMode;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ConcurrencyService {
    config: ConcurrencyConfig,
    admission: AdmissionController,
    orchestrator: TaskOrchestrator,
    batch: BatchProcessor,
    http: HttpFanoutClient,
}

impl ConcurrencyService {
    /// Build the service from a configuration, using the `reqwest` transport
    pub fn new(config: ConcurrencyConfig) -> ConfigResult<Self> {
        config.validate()?;
        let admission = AdmissionController::from_config(&config)?;
        let http = HttpFanoutClient::from_config(&config, admission.clone());
        Ok(Self::assemble(config, admission, http))
    }

    /// Build the service with a custom HTTP transport
    pub fn with_transport(
        config: ConcurrencyConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> ConfigResult<Self> {
        config.validate()?;
        let admission = AdmissionController::from_config(&config)?;
        let mode = ExecutionMode::from_config(&config);
        let http = HttpFanoutClient::new(admission.clone(), mode, transport);
        Ok(Self::assemble(config, admission, http))
    }

    /// Initialize logging, load configuration from files and environment, then build
    /// the service
    pub fn from_environment() -> ConfigResult<Self> {
        crate::logging::init_structured_logging();
        let manager = ConfigManager::load()?;
        Self::new(manager.config().clone())
    }

    fn assemble(
        config: ConcurrencyConfig,
        admission: AdmissionController,
        http: HttpFanoutClient,
    ) -> Self {
        let orchestrator = TaskOrchestrator::from_config(&config, admission.clone());
        let batch = BatchProcessor::from_config(&config, admission.clone());

        info!(
            concurrency_limit = config.concurrency_limit,
            sequential = config.disable_concurrency_in_testing,
            "Concurrency service initialized"
        );

        Self {
            config,
            admission,
            orchestrator,
            batch,
            http,
        }
    }

    pub fn config(&self) -> &ConcurrencyConfig {
        &self.config
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn stats(&self) -> AdmissionStats {
        self.admission.stats()
    }

    pub fn set_concurrency_limit(&self, limit: usize) -> ConfigResult<()> {
        self.admission.set_limit(limit)
    }

    pub fn concurrency_limit(&self) -> usize {
        self.admission.limit()
    }

    pub async fn run_concurrently<T>(
        &self,
        operations: HashMap<String, Operation<T>>,
    ) -> Result<HashMap<String, T>>
    where
        T: Send + 'static,
    {
        self.orchestrator.run_concurrently(operations).await
    }

    /// [`Self::run_concurrently`] bounded by the configured `timeout_seconds`
    pub async fn run_concurrently_with_default_timeout<T>(
        &self,
        operations: HashMap<String, Operation<T>>,
    ) -> Result<HashMap<String, T>>
    where
        T: Send + 'static,
    {
        self.orchestrator
            .run_concurrently_with_timeout(operations, self.config.timeout())
            .await
    }

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
        self.batch.run_batch(items, processor, batch_size).await
    }

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
        self.batch.process_collection(items, processor).await
    }

    pub async fn run_concurrent_http_requests(
        &self,
        requests: HashMap<String, FanoutRequestSpec>,
    ) -> HashMap<String, Outcome> {
        self.http.run_concurrent_http_requests(requests).await
    }

    /// Retry `work` under the configured default policy while holding a single
    /// admission ticket for the whole sequence.
    pub async fn run_with_retry<T, F, Fut>(&self, work: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.run_with_retry_policy(work, &RetryPolicy::from_config(&self.config))
            .await
    }

    pub async fn run_with_retry_policy<T, F, Fut>(
        &self,
        work: F,
        policy: &RetryPolicy,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let _ticket = self.admission.acquire().await;
        run_with_retry(work, policy).await
    }
}
