#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Tasker Concurrency
//!
//! Bounded concurrent task execution for the Tasker application layer.
//!
//! ## Overview
//!
//! Request handlers and background jobs (dashboard aggregation, bulk task processing,
//! external API aggregation) hand independent units of work to this crate and get a
//! result structure back. Every unit runs under a shared admission ceiling, so a burst
//! of callers waits for capacity instead of overloading downstream dependencies.
//!
//! ## Failure Policies
//!
//! The call shapes deliberately differ in how failure propagates:
//!
//! - **All-or-nothing**: [`orchestrator::TaskOrchestrator`] and [`batch::BatchProcessor`]
//!   fail the whole call on the first unit failure and never return partial results.
//! - **Isolated**: [`http::HttpFanoutClient`] records each request's failure as data and
//!   always returns one outcome per key.
//!
//! Retry ([`retry`]) composes with either and does not change the caller's policy.
//!
//! ## Module Organization
//!
//! - [`admission`] - Concurrency ceiling and admission tickets
//! - [`retry`] - Bounded retry with delay
//! - [`orchestrator`] - Named operation maps
//! - [`batch`] - Order-preserving batch processing
//! - [`http`] - HTTP fan-out with per-key outcomes
//! - [`service`] - Facade tying the components to one configuration
//! - [`config`] - Layered configuration loading
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Testing
//!
//! Setting `disable_concurrency_in_testing` runs every call one unit at a time with
//! identical results, which keeps tests deterministic:
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # All tests
//! ```

pub mod admission;
pub mod batch;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod orchestrator;
pub mod retry;
pub mod runner;
pub mod service;

pub use admission::{AdmissionController, AdmissionStats, AdmissionTicket};
pub use batch::BatchProcessor;
pub use config::{ConcurrencyConfig, ConfigManager, ConfigurationError};
pub use error::{ConcurrencyError, Result};
pub use http::{FanoutRequestSpec, HttpFanoutClient, HttpMethod, HttpTransport, Outcome};
pub use orchestrator::{Operation, TaskOrchestrator};
pub use retry::{run_with_retry, RetryExecutor, RetryPolicy};
pub use runner::ExecutionMode;
pub use service::ConcurrencyService;
