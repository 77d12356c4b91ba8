//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tasker_concurrency::{ConcurrencyConfig, ConcurrencyService, Operation};

/// Both execution modes, as values of `disable_concurrency_in_testing`
pub const MODES: [bool; 2] = [false, true];

pub fn service(sequential: bool) -> ConcurrencyService {
    service_with(ConcurrencyConfig {
        disable_concurrency_in_testing: sequential,
        ..ConcurrencyConfig::default()
    })
}

pub fn service_with(config: ConcurrencyConfig) -> ConcurrencyService {
    ConcurrencyService::new(config).expect("valid test configuration")
}

/// Counts how many instrumented operations are running at the same moment
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyGauge {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
}

impl ConcurrencyGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operation that records itself as active for `delay`, then yields `value`
    pub fn operation<T>(&self, value: T, delay: Duration) -> Operation<T>
    where
        T: Send + 'static,
    {
        let gauge = self.clone();
        Operation::new(move || async move {
            gauge.enter();
            tokio::time::sleep(delay).await;
            gauge.exit();
            Ok(value)
        })
    }

    pub fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}
