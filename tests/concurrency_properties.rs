//! Behavioral properties of the service, checked in both execution modes.

mod common;

use async_trait::async_trait;
use common::{service, service_with, ConcurrencyGauge, MODES};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tasker_concurrency::http::HttpResponse;
use tasker_concurrency::{
    AdmissionController, ConcurrencyConfig, ConcurrencyError, ConcurrencyService,
    FanoutRequestSpec, HttpTransport, Operation, Outcome, RetryPolicy,
};

fn pure_operations(count: usize) -> HashMap<String, Operation<String>> {
    (0..count)
        .map(|i| {
            (
                format!("op{i}"),
                Operation::new(move || async move { Ok(format!("result{i}")) }),
            )
        })
        .collect()
}

#[tokio::test]
async fn results_match_sequential_evaluation() {
    for sequential in MODES {
        let service = service(sequential);
        let results = service.run_concurrently(pure_operations(8)).await.unwrap();

        assert_eq!(results.len(), 8);
        for i in 0..8 {
            assert_eq!(results[&format!("op{i}")], format!("result{i}"));
        }
    }
}

#[tokio::test]
async fn single_failure_fails_the_whole_call() {
    for sequential in MODES {
        let service = service(sequential);
        let mut operations = pure_operations(4);
        operations.insert(
            "inventory".to_string(),
            Operation::new(|| async { Err(anyhow::anyhow!("warehouse offline")) }),
        );

        let err = service.run_concurrently(operations).await.unwrap_err();

        assert!(err.to_string().contains("warehouse offline"));
        assert!(err.message().contains("warehouse offline"));
        assert_eq!(err.operation_name(), Some("inventory"));
    }
}

#[tokio::test]
async fn admission_ceiling_is_respected() {
    for sequential in MODES {
        let service = service(sequential);
        service.set_concurrency_limit(2).unwrap();
        let gauge = ConcurrencyGauge::new();

        let operations: HashMap<_, _> = (0..5)
            .map(|i| {
                (
                    format!("op{i}"),
                    gauge.operation(format!("result{i}"), Duration::from_millis(20)),
                )
            })
            .collect();

        let results = service.run_concurrently(operations).await.unwrap();

        assert!(gauge.peak() <= 2, "peak was {}", gauge.peak());
        assert_eq!(gauge.completed(), 5);
        for i in 0..5 {
            assert_eq!(results[&format!("op{i}")], format!("result{i}"));
        }
        assert_eq!(service.stats().in_flight, 0);
        assert!(service.stats().peak_in_flight <= 2);
    }
}

#[tokio::test]
async fn concurrent_mode_reaches_the_ceiling() {
    let service = service(false);
    service.set_concurrency_limit(2).unwrap();
    let gauge = ConcurrencyGauge::new();

    let operations: HashMap<_, _> = (0..5)
        .map(|i| (format!("op{i}"), gauge.operation(i, Duration::from_millis(30))))
        .collect();

    service.run_concurrently(operations).await.unwrap();
    assert_eq!(gauge.peak(), 2);
}

#[tokio::test]
async fn retry_converges_on_third_attempt() {
    for sequential in MODES {
        let service = service(sequential);
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::fixed(3, Duration::from_millis(1));

        let counter = Arc::clone(&calls);
        let value = service
            .run_with_retry_policy(
                move || {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    async move {
                        if attempt < 3 {
                            Err(anyhow::anyhow!("attempt {attempt} failed"))
                        } else {
                            Ok("synced")
                        }
                    }
                },
                &policy,
            )
            .await
            .unwrap();

        assert_eq!(value, "synced");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}

#[tokio::test]
async fn retry_exhaustion_stops_at_max_attempts() {
    for sequential in MODES {
        let service = service(sequential);
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::fixed(2, Duration::from_millis(1));

        let counter = Arc::clone(&calls);
        let err = service
            .run_with_retry_policy(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(anyhow::anyhow!("upstream unavailable")) }
                },
                &policy,
            )
            .await
            .unwrap_err();

        assert!(err.is_retries_exhausted());
        assert!(matches!(err, ConcurrencyError::RetriesExhausted { attempts: 2, .. }));
        assert!(err.message().contains("upstream unavailable"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

#[tokio::test]
async fn retrying_operation_inside_orchestrator() {
    for sequential in MODES {
        let service = service(sequential);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let flaky = Operation::with_retry(RetryPolicy::fixed(3, Duration::from_millis(1)), move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt == 1 {
                    Err(anyhow::anyhow!("cold cache"))
                } else {
                    Ok(attempt)
                }
            }
        });

        let mut operations = HashMap::new();
        operations.insert("flaky".to_string(), flaky);
        operations.insert("steady".to_string(), Operation::new(|| async { Ok(0) }));

        let results = service.run_concurrently(operations).await.unwrap();
        assert_eq!(results["flaky"], 2);
        assert_eq!(results["steady"], 0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

#[tokio::test]
async fn batch_preserves_input_order() {
    for sequential in MODES {
        let service = service(sequential);
        let items: Vec<u64> = (1..=10).collect();

        let results = service
            .run_batch(
                items,
                |x| async move {
                    // Later items finish first within each chunk
                    tokio::time::sleep(Duration::from_millis(20 - x)).await;
                    Ok(format!("processed-{x}"))
                },
                3,
            )
            .await
            .unwrap();

        let expected: Vec<String> = (1..=10).map(|x| format!("processed-{x}")).collect();
        assert_eq!(results, expected);
    }
}

#[tokio::test]
async fn batch_failure_fails_the_whole_call() {
    for sequential in MODES {
        let service = service(sequential);
        let err = service
            .run_batch(
                (1..=6).collect::<Vec<u32>>(),
                |x| async move {
                    if x == 5 {
                        Err(anyhow::anyhow!("item {x} rejected"))
                    } else {
                        Ok(x)
                    }
                },
                2,
            )
            .await
            .unwrap_err();

        assert!(err.message().contains("item 5 rejected"));
    }
}

#[tokio::test]
async fn process_collection_uses_default_batch_size() {
    let service = service_with(ConcurrencyConfig {
        default_batch_size: 4,
        ..ConcurrencyConfig::default()
    });

    let results = service
        .process_collection((0..9).collect::<Vec<u32>>(), |x| async move { Ok(x * 2) })
        .await
        .unwrap();

    assert_eq!(results, (0..9).map(|x| x * 2).collect::<Vec<_>>());
}

/// Simulated upstream: the `/down` path fails like a dropped connection
struct SimulatedUpstream;

#[async_trait]
impl HttpTransport for SimulatedUpstream {
    async fn send(&self, request: &FanoutRequestSpec) -> anyhow::Result<HttpResponse> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if request.url.ends_with("/down") {
            anyhow::bail!("connection reset by peer");
        }
        Ok(HttpResponse {
            status: 200,
            body: format!("{} ok", request.url),
        })
    }
}

#[tokio::test]
async fn fanout_isolates_failing_requests() {
    for sequential in MODES {
        let config = ConcurrencyConfig {
            disable_concurrency_in_testing: sequential,
            ..ConcurrencyConfig::default()
        };
        let service =
            ConcurrencyService::with_transport(config, Arc::new(SimulatedUpstream)).unwrap();

        let requests = HashMap::from([
            ("users".to_string(), FanoutRequestSpec::get("http://svc/users")),
            ("orders".to_string(), FanoutRequestSpec::get("http://svc/orders")),
            ("billing".to_string(), FanoutRequestSpec::get("http://svc/down")),
        ]);

        let outcomes = service.run_concurrent_http_requests(requests).await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            outcomes["users"],
            Outcome::Response {
                status: 200,
                body: "http://svc/users ok".to_string()
            }
        );
        assert_eq!(outcomes["orders"].body(), Some("http://svc/orders ok"));
        assert!(outcomes["billing"]
            .error()
            .is_some_and(|e| e.contains("connection reset by peer")));
        assert_eq!(service.stats().in_flight, 0);
    }
}

#[tokio::test]
async fn lowering_the_limit_takes_effect_once_work_drains() {
    let admission = AdmissionController::new(4).unwrap();
    let mut held: Vec<_> = (0..4).map(|_| admission.try_acquire().unwrap()).collect();

    admission.set_limit(1).unwrap();
    assert_eq!(admission.stats().in_flight, 4);
    assert!(admission.try_acquire().is_none());

    held.truncate(1);
    assert_eq!(admission.stats().in_flight, 1);
    assert!(admission.try_acquire().is_none());

    held.clear();
    let ticket = admission.try_acquire();
    assert!(ticket.is_some());
    assert!(admission.try_acquire().is_none());
}

#[tokio::test]
async fn panicking_operation_releases_capacity() {
    for sequential in MODES {
        let service = service(sequential);
        service.set_concurrency_limit(1).unwrap();

        let mut operations = HashMap::new();
        operations.insert(
            "explodes".to_string(),
            Operation::new(|| async {
                let explode = true;
                if explode {
                    panic!("index out of range");
                }
                Ok::<u32, anyhow::Error>(0)
            }),
        );

        let err = service.run_concurrently(operations).await.unwrap_err();
        assert!(err.message().contains("index out of range"));
        assert_eq!(service.stats().in_flight, 0);

        let results = service.run_concurrently(pure_operations(2)).await.unwrap();
        assert_eq!(results.len(), 2);
    }
}

#[tokio::test]
async fn aborted_siblings_release_capacity() {
    let service = service(false);
    service.set_concurrency_limit(3).unwrap();

    let mut operations: HashMap<String, Operation<u32>> = HashMap::new();
    for i in 0..2 {
        operations.insert(
            format!("slow{i}"),
            Operation::new(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(0)
            }),
        );
    }
    operations.insert(
        "failing".to_string(),
        Operation::new(|| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err(anyhow::anyhow!("quota exceeded"))
        }),
    );

    let err = tokio::time::timeout(Duration::from_secs(5), service.run_concurrently(operations))
        .await
        .expect("fail-fast should not wait for slow siblings")
        .unwrap_err();
    assert!(err.message().contains("quota exceeded"));

    // Aborted tasks drop their tickets on the runtime's next poll
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(service.stats().in_flight, 0);
}

#[tokio::test]
async fn empty_inputs_return_empty_outputs() {
    for sequential in MODES {
        let service = service(sequential);

        let results = service
            .run_concurrently(HashMap::<String, Operation<u32>>::new())
            .await
            .unwrap();
        assert!(results.is_empty());

        let batch = service
            .run_batch(Vec::<u32>::new(), |x| async move { Ok(x) }, 3)
            .await
            .unwrap();
        assert!(batch.is_empty());

        let outcomes = service.run_concurrent_http_requests(HashMap::new()).await;
        assert!(outcomes.is_empty());

        assert_eq!(service.stats().total_admitted, 0);
    }
}

#[tokio::test]
async fn zero_batch_size_is_rejected() {
    let err = service(false)
        .run_batch(vec![1, 2, 3], |x| async move { Ok(x) }, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, ConcurrencyError::InvalidBatchSize(0)));
}
