//! End-to-end tests running real worker pools against the coordinator.

use std::sync::Arc;
use std::time::Duration;

use abacus_core::config::{OperatorTimings, WorkerSettings};
use abacus_core::types::{ExpressionId, ExpressionStatus};
use abacus_engine::{Coordinator, ExpressionView};
use abacus_store::MemoryStore;
use abacus_worker::WorkerPool;

fn fast_settings(workers: usize) -> WorkerSettings {
    WorkerSettings { computing_power: workers, poll_interval: Duration::from_millis(5) }
}

/// Poll until the expression leaves `pending` or the deadline passes.
async fn wait_for_terminal(
    coordinator: &Coordinator<MemoryStore>,
    id: ExpressionId,
) -> ExpressionView {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let view = coordinator.get_expression(id).await.unwrap();
            if view.status != ExpressionStatus::Pending {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("expression did not settle in time")
}

#[tokio::test]
async fn pool_evaluates_a_nested_expression() {
    let coordinator =
        Arc::new(Coordinator::new(MemoryStore::new(), OperatorTimings::instant()));
    let pool = WorkerPool::new(coordinator.clone(), fast_settings(4));
    pool.start().await;

    let id = coordinator.submit(1, "(2+3)*(4+5)").await.unwrap();
    let view = wait_for_terminal(&coordinator, id).await;
    assert_eq!(view.status, ExpressionStatus::Completed);
    assert_eq!(view.result, Some(45.0));

    pool.shutdown().await;
}

#[tokio::test]
async fn pool_reports_division_by_zero() {
    let coordinator =
        Arc::new(Coordinator::new(MemoryStore::new(), OperatorTimings::instant()));
    let pool = WorkerPool::new(coordinator.clone(), fast_settings(2));
    pool.start().await;

    let id = coordinator.submit(1, "(1+2)*(4/0)").await.unwrap();
    let view = wait_for_terminal(&coordinator, id).await;
    assert_eq!(view.status, ExpressionStatus::Error);
    assert_eq!(view.error_message.as_deref(), Some("division by zero"));

    pool.shutdown().await;
}

#[tokio::test]
async fn many_expressions_converge_under_one_pool() {
    let coordinator =
        Arc::new(Coordinator::new(MemoryStore::new(), OperatorTimings::instant()));
    let pool = WorkerPool::new(coordinator.clone(), fast_settings(4));
    pool.start().await;

    let cases: &[(&str, f64)] = &[
        ("2+3", 5.0),
        ("10-4-3", 3.0),
        ("2+3*4-6/2", 11.0),
        ("(((1+2)+3)+4)+5", 15.0),
        ("42", 42.0),
    ];

    let mut submitted = Vec::new();
    for (text, expected) in cases {
        submitted.push((coordinator.submit(1, text).await.unwrap(), *expected, *text));
    }

    for (id, expected, text) in submitted {
        let view = wait_for_terminal(&coordinator, id).await;
        assert_eq!(view.status, ExpressionStatus::Completed, "{text}");
        assert_eq!(view.result, Some(expected), "{text}");
    }

    pool.shutdown().await;
}

#[tokio::test]
async fn per_operator_latency_is_respected() {
    // A deliberately slow addition: the expression cannot settle before the
    // configured operation time has elapsed.
    let timings = OperatorTimings {
        time_addition: Duration::from_millis(150),
        ..OperatorTimings::instant()
    };
    let coordinator = Arc::new(Coordinator::new(MemoryStore::new(), timings));
    let pool = WorkerPool::new(coordinator.clone(), fast_settings(1));
    pool.start().await;

    let started = std::time::Instant::now();
    let id = coordinator.submit(1, "2+3").await.unwrap();
    let view = wait_for_terminal(&coordinator, id).await;
    assert_eq!(view.result, Some(5.0));
    assert!(
        started.elapsed() >= Duration::from_millis(150),
        "worker replied before sleeping the configured latency"
    );

    pool.shutdown().await;
}
