mod common;

use std::sync::Arc;
use std::time::Duration;

use scheduler_core::models::{RouteStrategy, TriggerParam};
use scheduler_core::traits::JobExecutorMappingRepository;
use scheduler_dispatcher::ExecutorRouter;
use scheduler_infrastructure::InMemoryJobExecutorMappingRepository;

use common::{FakeExecutor, FakeExecutors};

const A: &str = "http://10.0.0.1:9999";
const B: &str = "http://10.0.0.2:9999";
const C: &str = "http://10.0.0.3:9999";

fn addresses() -> Vec<String> {
    vec![A.to_string(), B.to_string(), C.to_string()]
}

fn router(executors: Arc<FakeExecutors>) -> (ExecutorRouter, Arc<InMemoryJobExecutorMappingRepository>) {
    let mappings = Arc::new(InMemoryJobExecutorMappingRepository::new());
    (ExecutorRouter::new(executors, mappings.clone()), mappings)
}

#[tokio::test]
async fn test_first_and_last() {
    let (router, _) = router(Arc::new(FakeExecutors::new()));
    let trigger = TriggerParam::new(1, 1, "demo");

    let first = router.route(RouteStrategy::First, 1, &trigger, &addresses()).await;
    let last = router.route(RouteStrategy::Last, 1, &trigger, &addresses()).await;
    assert_eq!(first.content.as_deref(), Some(A));
    assert_eq!(last.content.as_deref(), Some(C));
}

#[tokio::test]
async fn test_empty_address_list_fails() {
    let (router, _) = router(Arc::new(FakeExecutors::new()));
    let trigger = TriggerParam::new(1, 1, "demo");
    let result = router.route(RouteStrategy::Random, 1, &trigger, &[]).await;
    assert!(!result.is_success());
}

#[tokio::test]
async fn test_failover_skips_dead_executors() {
    let executors = Arc::new(FakeExecutors::new());
    executors.add(A, FakeExecutor::down());
    executors.add(C, FakeExecutor::healthy());
    let (router, _) = router(executors);
    let trigger = TriggerParam::new(1, 1, "demo");

    let result = router.route(RouteStrategy::Failover, 1, &trigger, &addresses()).await;

    assert!(result.is_success());
    assert_eq!(result.content.as_deref(), Some(C));
    let report = result.msg_or_empty();
    assert!(report.contains(A));
    assert!(report.contains(B));
}

#[tokio::test]
async fn test_failover_all_dead_reports_every_probe() {
    let executors = Arc::new(FakeExecutors::new());
    executors.add(A, FakeExecutor::down());
    let (router, _) = router(executors);
    let trigger = TriggerParam::new(1, 1, "demo");

    let result = router.route(RouteStrategy::Failover, 1, &trigger, &addresses()).await;

    assert!(!result.is_success());
    assert_eq!(result.msg_or_empty().lines().count(), 3);
}

#[tokio::test]
async fn test_busyover_picks_first_idle() {
    let executors = Arc::new(FakeExecutors::new());
    executors.add(A, FakeExecutor { idle: false, ..FakeExecutor::healthy() });
    executors.add(B, FakeExecutor::healthy());
    executors.add(C, FakeExecutor::healthy());
    let (router, _) = router(executors);
    let trigger = TriggerParam::new(1, 1, "demo");

    let result = router.route(RouteStrategy::Busyover, 1, &trigger, &addresses()).await;
    assert_eq!(result.content.as_deref(), Some(B));
}

#[tokio::test]
async fn test_idle_thread_based_selects_free_capacity_and_records_mapping() {
    let executors = Arc::new(FakeExecutors::new());
    executors.add(A, FakeExecutor::with_status(2, 1, 1));
    executors.add(B, FakeExecutor::with_status(2, 1, 0));
    executors.add(C, FakeExecutor::with_status(4, 0, 0));
    let (router, mappings) = router(executors);
    let trigger = TriggerParam::new(77, 1, "demo");

    let result = router
        .route(RouteStrategy::IdleThreadBased, 1, &trigger, &addresses())
        .await;
    assert_eq!(result.content.as_deref(), Some(B));

    let mut recorded = None;
    for _ in 0..50 {
        recorded = mappings.find(77).await.unwrap();
        if recorded.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(recorded.as_deref(), Some(B));
}

#[tokio::test]
async fn test_idle_thread_based_without_capacity_lists_counters() {
    let executors = Arc::new(FakeExecutors::new());
    executors.add(A, FakeExecutor::with_status(2, 2, 0));
    executors.add(B, FakeExecutor::with_status(1, 0, 3));
    let (router, mappings) = router(executors);
    let trigger = TriggerParam::new(5, 1, "demo");

    let result = router
        .route(RouteStrategy::IdleThreadBased, 1, &trigger, &addresses())
        .await;

    assert!(!result.is_success());
    let report = result.msg_or_empty();
    assert!(report.contains("free：0"));
    assert!(report.contains("free：-2"));
    assert!(report.contains(C));
    assert!(mappings.find(5).await.unwrap().is_none());
}

#[tokio::test]
async fn test_sharding_broadcast_uses_index() {
    let (router, _) = router(Arc::new(FakeExecutors::new()));
    let mut trigger = TriggerParam::new(1, 1, "demo");
    trigger.broadcast_index = 2;
    trigger.broadcast_total = 3;

    let result = router
        .route(RouteStrategy::ShardingBroadcast, 1, &trigger, &addresses())
        .await;
    assert_eq!(result.content.as_deref(), Some(C));
}
