mod common;

use std::sync::Arc;
use std::time::Duration;

use scheduler_core::config::AdminConfig;
use scheduler_core::models::TriggerType;
use scheduler_dispatcher::{
    ExecutorRouter, JobTrigger, JobTriggerPool, TriggerPoolStats, TriggerRequest, TriggerSubmitter,
};
use scheduler_infrastructure::{InMemoryStore, MetricsCollector};

use common::{create_group, create_job, test_config, FakeExecutor, FakeExecutors};

fn start_pool(store: &InMemoryStore, executors: Arc<FakeExecutors>, config: &AdminConfig) -> Arc<JobTriggerPool> {
    let metrics = Arc::new(MetricsCollector::new());
    let router = Arc::new(ExecutorRouter::new(executors, store.mappings.clone()));
    let trigger = Arc::new(JobTrigger::new(
        store.jobs.clone(),
        store.groups.clone(),
        store.logs.clone(),
        router,
        Arc::clone(&metrics),
    ));
    JobTriggerPool::start(trigger, config, metrics)
}

async fn wait_for_runs(executor: &FakeExecutor, expected: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while executor.run_count() < expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("trigger was not executed in time");
}

#[tokio::test]
async fn test_repeatedly_slow_job_is_routed_to_slow_lane() {
    let store = InMemoryStore::new();
    let executors = Arc::new(FakeExecutors::new());
    let executor = executors.add("http://a:9999", FakeExecutor::healthy());
    let group = create_group(&store, "demo", &["http://a:9999"]).await;
    let slow_job = create_job(&store, group.id, |_| {}).await;
    let fast_job = create_job(&store, group.id, |_| {}).await;

    let config = AdminConfig {
        slow_trigger_threshold_ms: 500,
        slow_trigger_limit: 1,
        ..test_config()
    };
    let pool = start_pool(&store, executors, &config);

    // 一分钟内超时两次，超过上限
    pool.slow_counter().record(slow_job.id, Duration::from_secs(1));
    pool.slow_counter().record(slow_job.id, Duration::from_secs(1));
    // 未超过阈值的耗时不计数
    pool.slow_counter().record(fast_job.id, Duration::from_millis(100));

    pool.submit(TriggerRequest::new(slow_job.id, TriggerType::Cron));
    pool.submit(TriggerRequest::new(fast_job.id, TriggerType::Cron));
    wait_for_runs(&executor, 2).await;

    assert_eq!(
        pool.stats(),
        TriggerPoolStats {
            fast: 1,
            slow: 1,
            overflow: 0,
        }
    );
    let mut job_ids: Vec<i64> = executor.runs.lock().iter().map(|run| run.job_id).collect();
    job_ids.sort();
    assert_eq!(job_ids, vec![slow_job.id, fast_job.id]);

    pool.stop().await;
}

#[tokio::test]
async fn test_full_lane_still_runs_trigger() {
    let store = InMemoryStore::new();
    let executors = Arc::new(FakeExecutors::new());
    let executor = executors.add("http://a:9999", FakeExecutor::healthy());
    let group = create_group(&store, "demo", &["http://a:9999"]).await;
    let job = create_job(&store, group.id, |_| {}).await;

    // 快通道没有工作任务，第一个请求占满容量为1的队列
    let config = AdminConfig {
        fast_queue_capacity: 1,
        trigger_pool_fast_max: 0,
        ..test_config()
    };
    let pool = start_pool(&store, executors, &config);

    pool.submit(TriggerRequest::new(job.id, TriggerType::Cron));
    pool.submit(TriggerRequest::new(job.id, TriggerType::Manual));
    pool.submit(TriggerRequest::new(job.id, TriggerType::Api));
    wait_for_runs(&executor, 2).await;

    let stats = pool.stats();
    assert_eq!(stats.fast, 3);
    assert_eq!(stats.overflow, 2);
    assert_eq!(store.logs.find_by_job(job.id).len(), 2);

    pool.stop().await;
}

#[tokio::test]
async fn test_worker_survives_panicking_trigger() {
    let store = InMemoryStore::new();
    let executors = Arc::new(FakeExecutors::new());
    executors.add(
        "http://broken:9999",
        FakeExecutor {
            panic_on_run: true,
            ..FakeExecutor::healthy()
        },
    );
    let executor = executors.add("http://a:9999", FakeExecutor::healthy());
    let broken_group = create_group(&store, "broken", &["http://broken:9999"]).await;
    let group = create_group(&store, "demo", &["http://a:9999"]).await;
    let broken_job = create_job(&store, broken_group.id, |_| {}).await;
    let job = create_job(&store, group.id, |_| {}).await;

    // 单个工作任务，panic后若退出则后续触发无人处理
    let config = AdminConfig {
        trigger_pool_fast_max: 1,
        ..test_config()
    };
    let pool = start_pool(&store, executors, &config);

    pool.submit(TriggerRequest::new(broken_job.id, TriggerType::Cron));
    tokio::time::sleep(Duration::from_millis(50)).await;
    pool.submit(TriggerRequest::new(job.id, TriggerType::Cron));
    wait_for_runs(&executor, 1).await;

    assert_eq!(executor.runs.lock()[0].job_id, job.id);
    assert_eq!(pool.stats().overflow, 0);

    pool.stop().await;
}
