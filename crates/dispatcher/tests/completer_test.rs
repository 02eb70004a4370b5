mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use scheduler_core::models::{
    HandleCallbackParam, JobLog, RegistryParam, TriggerType, FAIL_CODE, SUCCESS_CODE,
};
use scheduler_core::traits::{JobLogRepository, JobRegistryRepository};
use scheduler_dispatcher::completer::LOST_JOB_MSG;
use scheduler_dispatcher::{JobCompleter, JobRegistryService};
use scheduler_infrastructure::{InMemoryStore, MetricsCollector};

use common::{create_group, create_job, test_config, RecordingSubmitter};

fn completer(store: &InMemoryStore, submitter: Arc<RecordingSubmitter>) -> Arc<JobCompleter> {
    let config = test_config();
    let metrics = Arc::new(MetricsCollector::new());
    let registry = Arc::new(JobRegistryService::new(
        store.registry.clone(),
        store.groups.clone(),
        metrics.clone(),
        &config,
    ));
    Arc::new(JobCompleter::new(
        store.logs.clone(),
        store.jobs.clone(),
        registry,
        submitter,
        metrics,
        &config,
    ))
}

async fn running_log(store: &InMemoryStore, job_id: i64, address: &str) -> JobLog {
    let mut log = JobLog::new(1, job_id, Utc::now());
    log.id = store.logs.create(&log).await.unwrap();
    log.trigger_code = SUCCESS_CODE;
    log.executor_address = Some(address.to_string());
    store.logs.update_trigger_info(&log).await.unwrap();
    log
}

#[tokio::test]
async fn test_unknown_log_is_reported() {
    let store = InMemoryStore::new();
    let completer = completer(&store, Arc::new(RecordingSubmitter::default()));

    let result = completer
        .callback_one(HandleCallbackParam::new(999, 0, SUCCESS_CODE, None))
        .await;
    assert_eq!(result.msg_or_empty(), "log item not found.");
}

#[tokio::test]
async fn test_duplicate_callback_finalizes_once() {
    let store = InMemoryStore::new();
    let submitter = Arc::new(RecordingSubmitter::default());
    let completer = completer(&store, submitter.clone());
    let group = create_group(&store, "demo", &[]).await;
    let child = create_job(&store, group.id, |_| {}).await;
    let parent = create_job(&store, group.id, |job| job.child_job_ids = vec![child.id]).await;
    let log = running_log(&store, parent.id, "http://a:9999").await;

    let first = completer
        .callback_one(HandleCallbackParam::new(log.id, 0, SUCCESS_CODE, Some("done".into())))
        .await;
    let second = completer
        .callback_one(HandleCallbackParam::new(log.id, 0, FAIL_CODE, Some("late".into())))
        .await;

    assert!(first.is_success());
    assert_eq!(second.msg_or_empty(), "log repeate callback.");

    let stored = store.logs.load_by_id(log.id).await.unwrap().unwrap();
    assert_eq!(stored.handle_code, SUCCESS_CODE);
    assert!(stored.handle_msg.as_deref().unwrap().starts_with("done"));
    assert_eq!(submitter.taken().len(), 1);
}

#[tokio::test]
async fn test_success_triggers_children_except_self() {
    let store = InMemoryStore::new();
    let submitter = Arc::new(RecordingSubmitter::default());
    let completer = completer(&store, submitter.clone());
    let group = create_group(&store, "demo", &[]).await;
    let child = create_job(&store, group.id, |_| {}).await;
    let mut parent = create_job(&store, group.id, |_| {}).await;
    parent.child_job_ids = vec![child.id, parent.id, 4040];
    scheduler_core::traits::JobInfoRepository::update(store.jobs.as_ref(), &parent)
        .await
        .unwrap();
    let log = running_log(&store, parent.id, "http://a:9999").await;

    completer
        .callback_one(HandleCallbackParam::new(log.id, 0, SUCCESS_CODE, None))
        .await;

    let submitted = submitter.taken();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].job_id, child.id);
    assert_eq!(submitted[0].trigger_type, TriggerType::Parent);

    let msg = store
        .logs
        .load_by_id(log.id)
        .await
        .unwrap()
        .unwrap()
        .handle_msg
        .unwrap();
    assert!(msg.contains(&format!("1/3 [任务ID={}], 触发成功", child.id)));
    assert!(msg.contains(&format!("2/3 [任务ID={}], 触发失败", parent.id)));
    assert!(msg.contains("3/3 [任务ID=4040], 触发失败"));
}

#[tokio::test]
async fn test_children_not_triggered_when_log_already_finalized() {
    let store = InMemoryStore::new();
    let submitter = Arc::new(RecordingSubmitter::default());
    let completer = completer(&store, submitter.clone());
    let group = create_group(&store, "demo", &[]).await;
    let child = create_job(&store, group.id, |_| {}).await;
    let parent = create_job(&store, group.id, |job| job.child_job_ids = vec![child.id]).await;
    let log = running_log(&store, parent.id, "http://a:9999").await;

    // 回调读到未终结的日志后，丢失扫描抢先把它标记为失败
    let mut succeeded = store.logs.load_by_id(log.id).await.unwrap().unwrap();
    let mut lost = succeeded.clone();
    lost.handle_time = Some(Utc::now());
    lost.handle_code = FAIL_CODE;
    lost.handle_msg = Some(LOST_JOB_MSG.to_string());
    assert!(completer.complete(lost).await.unwrap());

    succeeded.handle_time = Some(Utc::now());
    succeeded.handle_code = SUCCESS_CODE;
    succeeded.handle_msg = Some("done".to_string());
    assert!(!completer.complete(succeeded).await.unwrap());

    assert!(submitter.taken().is_empty());
    let stored = store.logs.load_by_id(log.id).await.unwrap().unwrap();
    assert_eq!(stored.handle_code, FAIL_CODE);
    assert_eq!(stored.handle_msg.as_deref(), Some(LOST_JOB_MSG));
}

#[tokio::test]
async fn test_failure_does_not_trigger_children() {
    let store = InMemoryStore::new();
    let submitter = Arc::new(RecordingSubmitter::default());
    let completer = completer(&store, submitter.clone());
    let group = create_group(&store, "demo", &[]).await;
    let child = create_job(&store, group.id, |_| {}).await;
    let parent = create_job(&store, group.id, |job| job.child_job_ids = vec![child.id]).await;
    let log = running_log(&store, parent.id, "http://a:9999").await;

    completer
        .callback_one(HandleCallbackParam::new(log.id, 0, FAIL_CODE, Some("boom".into())))
        .await;

    assert!(submitter.taken().is_empty());
}

#[tokio::test]
async fn test_handle_message_is_truncated() {
    let store = InMemoryStore::new();
    let completer = completer(&store, Arc::new(RecordingSubmitter::default()));
    let log = running_log(&store, 1, "http://a:9999").await;

    completer
        .callback_one(HandleCallbackParam::new(
            log.id,
            0,
            FAIL_CODE,
            Some("x".repeat(20_000)),
        ))
        .await;

    let stored = store.logs.load_by_id(log.id).await.unwrap().unwrap();
    assert_eq!(stored.handle_msg.unwrap().chars().count(), 15_000);
}

#[tokio::test]
async fn test_batch_callback_returns_immediately_and_applies() {
    let store = InMemoryStore::new();
    let completer = completer(&store, Arc::new(RecordingSubmitter::default()));
    let first = running_log(&store, 1, "http://a:9999").await;
    let second = running_log(&store, 1, "http://a:9999").await;

    let result = completer.callback(vec![
        HandleCallbackParam::new(first.id, 0, SUCCESS_CODE, None),
        HandleCallbackParam::new(second.id, 0, FAIL_CODE, None),
    ]);
    assert!(result.is_success());

    for _ in 0..100 {
        if store.logs.get_all().iter().all(|log| log.is_finalized()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(store.logs.get_all().iter().all(|log| log.is_finalized()));
}

#[tokio::test]
async fn test_lost_jobs_are_failed_only_when_executor_is_gone() {
    let store = InMemoryStore::new();
    let completer = completer(&store, Arc::new(RecordingSubmitter::default()));
    store
        .registry
        .save_or_update(&RegistryParam::executor("demo", "http://alive:9999"), Utc::now())
        .await
        .unwrap();

    let old = Utc::now() - chrono::Duration::minutes(11);
    let mut ids = Vec::new();
    for address in ["http://alive:9999", "http://gone:9999"] {
        let mut log = JobLog::new(1, 1, old);
        log.id = store.logs.create(&log).await.unwrap();
        log.trigger_code = SUCCESS_CODE;
        log.executor_address = Some(address.to_string());
        store.logs.update_trigger_info(&log).await.unwrap();
        ids.push(log.id);
    }
    let recent = running_log(&store, 1, "http://gone:9999").await;

    assert_eq!(completer.mark_lost_jobs().await.unwrap(), 1);

    let alive = store.logs.load_by_id(ids[0]).await.unwrap().unwrap();
    let gone = store.logs.load_by_id(ids[1]).await.unwrap().unwrap();
    let recent = store.logs.load_by_id(recent.id).await.unwrap().unwrap();
    assert_eq!(alive.handle_code, 0);
    assert_eq!(gone.handle_code, FAIL_CODE);
    assert_eq!(gone.handle_msg.as_deref(), Some(LOST_JOB_MSG));
    assert_eq!(recent.handle_code, 0);
}
