use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use scheduler_api::create_admin_app;
use scheduler_core::config::AdminConfig;
use scheduler_core::models::{
    JobGroup, JobInfo, RegistryParam, ScheduleType, ThreadInfo, TriggerStatus, ACCESS_TOKEN_HEADER,
};
use scheduler_core::traits::{ExecutorBiz, JobGroupRepository, JobInfoRepository, JobRegistryRepository};
use scheduler_core::{current_millis, SchedulerError, SchedulerResult};
use scheduler_dispatcher::{Coordinator, CoordinatorRepositories, ExecutorClientProvider};
use scheduler_infrastructure::{InMemoryStore, MetricsCollector};

struct NoExecutors;

impl ExecutorClientProvider for NoExecutors {
    fn executor(&self, address: &str) -> SchedulerResult<Arc<dyn ExecutorBiz>> {
        Err(SchedulerError::Network(format!("unreachable: {address}")))
    }
}

struct Fixture {
    store: InMemoryStore,
    coordinator: Coordinator,
}

impl Fixture {
    fn new() -> Self {
        let store = InMemoryStore::new();
        let coordinator = Coordinator::new(
            CoordinatorRepositories::in_memory(&store),
            Arc::new(NoExecutors),
            Arc::new(MetricsCollector::new()),
            &AdminConfig::default(),
        );
        Self { store, coordinator }
    }

    fn app(&self, token: Option<&str>) -> Router {
        create_admin_app(&self.coordinator, token)
    }
}

fn post(path: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header(ACCESS_TOKEN_HEADER, token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_registry_stores_executor() {
    let fixture = Fixture::new();
    let param = RegistryParam::executor("demo-executor", "http://127.0.0.1:9999").with_occupancy(1, 4);

    let (status, body) = send(
        fixture.app(Some("secret")),
        post("/api/registry", serde_json::to_value(&param).unwrap(), Some("secret")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 200);

    let alive = fixture
        .store
        .registry
        .find_all_alive(Utc::now() - Duration::seconds(90))
        .await
        .unwrap();
    assert_eq!(alive.len(), 1);
    assert_eq!(alive[0].registry_value, "http://127.0.0.1:9999");

    fixture.coordinator.stop().await;
}

#[tokio::test]
async fn test_registry_rejects_blank_fields() {
    let fixture = Fixture::new();
    let param = RegistryParam::executor("", "http://127.0.0.1:9999");

    let (_, body) = send(
        fixture.app(None),
        post("/api/registry", serde_json::to_value(&param).unwrap(), None),
    )
    .await;
    assert_eq!(body["code"], 500);
    assert_eq!(body["msg"], "Illegal Argument.");

    fixture.coordinator.stop().await;
}

#[tokio::test]
async fn test_missing_token_is_rejected() {
    let fixture = Fixture::new();
    let (status, _) = send(fixture.app(Some("secret")), post("/api/callback", json!([]), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    fixture.coordinator.stop().await;
}

#[tokio::test]
async fn test_callback_is_accepted_immediately() {
    let fixture = Fixture::new();
    let (_, body) = send(
        fixture.app(None),
        post(
            "/api/callback",
            json!([{"logId": 404, "logDateTime": 0, "handleCode": 200, "handleMsg": null}]),
            None,
        ),
    )
    .await;
    assert_eq!(body["code"], 200);

    fixture.coordinator.stop().await;
}

#[tokio::test]
async fn test_running_threads_snapshot() {
    let fixture = Fixture::new();
    let threads = vec![ThreadInfo {
        job_id: 3,
        state: "RUNNING".to_string(),
        app_name: "demo-executor".to_string(),
        address: "http://127.0.0.1:9999".to_string(),
        start_time: current_millis(),
    }];
    send(
        fixture.app(None),
        post("/api/reportRunningThreads", serde_json::to_value(&threads).unwrap(), None),
    )
    .await;

    let request = Request::builder()
        .uri("/api/runningThreads")
        .body(Body::empty())
        .unwrap();
    let (_, body) = send(fixture.app(None), request).await;
    let snapshots = body["content"].as_array().unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0]["address"], "http://127.0.0.1:9999");
    assert_eq!(snapshots[0]["threads"][0]["jobId"], 3);

    fixture.coordinator.stop().await;
}

#[tokio::test]
async fn test_job_lifecycle() {
    let fixture = Fixture::new();
    let group = fixture
        .store
        .groups
        .create(&JobGroup::new("demo-executor", "演示执行器"))
        .await
        .unwrap();
    let job = JobInfo::new(group.id, ScheduleType::FixedRate, "30", "demoJobHandler");

    let (status, body) = send(
        fixture.app(None),
        post("/api/job/add", serde_json::to_value(&job).unwrap(), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let job_id = body["content"].as_i64().unwrap();

    let before = current_millis();
    let (_, body) = send(
        fixture.app(None),
        post(&format!("/api/job/{job_id}/start"), json!({}), None),
    )
    .await;
    let next = body["content"].as_i64().unwrap();
    assert!(next >= before + 30_000);

    let stored = fixture.store.jobs.load_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(stored.trigger_status, TriggerStatus::Running);

    send(
        fixture.app(None),
        post(&format!("/api/job/{job_id}/stop"), json!({}), None),
    )
    .await;
    let stored = fixture.store.jobs.load_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(stored.trigger_status, TriggerStatus::Stopped);
    assert_eq!(stored.trigger_next_time, 0);

    fixture.coordinator.stop().await;
}

#[tokio::test]
async fn test_invalid_job_is_bad_request() {
    let fixture = Fixture::new();
    let group = fixture
        .store
        .groups
        .create(&JobGroup::new("demo-executor", "演示执行器"))
        .await
        .unwrap();
    let job = JobInfo::new(group.id, ScheduleType::Cron, "not a cron", "demoJobHandler");

    let (status, body) = send(
        fixture.app(None),
        post("/api/job/add", serde_json::to_value(&job).unwrap(), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 500);

    fixture.coordinator.stop().await;
}

#[tokio::test]
async fn test_trigger_unknown_job_is_not_found() {
    let fixture = Fixture::new();
    let (status, body) = send(
        fixture.app(None),
        post("/api/job/9999/trigger", json!({"executorParam": "x"}), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 500);

    fixture.coordinator.stop().await;
}
