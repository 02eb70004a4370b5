use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tower::ServiceExt;

use scheduler_api::create_executor_app;
use scheduler_core::models::{
    ExecutorStatus, IdleBeatParam, KillParam, LogParam, LogResult, ReturnT, TriggerParam,
    ACCESS_TOKEN_HEADER,
};
use scheduler_core::traits::ExecutorBiz;

#[derive(Default)]
struct RecordingExecutor {
    runs: Mutex<Vec<TriggerParam>>,
    kills: Mutex<Vec<i64>>,
}

#[async_trait]
impl ExecutorBiz for RecordingExecutor {
    async fn beat(&self) -> ReturnT<String> {
        ReturnT::success()
    }

    async fn idle_beat(&self, param: IdleBeatParam) -> ReturnT<String> {
        if param.job_id == 1 {
            ReturnT::fail("job thread is running or has trigger queue.")
        } else {
            ReturnT::success()
        }
    }

    async fn run(&self, param: TriggerParam) -> ReturnT<String> {
        self.runs.lock().push(param);
        ReturnT::success()
    }

    async fn kill(&self, param: KillParam) -> ReturnT<String> {
        self.kills.lock().push(param.job_id);
        ReturnT::success()
    }

    async fn log(&self, param: LogParam) -> ReturnT<LogResult> {
        ReturnT::success_with(LogResult {
            from_line_num: param.from_line_num,
            to_line_num: param.from_line_num + 1,
            log_content: "line\n".to_string(),
            is_end: true,
        })
    }

    async fn status(&self) -> ReturnT<ExecutorStatus> {
        ReturnT::success_with(ExecutorStatus {
            thread_capacity: 4,
            running_count: 1,
            pending_count: 2,
        })
    }

    async fn force_kill(&self, param: KillParam) -> ReturnT<String> {
        self.kills.lock().push(-param.job_id);
        ReturnT::success()
    }
}

fn app(token: Option<&str>) -> (Router, Arc<RecordingExecutor>) {
    let executor = Arc::new(RecordingExecutor::default());
    (create_executor_app(executor.clone(), token), executor)
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
async fn test_health_check_skips_token() {
    let (app, _) = app(Some("secret"));
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_wrong_token_is_rejected() {
    let (app, executor) = app(Some("secret"));
    let request = post("/run", json!({"jobId": 1, "logId": 1}), Some("wrong"));
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 500);
    assert_eq!(body["msg"], "The access token is wrong.");
    assert!(executor.runs.lock().is_empty());
}

#[tokio::test]
async fn test_run_accepts_camel_case_trigger() {
    let (app, executor) = app(Some("secret"));
    let trigger = serde_json::to_value(TriggerParam::new(7, 70, "demoHandler")).unwrap();
    assert_eq!(trigger["executorHandler"], "demoHandler");

    let (status, body) = send(app, post("/run", trigger, Some("secret"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 200);

    let runs = executor.runs.lock();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].job_id, 7);
    assert_eq!(runs[0].log_id, 70);
}

#[tokio::test]
async fn test_idle_beat_reports_busy() {
    let (app, _) = app(None);
    let (_, body) = send(app, post("/idleBeat", json!({"jobId": 1}), None)).await;
    assert_eq!(body["code"], 500);
    assert_eq!(body["msg"], "job thread is running or has trigger queue.");
}

#[tokio::test]
async fn test_status_and_log_return_content() {
    let (app, _) = app(None);
    let (_, body) = send(app.clone(), post("/status", json!({}), None)).await;
    assert_eq!(body["content"]["threadCapacity"], 4);
    assert_eq!(body["content"]["runningCount"], 1);
    assert_eq!(body["content"]["pendingCount"], 2);

    let (_, body) = send(
        app,
        post("/log", json!({"logDateTime": 0, "logId": 3, "fromLineNum": 5}), None),
    )
    .await;
    assert_eq!(body["content"]["fromLineNum"], 5);
    assert_eq!(body["content"]["toLineNum"], 6);
    assert_eq!(body["content"]["isEnd"], true);
}

#[tokio::test]
async fn test_kill_and_force_kill() {
    let (app, executor) = app(None);
    send(app.clone(), post("/kill", json!({"jobId": 3}), None)).await;
    send(app, post("/forceKill", json!({"jobId": 4}), None)).await;
    assert_eq!(*executor.kills.lock(), vec![3, -4]);
}
