use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use job_scheduler::app::{AppMode, Application};
use scheduler_core::config::AppConfig;
use scheduler_core::models::{JobGroup, JobInfo, ScheduleType, ACCESS_TOKEN_HEADER, SUCCESS_CODE};
use scheduler_core::traits::{JobGroupRepository, JobLogRepository};
use scheduler_worker::{HandleResult, HandlerRegistry};

const TOKEN: &str = "e2e-token";
const APP_NAME: &str = "e2e-executor";

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn test_config(dir: &std::path::Path, admin_port: u16) -> AppConfig {
    let mut config = AppConfig::default();

    config.admin.bind_address = format!("127.0.0.1:{admin_port}");
    config.admin.access_token = Some(TOKEN.to_string());
    config.admin.beat_interval_seconds = 1;
    config.admin.dead_timeout_seconds = 3;

    config.executor.enabled = true;
    config.executor.app_name = APP_NAME.to_string();
    config.executor.bind_address = "127.0.0.1:0".to_string();
    config.executor.ip = Some("127.0.0.1".to_string());
    config.executor.port = 0;
    config.executor.admin_addresses = vec![format!("http://127.0.0.1:{admin_port}")];
    config.executor.access_token = Some(TOKEN.to_string());
    config.executor.log_path = dir.join("logs").to_string_lossy().to_string();
    config.executor.callback_backlog_path = dir.join("callbacklog").to_string_lossy().to_string();
    config.executor.beat_interval_seconds = 1;
    config.executor.poll_timeout_ms = 50;

    config
}

fn echo_handlers() -> Arc<HandlerRegistry> {
    let handlers = HandlerRegistry::new();
    handlers.register_fn("echo", |ctx| async move {
        ctx.log(format!("echo {}", ctx.job_param));
        HandleResult::success_with(format!("echo:{}", ctx.job_param))
    });
    Arc::new(handlers)
}

async fn post(client: &reqwest::Client, url: String, body: Value, token: Option<&str>) -> reqwest::Response {
    let mut request = client.post(url).json(&body);
    if let Some(token) = token {
        request = request.header(ACCESS_TOKEN_HEADER, token);
    }
    request.send().await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_manual_trigger_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let admin_port = free_port();
    let app = Application::new(test_config(dir.path(), admin_port), AppMode::All)
        .unwrap()
        .with_handlers(echo_handlers());
    let running = app.start().await.unwrap();

    let executor_port = running.executor_addr().unwrap().port();
    let executor_address = format!("http://127.0.0.1:{executor_port}");
    assert_eq!(running.executor().unwrap().address(), executor_address);

    let repos = running.repositories().unwrap().clone();
    let group = repos
        .groups
        .create(&JobGroup::new(APP_NAME, "端到端执行器"))
        .await
        .unwrap();

    // 等待执行器心跳汇总进分组地址
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let current = repos.groups.load_by_id(group.id).await.unwrap().unwrap();
        if current.address_list.as_deref() == Some(executor_address.as_str()) {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "executor never registered");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let client = reqwest::Client::new();
    let admin = format!("http://127.0.0.1:{admin_port}");

    let rejected = post(&client, format!("{admin}/api/job/add"), json!({}), None).await;
    assert_eq!(rejected.status(), reqwest::StatusCode::UNAUTHORIZED);

    let job = JobInfo::new(group.id, ScheduleType::None, "", "echo");
    let added: Value = post(
        &client,
        format!("{admin}/api/job/add"),
        serde_json::to_value(&job).unwrap(),
        Some(TOKEN),
    )
    .await
    .json()
    .await
    .unwrap();
    let job_id = added["content"].as_i64().unwrap();

    let triggered: Value = post(
        &client,
        format!("{admin}/api/job/{job_id}/trigger"),
        json!({"executorParam": "hello"}),
        Some(TOKEN),
    )
    .await
    .json()
    .await
    .unwrap();
    assert_eq!(triggered["code"], 200);

    // 第一条调度日志
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    let log = loop {
        if let Some(log) = repos.logs.load_by_id(1).await.unwrap() {
            if log.handle_code != 0 {
                break log;
            }
        }
        assert!(tokio::time::Instant::now() < deadline, "callback never arrived");
        tokio::time::sleep(Duration::from_millis(100)).await;
    };

    assert_eq!(log.job_id, job_id);
    assert_eq!(log.trigger_code, SUCCESS_CODE);
    assert_eq!(log.executor_address.as_deref(), Some(executor_address.as_str()));
    assert_eq!(log.handle_code, SUCCESS_CODE);
    assert!(log.handle_msg.unwrap_or_default().contains("echo:hello"));

    running.stop().await;
}

#[tokio::test]
async fn test_executor_mode_requires_admin_addresses() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path(), free_port());
    config.executor.admin_addresses = vec!["  ".to_string()];

    let app = Application::new(config, AppMode::Executor).unwrap();
    assert!(app.start().await.is_err());
}
