#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use scheduler_core::config::ExecutorConfig;
use scheduler_core::models::{HandleCallbackParam, RegistryParam, ReturnT, ThreadInfo, TriggerParam};
use scheduler_core::traits::AdminBiz;
use scheduler_worker::{ExecutorRuntime, HandleResult, HandlerRegistry};

/// 记录所有调用的调度中心替身
#[derive(Default)]
pub struct RecordingAdmin {
    pub callbacks: Mutex<Vec<HandleCallbackParam>>,
    pub registrations: Mutex<Vec<RegistryParam>>,
    pub removals: Mutex<Vec<RegistryParam>>,
    pub reported: Mutex<Vec<ThreadInfo>>,
    pub failing: AtomicBool,
}

impl RecordingAdmin {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// 等待至少 `count` 条回调
    pub async fn wait_for_callbacks(&self, count: usize, timeout: Duration) -> Vec<HandleCallbackParam> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let callbacks = self.callbacks.lock().clone();
            if callbacks.len() >= count || tokio::time::Instant::now() >= deadline {
                return callbacks;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub fn callback_for(&self, log_id: i64) -> Option<HandleCallbackParam> {
        self.callbacks
            .lock()
            .iter()
            .find(|callback| callback.log_id == log_id)
            .cloned()
    }
}

#[async_trait]
impl AdminBiz for RecordingAdmin {
    async fn callback(&self, params: Vec<HandleCallbackParam>) -> ReturnT<String> {
        if self.failing.load(Ordering::SeqCst) {
            return ReturnT::fail("admin unavailable");
        }
        self.callbacks.lock().extend(params);
        ReturnT::success()
    }

    async fn registry(&self, param: RegistryParam) -> ReturnT<String> {
        self.registrations.lock().push(param);
        ReturnT::success()
    }

    async fn registry_remove(&self, param: RegistryParam) -> ReturnT<String> {
        self.removals.lock().push(param);
        ReturnT::success()
    }

    async fn report_running_threads(&self, threads: Vec<ThreadInfo>) -> ReturnT<String> {
        self.reported.lock().extend(threads);
        ReturnT::success()
    }
}

pub fn test_config(dir: &Path) -> ExecutorConfig {
    ExecutorConfig {
        app_name: "demo-executor".to_string(),
        log_path: dir.join("logs").to_string_lossy().to_string(),
        callback_backlog_path: dir.join("callbacklog").to_string_lossy().to_string(),
        poll_timeout_ms: 50,
        idle_poll_limit: 0,
        ..ExecutorConfig::default()
    }
}

/// 注册测试用处理器
///
/// - `echo`: 以执行参数作为成功消息
/// - `sleep`: 睡眠参数指定的毫秒数，可被取消
/// - `stuck`: 忽略取消信号睡眠30秒
/// - `lost`: 返回无效结果码
pub fn test_handlers() -> Arc<HandlerRegistry> {
    let handlers = HandlerRegistry::new();
    handlers.register_fn("echo", |ctx| async move {
        ctx.log(format!("echo {}", ctx.job_param));
        HandleResult::success_with(ctx.job_param.clone())
    });
    handlers.register_fn("sleep", |ctx| async move {
        let millis = ctx.job_param.parse::<u64>().unwrap_or(100);
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(millis)) => HandleResult::success(),
            _ = ctx.cancellation().cancelled() => HandleResult::fail("cancelled"),
        }
    });
    handlers.register_fn("stuck", |_ctx| async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        HandleResult::success()
    });
    handlers.register_fn("lost", |_ctx| async move { HandleResult { code: 0, msg: None } });
    Arc::new(handlers)
}

pub fn runtime(dir: &Path, admin: Arc<RecordingAdmin>, configure: impl FnOnce(&mut ExecutorConfig)) -> ExecutorRuntime {
    let mut config = test_config(dir);
    configure(&mut config);
    let runtime = ExecutorRuntime::builder(config)
        .handlers(test_handlers())
        .admin(admin)
        .address("http://127.0.0.1:9999")
        .build()
        .unwrap();
    runtime.start();
    runtime
}

pub fn trigger(job_id: i64, log_id: i64, handler: &str, param: &str) -> TriggerParam {
    let mut trigger = TriggerParam::new(job_id, log_id, handler);
    trigger.executor_params = param.to_string();
    trigger
}
