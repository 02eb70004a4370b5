use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use scheduler_core::config::ExecutorConfig;
use scheduler_core::traits::{AdminBiz, ExecutorBiz};
use scheduler_core::SchedulerResult;
use scheduler_infrastructure::MetricsCollector;

use crate::admin_client::HttpAdminClient;
use crate::backlog::CallbackBacklog;
use crate::callback::CallbackChannel;
use crate::executor_service::ExecutorBizImpl;
use crate::executors::register_builtin_handlers;
use crate::handler::HandlerRegistry;
use crate::heartbeat::ExecutorRegistrar;
use crate::job_logger::JobFileLogger;
use crate::job_thread::{JobThreadFactory, JobThreadOptions};
use crate::job_thread_registry::JobThreadRegistry;
use crate::thread_monitor::ThreadMonitor;

const SHUTDOWN_REASON: &str = "executor shutdown.";

/// 执行器运行时构建器
pub struct ExecutorRuntimeBuilder {
    config: ExecutorConfig,
    handlers: Arc<HandlerRegistry>,
    admin: Option<Arc<dyn AdminBiz>>,
    metrics: Option<Arc<MetricsCollector>>,
    address: Option<String>,
}

impl ExecutorRuntimeBuilder {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            handlers: Arc::new(HandlerRegistry::new()),
            admin: None,
            metrics: None,
            address: None,
        }
    }

    /// 使用外部注册好的处理器
    pub fn handlers(mut self, handlers: Arc<HandlerRegistry>) -> Self {
        self.handlers = handlers;
        self
    }

    /// 替换默认的HTTP调度中心客户端
    pub fn admin(mut self, admin: Arc<dyn AdminBiz>) -> Self {
        self.admin = Some(admin);
        self
    }

    pub fn metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// 显式指定注册地址
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn build(self) -> SchedulerResult<ExecutorRuntime> {
        let config = self.config;
        let admin: Arc<dyn AdminBiz> = match self.admin {
            Some(admin) => admin,
            None => Arc::new(HttpAdminClient::new(
                &config.admin_addresses,
                config.access_token.clone(),
                Duration::from_secs(config.admin_request_timeout_seconds),
            )?),
        };
        let metrics = self.metrics.unwrap_or_else(|| Arc::new(MetricsCollector::new()));
        let address = match self.address {
            Some(address) => address,
            None => {
                let host = hostname::get()
                    .map(|h| h.to_string_lossy().to_string())
                    .unwrap_or_else(|_| "127.0.0.1".to_string());
                config.resolved_address(&host)
            }
        };

        register_builtin_handlers(&self.handlers);

        let callbacks = Arc::new(CallbackChannel::new(
            Arc::clone(&admin),
            Arc::new(CallbackBacklog::new(&config.callback_backlog_path)),
            Arc::clone(&metrics),
            config.beat_interval(),
        ));
        let threads = Arc::new(JobThreadRegistry::new());
        let logger = JobFileLogger::new(&config.log_path);
        let factory = JobThreadFactory::new(
            JobThreadOptions::from_config(&config),
            callbacks.sender(),
            logger,
            metrics,
            &threads,
        );
        let script_dir = PathBuf::from(&config.log_path).join("gluesource");
        let executor_biz = Arc::new(ExecutorBizImpl::new(
            Arc::clone(&self.handlers),
            Arc::clone(&threads),
            factory,
            script_dir,
            config.max_thread_count,
        ));
        let registrar = Arc::new(ExecutorRegistrar::new(
            Arc::clone(&admin),
            &config.app_name,
            &address,
            Arc::clone(&threads),
            config.max_thread_count,
            config.beat_interval(),
        ));
        let monitor = Arc::new(ThreadMonitor::new(
            admin,
            Arc::clone(&threads),
            &config.app_name,
            &address,
            Duration::from_secs(config.thread_report_interval_seconds),
        ));

        Ok(ExecutorRuntime {
            app_name: config.app_name,
            address,
            handlers: self.handlers,
            threads,
            executor_biz,
            callbacks,
            registrar,
            monitor,
        })
    }
}

/// 执行器运行时
///
/// 启动顺序：回调通道、注册心跳、线程监控；停止时先摘除注册，
/// 再停止全部作业线程并等待排空，最后关闭回调通道。
pub struct ExecutorRuntime {
    app_name: String,
    address: String,
    handlers: Arc<HandlerRegistry>,
    threads: Arc<JobThreadRegistry>,
    executor_biz: Arc<ExecutorBizImpl>,
    callbacks: Arc<CallbackChannel>,
    registrar: Arc<ExecutorRegistrar>,
    monitor: Arc<ThreadMonitor>,
}

impl ExecutorRuntime {
    pub fn builder(config: ExecutorConfig) -> ExecutorRuntimeBuilder {
        ExecutorRuntimeBuilder::new(config)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    pub fn threads(&self) -> &Arc<JobThreadRegistry> {
        &self.threads
    }

    pub fn callbacks(&self) -> &Arc<CallbackChannel> {
        &self.callbacks
    }

    pub fn executor_biz(&self) -> Arc<dyn ExecutorBiz> {
        self.executor_biz.clone()
    }

    pub fn start(&self) {
        self.callbacks.start();
        self.registrar.start();
        self.monitor.start();
        info!(
            "执行器已启动: app={}, address={}, handlers={:?}",
            self.app_name,
            self.address,
            self.handlers.names()
        );
    }

    pub async fn stop(&self) {
        self.registrar.stop().await;
        self.monitor.stop().await;
        self.threads.stop_all(SHUTDOWN_REASON).await;
        self.callbacks.stop().await;
        info!("执行器已停止: address={}", self.address);
    }
}
