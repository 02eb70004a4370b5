use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use scheduler_core::traits::AdminBiz;

use crate::job_thread_registry::JobThreadRegistry;

/// 定期向调度中心上报当前作业线程，仅用于观测
pub struct ThreadMonitor {
    admin: Arc<dyn AdminBiz>,
    threads: Arc<JobThreadRegistry>,
    app_name: String,
    address: String,
    interval: Duration,
    shutdown: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadMonitor {
    pub fn new(
        admin: Arc<dyn AdminBiz>,
        threads: Arc<JobThreadRegistry>,
        app_name: impl Into<String>,
        address: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            admin,
            threads,
            app_name: app_name.into(),
            address: address.into(),
            interval,
            shutdown: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    /// 上报一次，没有线程时跳过
    pub async fn report_once(&self) -> usize {
        let infos = self.threads.thread_infos(&self.app_name, &self.address);
        if infos.is_empty() {
            return 0;
        }

        let count = infos.len();
        let result = self.admin.report_running_threads(infos).await;
        if result.is_success() {
            debug!("上报作业线程: count={}", count);
        } else {
            warn!("上报作业线程失败: {}", result.msg_or_empty());
        }
        count
    }

    pub fn start(self: &Arc<Self>) {
        let monitor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = monitor.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(monitor.interval) => {}
                }
                monitor.report_once().await;
            }
        });
        *self.handle.lock() = Some(handle);
    }

    pub async fn stop(&self) {
        self.shutdown.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("线程监控退出异常: {}", e);
            }
        }
    }
}
