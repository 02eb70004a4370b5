use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use scheduler_core::models::RegistryParam;
use scheduler_core::traits::AdminBiz;

use crate::job_thread_registry::JobThreadRegistry;

/// 执行器注册心跳
///
/// 按心跳间隔向调度中心注册分组、地址与线程占用，停止时主动摘除注册。
pub struct ExecutorRegistrar {
    admin: Arc<dyn AdminBiz>,
    app_name: String,
    address: String,
    threads: Arc<JobThreadRegistry>,
    thread_capacity: u32,
    interval: Duration,
    shutdown: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ExecutorRegistrar {
    pub fn new(
        admin: Arc<dyn AdminBiz>,
        app_name: impl Into<String>,
        address: impl Into<String>,
        threads: Arc<JobThreadRegistry>,
        thread_capacity: u32,
        interval: Duration,
    ) -> Self {
        Self {
            admin,
            app_name: app_name.into(),
            address: address.into(),
            threads,
            thread_capacity,
            interval,
            shutdown: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    fn registry_param(&self) -> RegistryParam {
        let status = self.threads.status(self.thread_capacity);
        RegistryParam::executor(&self.app_name, &self.address)
            .with_occupancy(status.running_count, self.thread_capacity)
    }

    /// 注册一次，返回是否被调度中心接受
    pub async fn beat_once(&self) -> bool {
        let result = self.admin.registry(self.registry_param()).await;
        if result.is_success() {
            debug!("执行器注册成功: app={}, address={}", self.app_name, self.address);
            true
        } else {
            warn!(
                "执行器注册失败: app={}, address={}, msg={}",
                self.app_name,
                self.address,
                result.msg_or_empty()
            );
            false
        }
    }

    pub fn start(self: &Arc<Self>) {
        let registrar = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                registrar.beat_once().await;
                tokio::select! {
                    _ = registrar.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(registrar.interval) => {}
                }
            }

            let result = registrar.admin.registry_remove(registrar.registry_param()).await;
            if result.is_success() {
                info!("执行器已摘除注册: address={}", registrar.address);
            } else {
                warn!("执行器摘除注册失败: msg={}", result.msg_or_empty());
            }
        });
        *self.handle.lock() = Some(handle);
    }

    pub async fn stop(&self) {
        self.shutdown.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("注册心跳退出异常: {}", e);
            }
        }
    }
}
