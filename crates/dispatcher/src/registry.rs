use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use scheduler_core::config::AdminConfig;
use scheduler_core::models::{AddressType, RegistryParam, RegistryType, ReturnT};
use scheduler_core::traits::{JobGroupRepository, JobRegistryRepository};
use scheduler_core::SchedulerResult;
use scheduler_infrastructure::MetricsCollector;

const REGISTRY_QUEUE_CAPACITY: usize = 2000;

#[derive(Debug, Clone)]
enum RegistryOp {
    Save(RegistryParam),
    Remove(RegistryParam),
}

/// 执行器注册中心
///
/// 心跳与注销请求入队后立即返回成功，由后台工作任务写入注册表；
/// 监控循环按心跳周期清理失效记录，并把存活地址汇总回自动注册的执行器分组。
pub struct JobRegistryService {
    registry_repo: Arc<dyn JobRegistryRepository>,
    group_repo: Arc<dyn JobGroupRepository>,
    metrics: Arc<MetricsCollector>,
    beat_interval: Duration,
    dead_timeout: Duration,
    pool_size: usize,
    queue: Mutex<Option<mpsc::Sender<RegistryOp>>>,
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl JobRegistryService {
    pub fn new(
        registry_repo: Arc<dyn JobRegistryRepository>,
        group_repo: Arc<dyn JobGroupRepository>,
        metrics: Arc<MetricsCollector>,
        config: &AdminConfig,
    ) -> Self {
        Self {
            registry_repo,
            group_repo,
            metrics,
            beat_interval: config.beat_interval(),
            dead_timeout: config.dead_timeout(),
            pool_size: config.registry_pool_size,
            queue: Mutex::new(None),
            shutdown: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn start(self: &Arc<Self>) {
        let (tx, rx) = mpsc::channel(REGISTRY_QUEUE_CAPACITY);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let mut handles = Vec::with_capacity(self.pool_size + 1);

        for _ in 0..self.pool_size {
            let service = Arc::clone(self);
            let rx = Arc::clone(&rx);
            handles.push(tokio::spawn(async move {
                loop {
                    let op = tokio::select! {
                        _ = service.shutdown.cancelled() => break,
                        op = async { rx.lock().await.recv().await } => op,
                    };
                    match op {
                        Some(op) => service.apply(op).await,
                        None => break,
                    }
                }
            }));
        }

        let service = Arc::clone(self);
        handles.push(tokio::spawn(async move { service.monitor_loop().await }));

        *self.queue.lock() = Some(tx);
        self.handles.lock().extend(handles);
        info!("执行器注册中心已启动: workers={}", self.pool_size);
    }

    /// 执行器心跳注册
    pub async fn registry(&self, param: RegistryParam) -> ReturnT<String> {
        if !param.is_valid() {
            return ReturnT::fail("Illegal Argument.");
        }
        self.enqueue(RegistryOp::Save(param)).await;
        ReturnT::success()
    }

    /// 执行器主动注销
    pub async fn registry_remove(&self, param: RegistryParam) -> ReturnT<String> {
        if !param.is_valid() {
            return ReturnT::fail("Illegal Argument.");
        }
        self.enqueue(RegistryOp::Remove(param)).await;
        ReturnT::success()
    }

    /// 入队失败（队列已满或未启动）时在调用方直接执行
    async fn enqueue(&self, op: RegistryOp) {
        let sender = self.queue.lock().clone();
        let op = match sender {
            Some(sender) => match sender.try_send(op) {
                Ok(()) => return,
                Err(mpsc::error::TrySendError::Full(op))
                | Err(mpsc::error::TrySendError::Closed(op)) => op,
            },
            None => op,
        };
        debug!("注册队列不可用，直接处理注册请求");
        self.apply(op).await;
    }

    async fn apply(&self, op: RegistryOp) {
        let result = match &op {
            RegistryOp::Save(param) => self.registry_repo.save_or_update(param, Utc::now()).await,
            RegistryOp::Remove(param) => self.registry_repo.delete(param).await,
        };
        if let Err(e) = result {
            error!("写入注册表失败: op={:?}, error={}", op, e);
        }
    }

    /// 当前存活的执行器地址
    pub async fn alive_addresses(&self) -> SchedulerResult<HashSet<String>> {
        let alive_after = Utc::now() - self.dead_timeout;
        Ok(self
            .registry_repo
            .find_all_alive(alive_after)
            .await?
            .into_iter()
            .map(|entry| entry.registry_value)
            .collect())
    }

    /// 清理失效记录并刷新自动注册分组的地址列表
    pub async fn refresh_group_addresses(&self) -> SchedulerResult<()> {
        let dead_before = Utc::now() - self.dead_timeout;
        let removed = self.registry_repo.remove_dead(dead_before).await?;
        if removed > 0 {
            info!("清理失效执行器注册记录: {} 条", removed);
        }

        let mut app_addresses: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for entry in self.registry_repo.find_all_alive(dead_before).await? {
            if entry.registry_group == RegistryType::Executor.as_str() {
                app_addresses
                    .entry(entry.registry_key)
                    .or_default()
                    .insert(entry.registry_value);
            }
        }
        self.metrics
            .set_registry_live_addresses(app_addresses.values().map(BTreeSet::len).sum());

        for mut group in self.group_repo.find_by_address_type(AddressType::Auto).await? {
            let address_list = app_addresses
                .get(&group.app_name)
                .filter(|addresses| !addresses.is_empty())
                .map(|addresses| addresses.iter().cloned().collect::<Vec<_>>().join(","));

            if group.address_list != address_list {
                debug!(
                    "执行器分组地址变更: app_name={}, addresses={:?}",
                    group.app_name, address_list
                );
                group.address_list = address_list;
                group.update_time = Utc::now();
                self.group_repo.update(&group).await?;
            }
        }

        Ok(())
    }

    async fn monitor_loop(&self) {
        loop {
            if let Err(e) = self.refresh_group_addresses().await {
                error!("刷新执行器分组地址失败: {}", e);
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.beat_interval) => {}
            }
        }
        info!("执行器注册监控已停止");
    }

    pub async fn stop(&self) {
        self.shutdown.cancel();
        self.queue.lock().take();
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("注册工作任务退出异常: {}", e);
            }
        }
        info!("执行器注册中心已停止");
    }
}
