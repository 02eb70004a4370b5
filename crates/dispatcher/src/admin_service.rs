use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::debug;

use scheduler_core::models::{HandleCallbackParam, RegistryParam, ReturnT, ThreadInfo};
use scheduler_core::traits::AdminBiz;

use crate::completer::JobCompleter;
use crate::registry::JobRegistryService;

/// 某个执行器最近一次上报的运行线程
#[derive(Debug, Clone)]
pub struct ThreadSnapshot {
    pub threads: Vec<ThreadInfo>,
    pub reported_at: DateTime<Utc>,
}

/// 调度中心对执行器暴露的服务
pub struct AdminBizImpl {
    completer: Arc<JobCompleter>,
    registry: Arc<JobRegistryService>,
    snapshots: DashMap<String, ThreadSnapshot>,
    snapshot_ttl: Duration,
}

impl AdminBizImpl {
    pub fn new(
        completer: Arc<JobCompleter>,
        registry: Arc<JobRegistryService>,
        snapshot_ttl: std::time::Duration,
    ) -> Self {
        Self {
            completer,
            registry,
            snapshots: DashMap::new(),
            snapshot_ttl: Duration::from_std(snapshot_ttl).unwrap_or_else(|_| Duration::seconds(90)),
        }
    }

    /// 仍在有效期内的线程快照，按执行器地址
    pub fn running_threads(&self) -> Vec<(String, ThreadSnapshot)> {
        let oldest = Utc::now() - self.snapshot_ttl;
        self.snapshots.retain(|_, snapshot| snapshot.reported_at > oldest);

        let mut snapshots: Vec<(String, ThreadSnapshot)> = self
            .snapshots
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        snapshots.sort_by(|a, b| a.0.cmp(&b.0));
        snapshots
    }
}

#[async_trait]
impl AdminBiz for AdminBizImpl {
    async fn callback(&self, params: Vec<HandleCallbackParam>) -> ReturnT<String> {
        self.completer.callback(params)
    }

    async fn registry(&self, param: RegistryParam) -> ReturnT<String> {
        self.registry.registry(param).await
    }

    async fn registry_remove(&self, param: RegistryParam) -> ReturnT<String> {
        self.registry.registry_remove(param).await
    }

    async fn report_running_threads(&self, threads: Vec<ThreadInfo>) -> ReturnT<String> {
        let now = Utc::now();
        let mut by_address: std::collections::HashMap<String, Vec<ThreadInfo>> =
            std::collections::HashMap::new();
        for thread in threads {
            by_address.entry(thread.address.clone()).or_default().push(thread);
        }

        for (address, threads) in by_address {
            debug!("执行器上报运行线程: address={}, threads={}", address, threads.len());
            self.snapshots.insert(
                address,
                ThreadSnapshot {
                    threads,
                    reported_at: now,
                },
            );
        }
        ReturnT::success()
    }
}
