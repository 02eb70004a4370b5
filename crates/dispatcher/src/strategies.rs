use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use md5::{Digest, Md5};
use rand::Rng;
use tracing::{debug, warn};

use scheduler_core::current_millis;
use scheduler_core::models::{
    IdleBeatParam, ReturnT, RouteStrategy, TriggerParam, SUCCESS_CODE,
};
use scheduler_core::traits::JobExecutorMappingRepository;

use crate::executor_client::ExecutorClientProvider;

/// 计数类路由状态的重置周期
const CACHE_VALID_MS: i64 = 24 * 60 * 60 * 1000;
const ROUND_COUNT_LIMIT: usize = 1_000_000;
const VIRTUAL_NODE_NUM: usize = 100;

/// 周期性整体清空的状态表
struct ExpiringMap<K, V> {
    entries: DashMap<K, V>,
    valid_until: AtomicI64,
}

impl<K: std::hash::Hash + Eq, V> ExpiringMap<K, V> {
    fn new() -> Self {
        Self {
            entries: DashMap::new(),
            valid_until: AtomicI64::new(current_millis() + CACHE_VALID_MS),
        }
    }

    fn refresh(&self) -> &DashMap<K, V> {
        let now = current_millis();
        let valid_until = self.valid_until.load(Ordering::Acquire);
        if now > valid_until
            && self
                .valid_until
                .compare_exchange(
                    valid_until,
                    now + CACHE_VALID_MS,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
        {
            self.entries.clear();
        }
        &self.entries
    }
}

/// 轮询策略，游标按执行器分组维护
pub struct RoundRobinStrategy {
    counters: ExpiringMap<i64, usize>,
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self {
            counters: ExpiringMap::new(),
        }
    }

    pub fn select(&self, group_id: i64, addresses: &[String]) -> Option<String> {
        if addresses.is_empty() {
            return None;
        }

        let mut counter = self
            .counters
            .refresh()
            .entry(group_id)
            .or_insert_with(|| rand::rng().random_range(0..100));
        let count = *counter;
        *counter = if count >= ROUND_COUNT_LIMIT {
            rand::rng().random_range(0..100)
        } else {
            count + 1
        };
        drop(counter);

        let index = count % addresses.len();
        debug!(
            "轮询策略选择执行器: {} (索引: {}/{})",
            addresses[index],
            index,
            addresses.len()
        );
        Some(addresses[index].clone())
    }
}

impl Default for RoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

/// 最不经常使用策略，按作业统计各地址的命中次数
pub struct LeastFrequentlyUsedStrategy {
    usage: ExpiringMap<i64, HashMap<String, u64>>,
}

impl LeastFrequentlyUsedStrategy {
    pub fn new() -> Self {
        Self {
            usage: ExpiringMap::new(),
        }
    }

    pub fn select(&self, job_id: i64, addresses: &[String]) -> Option<String> {
        if addresses.is_empty() {
            return None;
        }

        let mut counts = self.usage.refresh().entry(job_id).or_default();
        counts.retain(|address, _| addresses.contains(address));

        let mut rng = rand::rng();
        for address in addresses {
            counts
                .entry(address.clone())
                .or_insert_with(|| rng.random_range(0..addresses.len() as u64));
        }

        let chosen = counts
            .iter()
            .min_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)))
            .map(|(address, _)| address.clone())?;
        if let Some(count) = counts.get_mut(&chosen) {
            *count += 1;
        }

        Some(chosen)
    }
}

impl Default for LeastFrequentlyUsedStrategy {
    fn default() -> Self {
        Self::new()
    }
}

/// 最近最久未使用策略，按作业维护访问顺序，队首为最久未使用
pub struct LeastRecentlyUsedStrategy {
    access_order: ExpiringMap<i64, Vec<String>>,
}

impl LeastRecentlyUsedStrategy {
    pub fn new() -> Self {
        Self {
            access_order: ExpiringMap::new(),
        }
    }

    pub fn select(&self, job_id: i64, addresses: &[String]) -> Option<String> {
        if addresses.is_empty() {
            return None;
        }

        let mut order = self.access_order.refresh().entry(job_id).or_default();
        order.retain(|address| addresses.contains(address));
        for address in addresses {
            if !order.contains(address) {
                order.push(address.clone());
            }
        }

        let chosen = order.remove(0);
        order.push(chosen.clone());
        Some(chosen)
    }
}

impl Default for LeastRecentlyUsedStrategy {
    fn default() -> Self {
        Self::new()
    }
}

/// 一致性哈希策略，同一作业在地址列表不变时总是落到同一执行器
pub struct ConsistentHashStrategy;

impl ConsistentHashStrategy {
    /// MD5摘要的低4字节按小端拼成32位哈希
    pub fn hash(key: &str) -> u64 {
        let digest = Md5::digest(key.as_bytes());
        (u64::from(digest[3]) << 24)
            | (u64::from(digest[2]) << 16)
            | (u64::from(digest[1]) << 8)
            | u64::from(digest[0])
    }

    pub fn select(job_id: i64, addresses: &[String]) -> Option<String> {
        let mut ring = BTreeMap::new();
        for address in addresses {
            for node in 0..VIRTUAL_NODE_NUM {
                ring.insert(Self::hash(&format!("SHARD-{address}-NODE-{node}")), address);
            }
        }

        let job_hash = Self::hash(&job_id.to_string());
        ring.range(job_hash..)
            .next()
            .or_else(|| ring.iter().next())
            .map(|(_, address)| (*address).clone())
    }
}

/// 执行器路由
///
/// 所有路由策略的统一入口。成功时 `content` 为选中的地址，`msg` 携带探测过程的诊断信息；
/// 失败时 `msg` 列出每个被探测地址的结果。
pub struct ExecutorRouter {
    round: RoundRobinStrategy,
    lfu: LeastFrequentlyUsedStrategy,
    lru: LeastRecentlyUsedStrategy,
    clients: Arc<dyn ExecutorClientProvider>,
    mappings: Arc<dyn JobExecutorMappingRepository>,
}

impl ExecutorRouter {
    pub fn new(
        clients: Arc<dyn ExecutorClientProvider>,
        mappings: Arc<dyn JobExecutorMappingRepository>,
    ) -> Self {
        Self {
            round: RoundRobinStrategy::new(),
            lfu: LeastFrequentlyUsedStrategy::new(),
            lru: LeastRecentlyUsedStrategy::new(),
            clients,
            mappings,
        }
    }

    pub fn clients(&self) -> &Arc<dyn ExecutorClientProvider> {
        &self.clients
    }

    pub async fn route(
        &self,
        strategy: RouteStrategy,
        group_id: i64,
        trigger: &TriggerParam,
        addresses: &[String],
    ) -> ReturnT<String> {
        if addresses.is_empty() {
            return ReturnT::fail("执行器地址为空");
        }

        let selected = match strategy {
            RouteStrategy::First => addresses.first().cloned(),
            RouteStrategy::Last => addresses.last().cloned(),
            RouteStrategy::Round => self.round.select(group_id, addresses),
            RouteStrategy::Random => {
                let index = rand::rng().random_range(0..addresses.len());
                Some(addresses[index].clone())
            }
            RouteStrategy::ConsistentHash => {
                ConsistentHashStrategy::select(trigger.job_id, addresses)
            }
            RouteStrategy::LeastFrequentlyUsed => self.lfu.select(trigger.job_id, addresses),
            RouteStrategy::LeastRecentlyUsed => self.lru.select(trigger.job_id, addresses),
            RouteStrategy::ShardingBroadcast => addresses
                .get(trigger.broadcast_index as usize)
                .or_else(|| addresses.first())
                .cloned(),
            RouteStrategy::Failover => return self.failover(addresses).await,
            RouteStrategy::Busyover => return self.busyover(trigger.job_id, addresses).await,
            RouteStrategy::IdleThreadBased => {
                return self.idle_thread_based(trigger.job_id, addresses).await
            }
        };

        match selected {
            Some(address) => ReturnT::success_with(address),
            None => ReturnT::fail("执行器地址为空"),
        }
    }

    /// 依次探测存活，返回第一个应答成功的地址
    async fn failover(&self, addresses: &[String]) -> ReturnT<String> {
        let mut report = Vec::with_capacity(addresses.len());
        for address in addresses {
            let beat = match self.clients.executor(address) {
                Ok(client) => client.beat().await,
                Err(e) => ReturnT::fail(e.to_string()),
            };
            report.push(format!(
                "心跳检测：address：{}，code：{}，msg：{}",
                address,
                beat.code,
                beat.msg_or_empty()
            ));

            if beat.is_success() {
                return ReturnT {
                    code: beat.code,
                    msg: Some(report.join("\n")),
                    content: Some(address.clone()),
                };
            }
        }

        ReturnT::fail(report.join("\n"))
    }

    /// 依次探测作业线程是否空闲，返回第一个空闲的地址
    async fn busyover(&self, job_id: i64, addresses: &[String]) -> ReturnT<String> {
        let mut report = Vec::with_capacity(addresses.len());
        for address in addresses {
            let idle = match self.clients.executor(address) {
                Ok(client) => client.idle_beat(IdleBeatParam { job_id }).await,
                Err(e) => ReturnT::fail(e.to_string()),
            };
            report.push(format!(
                "空闲检测：address：{}，code：{}，msg：{}",
                address,
                idle.code,
                idle.msg_or_empty()
            ));

            if idle.is_success() {
                return ReturnT {
                    code: idle.code,
                    msg: Some(report.join("\n")),
                    content: Some(address.clone()),
                };
            }
        }

        ReturnT::fail(report.join("\n"))
    }

    /// 依次查询执行器线程占用，返回第一个仍有空闲容量的地址
    async fn idle_thread_based(&self, job_id: i64, addresses: &[String]) -> ReturnT<String> {
        let mut report = Vec::with_capacity(addresses.len());
        for address in addresses {
            let status = match self.clients.executor(address) {
                Ok(client) => client.status().await,
                Err(e) => ReturnT::fail(e.to_string()),
            };

            match status.content.filter(|_| status.code == SUCCESS_CODE) {
                Some(status) => {
                    let free = status.free();
                    report.push(format!(
                        "线程检测：address：{}，capacity：{}，running：{}，pending：{}，free：{}",
                        address,
                        status.thread_capacity,
                        status.running_count,
                        status.pending_count,
                        free
                    ));

                    if free > 0 {
                        self.record_mapping(job_id, address.clone());
                        return ReturnT {
                            code: SUCCESS_CODE,
                            msg: Some(report.join("\n")),
                            content: Some(address.clone()),
                        };
                    }
                }
                None => report.push(format!(
                    "线程检测：address：{}，code：{}，msg：{}",
                    address,
                    status.code,
                    status.msg.as_deref().unwrap_or("")
                )),
            }
        }

        ReturnT::fail(report.join("\n"))
    }

    /// 异步记录作业与选中地址的映射，失败不影响路由结果
    fn record_mapping(&self, job_id: i64, address: String) {
        let mappings = Arc::clone(&self.mappings);
        tokio::spawn(async move {
            if let Err(e) = mappings.record(job_id, &address).await {
                warn!("记录作业执行器映射失败: job_id={}, address={}, error={}", job_id, address, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addresses(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("http://10.0.0.{i}:9999")).collect()
    }

    #[test]
    fn test_round_robin_rotates_per_group() {
        let strategy = RoundRobinStrategy::new();
        let list = addresses(3);

        let first = strategy.select(1, &list).unwrap();
        let second = strategy.select(1, &list).unwrap();
        let third = strategy.select(1, &list).unwrap();
        let fourth = strategy.select(1, &list).unwrap();

        assert_ne!(first, second);
        assert_ne!(second, third);
        assert_eq!(first, fourth);
    }

    #[test]
    fn test_lfu_spreads_load() {
        let strategy = LeastFrequentlyUsedStrategy::new();
        let list = addresses(3);

        let mut hits: HashMap<String, usize> = HashMap::new();
        for _ in 0..30 {
            *hits.entry(strategy.select(9, &list).unwrap()).or_default() += 1;
        }

        assert_eq!(hits.len(), 3);
        for count in hits.values() {
            assert!((8..=12).contains(count), "unbalanced: {hits:?}");
        }
    }

    #[test]
    fn test_lfu_forgets_removed_addresses() {
        let strategy = LeastFrequentlyUsedStrategy::new();
        strategy.select(1, &addresses(3));
        let only = vec!["http://10.0.0.9:9999".to_string()];
        assert_eq!(strategy.select(1, &only).unwrap(), only[0]);
    }

    #[test]
    fn test_lru_cycles_through_addresses() {
        let strategy = LeastRecentlyUsedStrategy::new();
        let list = addresses(3);

        let picked: Vec<String> = (0..6).map(|_| strategy.select(5, &list).unwrap()).collect();
        assert_eq!(picked[0..3], list[..]);
        assert_eq!(picked[3..6], list[..]);
    }

    #[test]
    fn test_consistent_hash_is_stable() {
        let list = addresses(5);
        let first = ConsistentHashStrategy::select(42, &list).unwrap();
        for _ in 0..10 {
            assert_eq!(ConsistentHashStrategy::select(42, &list).unwrap(), first);
        }

        let mut reversed = list.clone();
        reversed.reverse();
        assert_eq!(ConsistentHashStrategy::select(42, &reversed).unwrap(), first);
    }

    #[test]
    fn test_consistent_hash_empty() {
        assert!(ConsistentHashStrategy::select(1, &[]).is_none());
    }
}
