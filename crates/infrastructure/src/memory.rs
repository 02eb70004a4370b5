//! 进程内仓储实现
//!
//! 用于单实例部署和测试，不依赖外部数据库。语义与PostgreSQL实现保持一致，
//! 包括调度日志"只终结一次"的条件更新。

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use scheduler_core::models::{
    AddressType, JobGroup, JobInfo, JobLog, RegistryEntry, RegistryParam,
};
use scheduler_core::traits::{
    JobExecutorMappingRepository, JobGroupRepository, JobInfoRepository, JobLogRepository,
    JobRegistryRepository, ScheduleLock, ScheduleLockGuard,
};
use scheduler_core::{SchedulerError, SchedulerResult};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// 内存作业仓储
#[derive(Debug)]
pub struct InMemoryJobInfoRepository {
    jobs: RwLock<HashMap<i64, JobInfo>>,
    next_id: AtomicI64,
}

impl Default for InMemoryJobInfoRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobInfoRepository {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn count(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn get_all(&self) -> Vec<JobInfo> {
        let mut jobs: Vec<JobInfo> = self.jobs.read().values().cloned().collect();
        jobs.sort_by_key(|job| job.id);
        jobs
    }
}

#[async_trait]
impl JobInfoRepository for InMemoryJobInfoRepository {
    async fn create(&self, job: &JobInfo) -> SchedulerResult<JobInfo> {
        let mut created = job.clone();
        created.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.jobs.write().insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, job: &JobInfo) -> SchedulerResult<()> {
        let mut jobs = self.jobs.write();
        match jobs.get_mut(&job.id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(SchedulerError::JobNotFound { id: job.id }),
        }
    }

    async fn load_by_id(&self, id: i64) -> SchedulerResult<Option<JobInfo>> {
        Ok(self.jobs.read().get(&id).cloned())
    }

    async fn delete(&self, id: i64) -> SchedulerResult<()> {
        self.jobs.write().remove(&id);
        Ok(())
    }

    async fn schedule_job_query(
        &self,
        max_next_time: i64,
        limit: usize,
    ) -> SchedulerResult<Vec<JobInfo>> {
        let mut due: Vec<JobInfo> = self
            .jobs
            .read()
            .values()
            .filter(|job| job.is_running() && job.trigger_next_time <= max_next_time)
            .cloned()
            .collect();
        due.sort_by_key(|job| (job.trigger_next_time, job.id));
        due.truncate(limit);
        Ok(due)
    }

    async fn schedule_update(&self, jobs: &[JobInfo]) -> SchedulerResult<()> {
        let mut stored = self.jobs.write();
        for job in jobs {
            if let Some(existing) = stored.get_mut(&job.id) {
                existing.trigger_status = job.trigger_status;
                existing.trigger_last_time = job.trigger_last_time;
                existing.trigger_next_time = job.trigger_next_time;
            }
        }
        Ok(())
    }
}

/// 内存执行器分组仓储
#[derive(Debug)]
pub struct InMemoryJobGroupRepository {
    groups: RwLock<HashMap<i64, JobGroup>>,
    next_id: AtomicI64,
}

impl Default for InMemoryJobGroupRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobGroupRepository {
    pub fn new() -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl JobGroupRepository for InMemoryJobGroupRepository {
    async fn create(&self, group: &JobGroup) -> SchedulerResult<JobGroup> {
        let mut created = group.clone();
        created.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.groups.write().insert(created.id, created.clone());
        Ok(created)
    }

    async fn load_by_id(&self, id: i64) -> SchedulerResult<Option<JobGroup>> {
        Ok(self.groups.read().get(&id).cloned())
    }

    async fn find_by_address_type(
        &self,
        address_type: AddressType,
    ) -> SchedulerResult<Vec<JobGroup>> {
        let mut groups: Vec<JobGroup> = self
            .groups
            .read()
            .values()
            .filter(|group| group.address_type == address_type)
            .cloned()
            .collect();
        groups.sort_by_key(|group| group.id);
        Ok(groups)
    }

    async fn update(&self, group: &JobGroup) -> SchedulerResult<()> {
        let mut groups = self.groups.write();
        match groups.get_mut(&group.id) {
            Some(existing) => {
                *existing = group.clone();
                Ok(())
            }
            None => Err(SchedulerError::JobGroupNotFound { id: group.id }),
        }
    }
}

/// 内存调度日志仓储
#[derive(Debug)]
pub struct InMemoryJobLogRepository {
    logs: RwLock<HashMap<i64, JobLog>>,
    next_id: AtomicI64,
}

impl Default for InMemoryJobLogRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobLogRepository {
    pub fn new() -> Self {
        Self {
            logs: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn get_all(&self) -> Vec<JobLog> {
        let mut logs: Vec<JobLog> = self.logs.read().values().cloned().collect();
        logs.sort_by_key(|log| log.id);
        logs
    }

    /// 某个作业的全部日志，按ID升序
    pub fn find_by_job(&self, job_id: i64) -> Vec<JobLog> {
        self.get_all()
            .into_iter()
            .filter(|log| log.job_id == job_id)
            .collect()
    }
}

#[async_trait]
impl JobLogRepository for InMemoryJobLogRepository {
    async fn create(&self, log: &JobLog) -> SchedulerResult<i64> {
        let mut created = log.clone();
        created.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = created.id;
        self.logs.write().insert(id, created);
        Ok(id)
    }

    async fn load_by_id(&self, id: i64) -> SchedulerResult<Option<JobLog>> {
        Ok(self.logs.read().get(&id).cloned())
    }

    async fn update_trigger_info(&self, log: &JobLog) -> SchedulerResult<()> {
        let mut logs = self.logs.write();
        let existing = logs
            .get_mut(&log.id)
            .ok_or(SchedulerError::JobLogNotFound { id: log.id })?;
        existing.executor_address = log.executor_address.clone();
        existing.executor_handler = log.executor_handler.clone();
        existing.executor_param = log.executor_param.clone();
        existing.executor_sharding_param = log.executor_sharding_param.clone();
        existing.executor_fail_retry_count = log.executor_fail_retry_count;
        existing.trigger_code = log.trigger_code;
        existing.trigger_msg = log.trigger_msg.clone();
        Ok(())
    }

    async fn update_handle_info(&self, log: &JobLog) -> SchedulerResult<bool> {
        let mut logs = self.logs.write();
        let existing = logs
            .get_mut(&log.id)
            .ok_or(SchedulerError::JobLogNotFound { id: log.id })?;
        if existing.is_finalized() {
            return Ok(false);
        }
        existing.handle_time = log.handle_time;
        existing.handle_code = log.handle_code;
        existing.handle_msg = log.handle_msg.clone();
        Ok(true)
    }

    async fn update_handle_msg(&self, log_id: i64, handle_msg: &str) -> SchedulerResult<()> {
        let mut logs = self.logs.write();
        let existing = logs
            .get_mut(&log_id)
            .ok_or(SchedulerError::JobLogNotFound { id: log_id })?;
        existing.handle_msg = Some(handle_msg.to_string());
        Ok(())
    }

    async fn find_running_before(&self, before: DateTime<Utc>) -> SchedulerResult<Vec<JobLog>> {
        let mut logs: Vec<JobLog> = self
            .logs
            .read()
            .values()
            .filter(|log| {
                log.trigger_code == scheduler_core::models::SUCCESS_CODE
                    && log.handle_code == 0
                    && log.trigger_time <= before
            })
            .cloned()
            .collect();
        logs.sort_by_key(|log| log.id);
        Ok(logs)
    }
}

/// 内存注册表
#[derive(Debug)]
pub struct InMemoryJobRegistryRepository {
    entries: RwLock<Vec<RegistryEntry>>,
    next_id: AtomicI64,
}

impl Default for InMemoryJobRegistryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobRegistryRepository {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn get_all(&self) -> Vec<RegistryEntry> {
        self.entries.read().clone()
    }
}

fn same_registry(entry: &RegistryEntry, param: &RegistryParam) -> bool {
    entry.registry_group == param.registry_group
        && entry.registry_key == param.registry_key
        && entry.registry_value == param.registry_value
}

#[async_trait]
impl JobRegistryRepository for InMemoryJobRegistryRepository {
    async fn save_or_update(
        &self,
        param: &RegistryParam,
        now: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.iter_mut().find(|e| same_registry(e, param)) {
            entry.running_count = param.running_count;
            entry.thread_capacity = param.thread_capacity;
            entry.update_time = now;
            return Ok(());
        }

        entries.push(RegistryEntry {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            registry_group: param.registry_group.clone(),
            registry_key: param.registry_key.clone(),
            registry_value: param.registry_value.clone(),
            running_count: param.running_count,
            thread_capacity: param.thread_capacity,
            update_time: now,
        });
        Ok(())
    }

    async fn delete(&self, param: &RegistryParam) -> SchedulerResult<()> {
        self.entries.write().retain(|e| !same_registry(e, param));
        Ok(())
    }

    async fn remove_dead(&self, dead_before: DateTime<Utc>) -> SchedulerResult<u64> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.update_time >= dead_before);
        Ok((before - entries.len()) as u64)
    }

    async fn find_all_alive(
        &self,
        alive_after: DateTime<Utc>,
    ) -> SchedulerResult<Vec<RegistryEntry>> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|e| e.update_time > alive_after)
            .cloned()
            .collect())
    }
}

/// 内存作业-地址映射
#[derive(Debug, Default)]
pub struct InMemoryJobExecutorMappingRepository {
    mappings: RwLock<HashMap<i64, String>>,
}

impl InMemoryJobExecutorMappingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobExecutorMappingRepository for InMemoryJobExecutorMappingRepository {
    async fn record(&self, job_id: i64, address: &str) -> SchedulerResult<()> {
        self.mappings.write().insert(job_id, address.to_string());
        Ok(())
    }

    async fn find(&self, job_id: i64) -> SchedulerResult<Option<String>> {
        Ok(self.mappings.read().get(&job_id).cloned())
    }
}

/// 进程内调度锁
#[derive(Debug, Clone, Default)]
pub struct InMemoryScheduleLock {
    inner: Arc<Mutex<()>>,
}

impl InMemoryScheduleLock {
    pub fn new() -> Self {
        Self::default()
    }
}

struct InMemoryScheduleLockGuard {
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl ScheduleLock for InMemoryScheduleLock {
    async fn acquire(&self) -> SchedulerResult<Box<dyn ScheduleLockGuard>> {
        let guard = Arc::clone(&self.inner).lock_owned().await;
        Ok(Box::new(InMemoryScheduleLockGuard { _guard: guard }))
    }
}

#[async_trait]
impl ScheduleLockGuard for InMemoryScheduleLockGuard {
    async fn release(self: Box<Self>) -> SchedulerResult<()> {
        drop(self);
        Ok(())
    }
}

/// 一组共享的内存仓储
#[derive(Clone, Default)]
pub struct InMemoryStore {
    pub jobs: Arc<InMemoryJobInfoRepository>,
    pub groups: Arc<InMemoryJobGroupRepository>,
    pub logs: Arc<InMemoryJobLogRepository>,
    pub registry: Arc<InMemoryJobRegistryRepository>,
    pub mappings: Arc<InMemoryJobExecutorMappingRepository>,
    pub lock: Arc<InMemoryScheduleLock>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(InMemoryJobInfoRepository::new()),
            groups: Arc::new(InMemoryJobGroupRepository::new()),
            logs: Arc::new(InMemoryJobLogRepository::new()),
            registry: Arc::new(InMemoryJobRegistryRepository::new()),
            mappings: Arc::new(InMemoryJobExecutorMappingRepository::new()),
            lock: Arc::new(InMemoryScheduleLock::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_core::models::{ScheduleType, TriggerStatus, SUCCESS_CODE};

    #[tokio::test]
    async fn test_schedule_job_query_filters_and_orders() {
        let repo = InMemoryJobInfoRepository::new();
        for (next, status) in [
            (3000, TriggerStatus::Running),
            (1000, TriggerStatus::Running),
            (2000, TriggerStatus::Stopped),
            (9000, TriggerStatus::Running),
        ] {
            let mut job = JobInfo::new(1, ScheduleType::FixedRate, "5", "demo");
            job.trigger_status = status;
            job.trigger_next_time = next;
            repo.create(&job).await.unwrap();
        }

        let due = repo.schedule_job_query(5000, 10).await.unwrap();
        let times: Vec<i64> = due.iter().map(|j| j.trigger_next_time).collect();
        assert_eq!(times, vec![1000, 3000]);

        let limited = repo.schedule_job_query(10_000, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].trigger_next_time, 1000);
    }

    #[tokio::test]
    async fn test_schedule_update_only_touches_trigger_fields() {
        let repo = InMemoryJobInfoRepository::new();
        let job = repo
            .create(&JobInfo::new(1, ScheduleType::FixedRate, "5", "demo"))
            .await
            .unwrap();

        let mut stale = job.clone();
        stale.executor_handler = "stale".to_string();
        stale.trigger_status = TriggerStatus::Running;
        stale.trigger_next_time = 42;
        repo.schedule_update(&[stale]).await.unwrap();

        let stored = repo.load_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.executor_handler, "demo");
        assert_eq!(stored.trigger_next_time, 42);
        assert!(stored.is_running());
    }

    #[tokio::test]
    async fn test_update_handle_info_only_once() {
        let repo = InMemoryJobLogRepository::new();
        let id = repo.create(&JobLog::new(1, 1, Utc::now())).await.unwrap();

        let mut log = repo.load_by_id(id).await.unwrap().unwrap();
        log.handle_code = SUCCESS_CODE;
        log.handle_msg = Some("first".to_string());
        assert!(repo.update_handle_info(&log).await.unwrap());

        log.handle_msg = Some("second".to_string());
        assert!(!repo.update_handle_info(&log).await.unwrap());

        let stored = repo.load_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.handle_msg.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_registry_upsert_and_eviction() {
        let repo = InMemoryJobRegistryRepository::new();
        let now = Utc::now();
        let param = RegistryParam::executor("app", "http://127.0.0.1:9999");

        repo.save_or_update(&param, now - chrono::Duration::seconds(120))
            .await
            .unwrap();
        repo.save_or_update(&param.clone().with_occupancy(1, 2), now)
            .await
            .unwrap();
        assert_eq!(repo.get_all().len(), 1);
        assert_eq!(repo.get_all()[0].running_count, 1);

        let stale = RegistryParam::executor("app", "http://127.0.0.1:9998");
        repo.save_or_update(&stale, now - chrono::Duration::seconds(120))
            .await
            .unwrap();

        let removed = repo
            .remove_dead(now - chrono::Duration::seconds(90))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        let alive = repo
            .find_all_alive(now - chrono::Duration::seconds(90))
            .await
            .unwrap();
        assert_eq!(alive.len(), 1);
        assert_eq!(alive[0].registry_value, "http://127.0.0.1:9999");
    }

    #[tokio::test]
    async fn test_schedule_lock_is_exclusive() {
        let lock = InMemoryScheduleLock::new();
        let guard = lock.acquire().await.unwrap();

        let second = tokio::time::timeout(std::time::Duration::from_millis(50), lock.acquire()).await;
        assert!(second.is_err());

        guard.release().await.unwrap();
        let third = tokio::time::timeout(std::time::Duration::from_millis(50), lock.acquire()).await;
        assert!(third.is_ok());
    }
}
