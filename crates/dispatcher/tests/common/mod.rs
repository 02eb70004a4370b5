#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use scheduler_core::config::AdminConfig;
use scheduler_core::models::{
    ExecutorStatus, IdleBeatParam, JobGroup, JobInfo, KillParam, LogParam, LogResult, ReturnT,
    ScheduleType, TriggerParam,
};
use scheduler_core::traits::{ExecutorBiz, JobGroupRepository, JobInfoRepository};
use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_dispatcher::{ExecutorClientProvider, TriggerRequest, TriggerSubmitter};
use scheduler_infrastructure::InMemoryStore;

/// 记录所有调用的执行器替身
#[derive(Default)]
pub struct FakeExecutor {
    pub beat_ok: bool,
    pub idle: bool,
    pub status: Option<ExecutorStatus>,
    pub run_result: Option<ReturnT<String>>,
    pub panic_on_run: bool,
    pub runs: Mutex<Vec<TriggerParam>>,
    pub kills: Mutex<Vec<i64>>,
}

impl FakeExecutor {
    pub fn healthy() -> Self {
        Self {
            beat_ok: true,
            idle: true,
            status: Some(ExecutorStatus {
                thread_capacity: 2,
                running_count: 0,
                pending_count: 0,
            }),
            ..Default::default()
        }
    }

    pub fn down() -> Self {
        Self::default()
    }

    pub fn with_status(capacity: u32, running: u32, pending: u32) -> Self {
        Self {
            status: Some(ExecutorStatus {
                thread_capacity: capacity,
                running_count: running,
                pending_count: pending,
            }),
            ..Self::healthy()
        }
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().len()
    }
}

fn verdict(ok: bool) -> ReturnT<String> {
    if ok {
        ReturnT::success()
    } else {
        ReturnT::fail("unavailable")
    }
}

#[async_trait]
impl ExecutorBiz for FakeExecutor {
    async fn beat(&self) -> ReturnT<String> {
        verdict(self.beat_ok)
    }

    async fn idle_beat(&self, _param: IdleBeatParam) -> ReturnT<String> {
        verdict(self.idle)
    }

    async fn run(&self, param: TriggerParam) -> ReturnT<String> {
        if self.panic_on_run {
            panic!("executor crashed on job {}", param.job_id);
        }
        self.runs.lock().push(param);
        self.run_result.clone().unwrap_or_else(ReturnT::success)
    }

    async fn kill(&self, param: KillParam) -> ReturnT<String> {
        self.kills.lock().push(param.job_id);
        ReturnT::success()
    }

    async fn log(&self, param: LogParam) -> ReturnT<LogResult> {
        ReturnT::success_with(LogResult {
            from_line_num: param.from_line_num,
            to_line_num: param.from_line_num,
            log_content: String::new(),
            is_end: true,
        })
    }

    async fn status(&self) -> ReturnT<ExecutorStatus> {
        match self.status {
            Some(status) => ReturnT::success_with(status),
            None => ReturnT::fail("unavailable"),
        }
    }

    async fn force_kill(&self, param: KillParam) -> ReturnT<String> {
        self.kill(param).await
    }
}

/// 按地址返回执行器替身
#[derive(Default)]
pub struct FakeExecutors {
    executors: Mutex<HashMap<String, Arc<FakeExecutor>>>,
}

impl FakeExecutors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, address: &str, executor: FakeExecutor) -> Arc<FakeExecutor> {
        let executor = Arc::new(executor);
        self.executors
            .lock()
            .insert(address.to_string(), Arc::clone(&executor));
        executor
    }
}

impl ExecutorClientProvider for FakeExecutors {
    fn executor(&self, address: &str) -> SchedulerResult<Arc<dyn ExecutorBiz>> {
        match self.executors.lock().get(address) {
            Some(executor) => Ok(executor.clone()),
            None => Err(SchedulerError::Network(format!("connection refused: {address}"))),
        }
    }
}

/// 只记录提交内容的触发入口
#[derive(Default)]
pub struct RecordingSubmitter {
    pub requests: Mutex<Vec<TriggerRequest>>,
}

impl RecordingSubmitter {
    pub fn taken(&self) -> Vec<TriggerRequest> {
        std::mem::take(&mut *self.requests.lock())
    }
}

impl TriggerSubmitter for RecordingSubmitter {
    fn submit(&self, request: TriggerRequest) {
        self.requests.lock().push(request);
    }
}

pub fn test_config() -> AdminConfig {
    AdminConfig {
        trigger_pool_fast_max: 10,
        trigger_pool_slow_max: 10,
        ring_drain_wait_ms: 2000,
        ..AdminConfig::default()
    }
}

pub async fn create_group(store: &InMemoryStore, app_name: &str, addresses: &[&str]) -> JobGroup {
    let mut group = JobGroup::new(app_name, app_name);
    if !addresses.is_empty() {
        group.address_list = Some(addresses.join(","));
    }
    store.groups.create(&group).await.unwrap()
}

pub async fn create_job(store: &InMemoryStore, group_id: i64, configure: impl FnOnce(&mut JobInfo)) -> JobInfo {
    let mut job = JobInfo::new(group_id, ScheduleType::FixedRate, "5", "demoJobHandler");
    configure(&mut job);
    store.jobs.create(&job).await.unwrap()
}
