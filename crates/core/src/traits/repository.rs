//! # 仓储接口
//!
//! 调度核心所依赖的持久化抽象。作业定义由管理端维护，调度核心只读取作业、
//! 回写调度时间；调度日志在触发时追加、在回调时更新；注册表只保存心跳时间戳。
//!
//! 所有实现都必须是 `Send + Sync`，调度器、触发池与回调处理会在多个任务中并发调用。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{AddressType, JobGroup, JobInfo, JobLog, RegistryEntry, RegistryParam};
use crate::SchedulerResult;

/// 作业定义仓储
#[async_trait]
pub trait JobInfoRepository: Send + Sync {
    /// 创建作业，返回带有生成ID的作业
    async fn create(&self, job: &JobInfo) -> SchedulerResult<JobInfo>;

    /// 整体更新作业定义
    async fn update(&self, job: &JobInfo) -> SchedulerResult<()>;

    async fn load_by_id(&self, id: i64) -> SchedulerResult<Option<JobInfo>>;

    async fn delete(&self, id: i64) -> SchedulerResult<()>;

    /// 预读即将到期的作业
    ///
    /// 返回调度中且 `trigger_next_time <= max_next_time` 的作业，按下次触发时间升序，
    /// 最多 `limit` 条。
    async fn schedule_job_query(
        &self,
        max_next_time: i64,
        limit: usize,
    ) -> SchedulerResult<Vec<JobInfo>>;

    /// 批量回写调度状态与触发时间
    ///
    /// 只更新 `trigger_status`、`trigger_last_time`、`trigger_next_time` 三个字段，
    /// 不覆盖管理端在本轮调度期间对其他字段的修改。
    async fn schedule_update(&self, jobs: &[JobInfo]) -> SchedulerResult<()>;
}

/// 执行器分组仓储
#[async_trait]
pub trait JobGroupRepository: Send + Sync {
    async fn create(&self, group: &JobGroup) -> SchedulerResult<JobGroup>;

    async fn load_by_id(&self, id: i64) -> SchedulerResult<Option<JobGroup>>;

    async fn find_by_address_type(&self, address_type: AddressType)
        -> SchedulerResult<Vec<JobGroup>>;

    async fn update(&self, group: &JobGroup) -> SchedulerResult<()>;
}

/// 调度日志仓储
#[async_trait]
pub trait JobLogRepository: Send + Sync {
    /// 插入日志骨架，返回日志ID
    async fn create(&self, log: &JobLog) -> SchedulerResult<i64>;

    async fn load_by_id(&self, id: i64) -> SchedulerResult<Option<JobLog>>;

    /// 写入触发相关字段（地址、参数、触发结果）
    async fn update_trigger_info(&self, log: &JobLog) -> SchedulerResult<()>;

    /// 写入执行结果字段
    ///
    /// 仅当日志仍处于未终结状态（`handle_code == 0`）时生效，返回是否实际更新，
    /// 以保证同一日志只会被终结一次。
    async fn update_handle_info(&self, log: &JobLog) -> SchedulerResult<bool>;

    /// 覆盖已终结日志的执行结果消息，用于追加子作业触发记录
    async fn update_handle_msg(&self, log_id: i64, handle_msg: &str) -> SchedulerResult<()>;

    /// 查询触发成功但结果未回传、且触发时间不晚于 `before` 的日志
    async fn find_running_before(&self, before: DateTime<Utc>) -> SchedulerResult<Vec<JobLog>>;
}

/// 执行器注册表仓储
#[async_trait]
pub trait JobRegistryRepository: Send + Sync {
    /// 按 (group, key, value) 更新心跳时间与占用情况，不存在则插入
    async fn save_or_update(&self, param: &RegistryParam, now: DateTime<Utc>)
        -> SchedulerResult<()>;

    async fn delete(&self, param: &RegistryParam) -> SchedulerResult<()>;

    /// 删除 `update_time` 早于 `dead_before` 的记录，返回删除条数
    async fn remove_dead(&self, dead_before: DateTime<Utc>) -> SchedulerResult<u64>;

    /// `update_time` 晚于 `alive_after` 的全部记录
    async fn find_all_alive(&self, alive_after: DateTime<Utc>)
        -> SchedulerResult<Vec<RegistryEntry>>;
}

/// 作业与最近一次选中地址的映射，仅用于观测
#[async_trait]
pub trait JobExecutorMappingRepository: Send + Sync {
    async fn record(&self, job_id: i64, address: &str) -> SchedulerResult<()>;

    async fn find(&self, job_id: i64) -> SchedulerResult<Option<String>>;
}

/// 全局调度锁
///
/// 多个调度中心实例之间唯一的互斥手段。持有锁期间完成一轮预读与回写。
#[async_trait]
pub trait ScheduleLock: Send + Sync {
    async fn acquire(&self) -> SchedulerResult<Box<dyn ScheduleLockGuard>>;
}

/// 已获取的调度锁，显式释放
#[async_trait]
pub trait ScheduleLockGuard: Send {
    async fn release(self: Box<Self>) -> SchedulerResult<()>;
}
