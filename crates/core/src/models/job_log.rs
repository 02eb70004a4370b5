use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 调度日志
///
/// 每次触发尝试写入一条。`handle_code == 0` 表示执行结果尚未回传，
/// 一旦写入非零结果码即视为已终结，后续重复回调将被忽略。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobLog {
    pub id: i64,
    pub job_group: i64,
    pub job_id: i64,

    pub executor_address: Option<String>,
    pub executor_handler: Option<String>,
    pub executor_param: Option<String>,
    pub executor_sharding_param: Option<String>,
    pub executor_fail_retry_count: i32,

    pub trigger_time: DateTime<Utc>,
    pub trigger_code: i32,
    pub trigger_msg: Option<String>,

    pub handle_time: Option<DateTime<Utc>>,
    pub handle_code: i32,
    pub handle_msg: Option<String>,
}

impl JobLog {
    /// 触发前先落库的日志骨架
    pub fn new(job_group: i64, job_id: i64, trigger_time: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            job_group,
            job_id,
            executor_address: None,
            executor_handler: None,
            executor_param: None,
            executor_sharding_param: None,
            executor_fail_retry_count: 0,
            trigger_time,
            trigger_code: 0,
            trigger_msg: None,
            handle_time: None,
            handle_code: 0,
            handle_msg: None,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.handle_code > 0
    }
}
