use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{SchedulerError, SchedulerResult};
use crate::models::{BlockStrategy, MisfireStrategy, RouteStrategy};

/// 作业定义
///
/// 由管理端维护的持久化作业。调度器只会修改 `trigger_status`、
/// `trigger_last_time` 和 `trigger_next_time` 三个字段。
///
/// # 字段说明
///
/// - `job_group`: 所属执行器分组ID
/// - `schedule_conf`: 调度表达式，含义取决于 `schedule_type`
/// - `schedule_deadline`: 仅对PERIOD生效的截止时间（毫秒）
/// - `executor_timeout`: 执行超时（秒），0表示不限制
/// - `child_job_ids`: 执行成功后需要触发的子作业
/// - `trigger_next_time`: 下次触发时间（毫秒），0表示已停止
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub id: i64,
    pub job_group: i64,
    pub job_desc: String,
    pub schedule_type: ScheduleType,
    pub schedule_conf: String,
    pub schedule_deadline: Option<i64>,
    pub misfire_strategy: MisfireStrategy,
    pub route_strategy: RouteStrategy,
    pub block_strategy: BlockStrategy,
    pub executor_handler: String,
    pub executor_param: String,
    pub executor_timeout: i32,
    pub executor_fail_retry_count: i32,
    pub glue_type: GlueType,
    pub glue_source: String,
    pub glue_updatetime: i64,
    pub child_job_ids: Vec<i64>,
    pub trigger_status: TriggerStatus,
    pub trigger_last_time: i64,
    pub trigger_next_time: i64,
}

impl JobInfo {
    /// 以BEAN模式创建作业，其余字段取默认值
    pub fn new(
        job_group: i64,
        schedule_type: ScheduleType,
        schedule_conf: impl Into<String>,
        executor_handler: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            job_group,
            job_desc: String::new(),
            schedule_type,
            schedule_conf: schedule_conf.into(),
            schedule_deadline: None,
            misfire_strategy: MisfireStrategy::DoNothing,
            route_strategy: RouteStrategy::First,
            block_strategy: BlockStrategy::SerialExecution,
            executor_handler: executor_handler.into(),
            executor_param: String::new(),
            executor_timeout: 0,
            executor_fail_retry_count: 0,
            glue_type: GlueType::Bean,
            glue_source: String::new(),
            glue_updatetime: 0,
            child_job_ids: Vec::new(),
            trigger_status: TriggerStatus::Stopped,
            trigger_last_time: 0,
            trigger_next_time: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.trigger_status == TriggerStatus::Running
    }

    /// 停止调度并清零触发时间
    pub fn stop_schedule(&mut self) {
        self.trigger_status = TriggerStatus::Stopped;
        self.trigger_last_time = 0;
        self.trigger_next_time = 0;
    }

    /// 子作业ID以逗号拼接，用于持久化
    pub fn child_job_ids_string(&self) -> String {
        self.child_job_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// 解析逗号分隔的子作业ID列表
    pub fn parse_child_job_ids(raw: &str) -> SchedulerResult<Vec<i64>> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<i64>().map_err(|_| {
                    SchedulerError::InvalidArgument(format!("子作业ID格式无效: {s}"))
                })
            })
            .collect()
    }
}

/// 调度状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerStatus {
    Stopped,
    Running,
}

impl TriggerStatus {
    pub fn as_i16(&self) -> i16 {
        match self {
            TriggerStatus::Stopped => 0,
            TriggerStatus::Running => 1,
        }
    }

    pub fn from_i16(value: i16) -> Self {
        if value == 1 {
            TriggerStatus::Running
        } else {
            TriggerStatus::Stopped
        }
    }
}

/// 调度类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleType {
    /// 不参与自动调度，只能手动触发
    None,
    Cron,
    FixedRate,
    Period,
}

impl ScheduleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleType::None => "NONE",
            ScheduleType::Cron => "CRON",
            ScheduleType::FixedRate => "FIXED_RATE",
            ScheduleType::Period => "PERIOD",
        }
    }
}

impl fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleType {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" => Ok(ScheduleType::None),
            "CRON" => Ok(ScheduleType::Cron),
            "FIXED_RATE" => Ok(ScheduleType::FixedRate),
            "PERIOD" => Ok(ScheduleType::Period),
            other => Err(SchedulerError::Configuration(format!(
                "未知的调度类型: {other}"
            ))),
        }
    }
}

/// 运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GlueType {
    /// 执行器内注册的具名处理器
    Bean,
    /// 以 `sh` 执行的脚本源码
    GlueShell,
}

impl GlueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlueType::Bean => "BEAN",
            GlueType::GlueShell => "GLUE_SHELL",
        }
    }

    pub fn is_script(&self) -> bool {
        matches!(self, GlueType::GlueShell)
    }
}

impl FromStr for GlueType {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BEAN" => Ok(GlueType::Bean),
            "GLUE_SHELL" => Ok(GlueType::GlueShell),
            other => Err(SchedulerError::Configuration(format!(
                "未知的运行模式: {other}"
            ))),
        }
    }
}

/// 地址类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AddressType {
    /// 地址列表由注册表自动汇总
    Auto,
    /// 地址列表由管理员手工维护
    Manual,
}

/// 执行器分组
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobGroup {
    pub id: i64,
    pub app_name: String,
    pub title: String,
    pub address_type: AddressType,
    /// 逗号分隔、已排序去重的地址列表
    pub address_list: Option<String>,
    pub update_time: DateTime<Utc>,
}

impl JobGroup {
    pub fn new(app_name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: 0,
            app_name: app_name.into(),
            title: title.into(),
            address_type: AddressType::Auto,
            address_list: None,
            update_time: Utc::now(),
        }
    }

    /// 当前可用于路由的地址
    pub fn registry_list(&self) -> Vec<String> {
        self.address_list
            .as_deref()
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}
