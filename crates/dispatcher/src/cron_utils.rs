use chrono::{DateTime, TimeZone, Utc};
use cron::Schedule;
use std::str::FromStr;

use scheduler_core::models::{JobInfo, ScheduleType};
use scheduler_core::{SchedulerError, SchedulerResult};

/// CRON表达式解析和调度工具
pub struct CronScheduler {
    schedule: Schedule,
}

impl CronScheduler {
    /// 创建新的CRON调度器
    pub fn new(cron_expr: &str) -> SchedulerResult<Self> {
        let schedule = Schedule::from_str(cron_expr).map_err(|e| SchedulerError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self { schedule })
    }

    /// 获取严格晚于 `from` 的下一次执行时间
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&from).take(count).collect()
    }

    /// 验证CRON表达式是否有效
    pub fn validate_cron_expression(cron_expr: &str) -> SchedulerResult<()> {
        Self::new(cron_expr).map(|_| ())
    }
}

/// PERIOD调度的时间单位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodUnit {
    Minute,
    Hour,
    Day,
    /// 固定按7天计
    Week,
    /// 固定按30天计
    Month,
}

impl PeriodUnit {
    pub fn millis(&self) -> i64 {
        const MINUTE: i64 = 60 * 1000;
        match self {
            PeriodUnit::Minute => MINUTE,
            PeriodUnit::Hour => 60 * MINUTE,
            PeriodUnit::Day => 24 * 60 * MINUTE,
            PeriodUnit::Week => 7 * 24 * 60 * MINUTE,
            PeriodUnit::Month => 30 * 24 * 60 * MINUTE,
        }
    }
}

impl FromStr for PeriodUnit {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MINUTE" => Ok(PeriodUnit::Minute),
            "HOUR" => Ok(PeriodUnit::Hour),
            "DAY" => Ok(PeriodUnit::Day),
            "WEEK" => Ok(PeriodUnit::Week),
            "MONTH" => Ok(PeriodUnit::Month),
            other => Err(SchedulerError::InvalidSchedule(format!(
                "未知的周期单位: {other}"
            ))),
        }
    }
}

/// 解析后的调度配置
pub enum JobSchedule {
    None,
    Cron(CronScheduler),
    FixedRate { interval_ms: i64 },
    Period { interval_ms: i64, deadline: Option<i64> },
}

impl JobSchedule {
    /// 解析作业的调度类型与表达式，非法配置返回配置类错误
    pub fn from_job(job: &JobInfo) -> SchedulerResult<Self> {
        let conf = job.schedule_conf.trim();
        match job.schedule_type {
            ScheduleType::None => Ok(JobSchedule::None),
            ScheduleType::Cron => Ok(JobSchedule::Cron(CronScheduler::new(conf)?)),
            ScheduleType::FixedRate => {
                let seconds: i64 = conf.parse().map_err(|_| {
                    SchedulerError::InvalidSchedule(format!("固定频率必须是正整数秒: {conf}"))
                })?;
                if seconds <= 0 {
                    return Err(SchedulerError::InvalidSchedule(format!(
                        "固定频率必须是正整数秒: {conf}"
                    )));
                }
                let interval_ms = seconds.checked_mul(1000).ok_or_else(|| {
                    SchedulerError::InvalidSchedule(format!("固定频率超出范围: {conf}"))
                })?;
                Ok(JobSchedule::FixedRate { interval_ms })
            }
            ScheduleType::Period => {
                let mut parts = conf.split_whitespace();
                let (amount, unit) = match (parts.next(), parts.next(), parts.next()) {
                    (Some(amount), Some(unit), None) => (amount, unit),
                    _ => {
                        return Err(SchedulerError::InvalidSchedule(format!(
                            "周期格式应为 \"<数量> <单位>\": {conf}"
                        )))
                    }
                };
                let amount: i64 = amount.parse().map_err(|_| {
                    SchedulerError::InvalidSchedule(format!("周期数量必须是正整数: {amount}"))
                })?;
                if amount <= 0 {
                    return Err(SchedulerError::InvalidSchedule(format!(
                        "周期数量必须是正整数: {amount}"
                    )));
                }
                let unit: PeriodUnit = unit.parse()?;
                let interval_ms = amount.checked_mul(unit.millis()).ok_or_else(|| {
                    SchedulerError::InvalidSchedule(format!("周期超出范围: {conf}"))
                })?;
                Ok(JobSchedule::Period {
                    interval_ms,
                    deadline: job.schedule_deadline,
                })
            }
        }
    }

    /// 计算严格晚于 `from_ms` 的下一次触发时间（毫秒）
    ///
    /// 只依赖调度配置与 `from_ms`，同样的输入总是得到同样的结果。
    /// 返回 `None` 表示不再有后续触发。
    pub fn next_after(&self, from_ms: i64) -> Option<i64> {
        match self {
            JobSchedule::None => None,
            JobSchedule::Cron(cron) => {
                let from = Utc.timestamp_millis_opt(from_ms).single()?;
                cron.next_execution_time(from)
                    .map(|next| next.timestamp_millis())
            }
            JobSchedule::FixedRate { interval_ms } => from_ms.checked_add(*interval_ms),
            JobSchedule::Period {
                interval_ms,
                deadline,
            } => {
                let next = from_ms.checked_add(*interval_ms)?;
                match deadline {
                    Some(deadline) if next >= *deadline => None,
                    _ => Some(next),
                }
            }
        }
    }
}

/// 按作业配置计算下一次触发时间
pub fn generate_next_valid_time(job: &JobInfo, from_ms: i64) -> SchedulerResult<Option<i64>> {
    Ok(JobSchedule::from_job(job)?.next_after(from_ms))
}

/// 校验作业的调度配置
pub fn validate_schedule(job: &JobInfo) -> SchedulerResult<()> {
    JobSchedule::from_job(job).map(|_| ())
}
