use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use scheduler_core::current_millis;
use scheduler_core::models::{
    JobInfo, KillParam, ReturnT, ScheduleType, TriggerStatus, TriggerType, FAIL_CODE, SUCCESS_CODE,
};
use scheduler_core::traits::{JobGroupRepository, JobInfoRepository, JobLogRepository};
use scheduler_core::{SchedulerError, SchedulerResult};

use crate::completer::JobCompleter;
use crate::cron_utils::{generate_next_valid_time, validate_schedule};
use crate::executor_client::ExecutorClientProvider;
use crate::job_trigger::TriggerRequest;
use crate::trigger_pool::TriggerSubmitter;

/// 作业管理
///
/// 作业的增删改、启停、手动触发，以及终止某次运行。
/// 配置类错误在这里同步拒绝，不会进入调度循环。
pub struct JobController {
    job_repo: Arc<dyn JobInfoRepository>,
    group_repo: Arc<dyn JobGroupRepository>,
    log_repo: Arc<dyn JobLogRepository>,
    submitter: Arc<dyn TriggerSubmitter>,
    clients: Arc<dyn ExecutorClientProvider>,
    completer: Arc<JobCompleter>,
}

impl JobController {
    pub fn new(
        job_repo: Arc<dyn JobInfoRepository>,
        group_repo: Arc<dyn JobGroupRepository>,
        log_repo: Arc<dyn JobLogRepository>,
        submitter: Arc<dyn TriggerSubmitter>,
        clients: Arc<dyn ExecutorClientProvider>,
        completer: Arc<JobCompleter>,
    ) -> Self {
        Self {
            job_repo,
            group_repo,
            log_repo,
            submitter,
            clients,
            completer,
        }
    }

    /// 校验作业配置
    pub async fn validate(&self, job: &JobInfo) -> SchedulerResult<()> {
        if job.schedule_type != ScheduleType::None {
            validate_schedule(job)?;
        }

        if job.executor_timeout < 0 {
            return Err(SchedulerError::InvalidArgument("任务超时时间不能小于0".to_string()));
        }
        if job.executor_fail_retry_count < 0 {
            return Err(SchedulerError::InvalidArgument("失败重试次数不能小于0".to_string()));
        }

        if job.glue_type.is_script() {
            if job.glue_source.trim().is_empty() {
                return Err(SchedulerError::InvalidArgument("脚本源码不能为空".to_string()));
            }
        } else if job.executor_handler.trim().is_empty() {
            return Err(SchedulerError::InvalidArgument("JobHandler不能为空".to_string()));
        }

        if self.group_repo.load_by_id(job.job_group).await?.is_none() {
            return Err(SchedulerError::JobGroupNotFound { id: job.job_group });
        }

        for child_id in &job.child_job_ids {
            if *child_id <= 0 || (job.id > 0 && *child_id == job.id) {
                return Err(SchedulerError::InvalidArgument(format!(
                    "子任务ID无效: {child_id}"
                )));
            }
            if self.job_repo.load_by_id(*child_id).await?.is_none() {
                return Err(SchedulerError::InvalidArgument(format!(
                    "子任务不存在: {child_id}"
                )));
            }
        }

        Ok(())
    }

    fn next_time_from_now(job: &JobInfo) -> SchedulerResult<i64> {
        generate_next_valid_time(job, current_millis())?.ok_or_else(|| {
            SchedulerError::InvalidSchedule(format!(
                "调度配置没有后续触发时间: {} {}",
                job.schedule_type, job.schedule_conf
            ))
        })
    }

    pub async fn add(&self, mut job: JobInfo) -> SchedulerResult<JobInfo> {
        self.validate(&job).await?;

        if job.is_running() {
            if job.schedule_type == ScheduleType::None {
                job.stop_schedule();
            } else {
                job.trigger_last_time = 0;
                job.trigger_next_time = Self::next_time_from_now(&job)?;
            }
        } else {
            job.stop_schedule();
        }

        let created = self.job_repo.create(&job).await?;
        info!("新增作业: job_id={}, schedule={} {}", created.id, created.schedule_type, created.schedule_conf);
        Ok(created)
    }

    pub async fn update(&self, mut job: JobInfo) -> SchedulerResult<()> {
        self.validate(&job).await?;

        let existing = self
            .job_repo
            .load_by_id(job.id)
            .await?
            .ok_or(SchedulerError::JobNotFound { id: job.id })?;

        job.trigger_status = existing.trigger_status;
        job.trigger_last_time = existing.trigger_last_time;
        job.trigger_next_time = existing.trigger_next_time;

        let schedule_changed = existing.schedule_type != job.schedule_type
            || existing.schedule_conf != job.schedule_conf
            || existing.schedule_deadline != job.schedule_deadline;
        if job.is_running() && schedule_changed {
            if job.schedule_type == ScheduleType::None {
                job.stop_schedule();
            } else {
                job.trigger_last_time = 0;
                job.trigger_next_time = Self::next_time_from_now(&job)?;
            }
        }

        self.job_repo.update(&job).await?;
        info!("更新作业: job_id={}", job.id);
        Ok(())
    }

    pub async fn remove(&self, job_id: i64) -> SchedulerResult<()> {
        self.job_repo.delete(job_id).await?;
        info!("删除作业: job_id={}", job_id);
        Ok(())
    }

    /// 启动调度，下次触发时间从当前时刻算起
    pub async fn start(&self, job_id: i64) -> SchedulerResult<JobInfo> {
        let mut job = self
            .job_repo
            .load_by_id(job_id)
            .await?
            .ok_or(SchedulerError::JobNotFound { id: job_id })?;

        if job.schedule_type == ScheduleType::None {
            return Err(SchedulerError::InvalidSchedule(
                "调度类型为NONE的作业不能启动".to_string(),
            ));
        }

        job.trigger_next_time = Self::next_time_from_now(&job)?;
        job.trigger_status = TriggerStatus::Running;
        job.trigger_last_time = 0;
        self.job_repo.update(&job).await?;

        info!("启动作业: job_id={}, next={}", job.id, job.trigger_next_time);
        Ok(job)
    }

    pub async fn stop(&self, job_id: i64) -> SchedulerResult<()> {
        let mut job = self
            .job_repo
            .load_by_id(job_id)
            .await?
            .ok_or(SchedulerError::JobNotFound { id: job_id })?;

        job.stop_schedule();
        self.job_repo.update(&job).await?;
        info!("停止作业: job_id={}", job_id);
        Ok(())
    }

    /// 手动触发一次，可覆盖执行参数与地址列表
    pub async fn trigger(
        &self,
        job_id: i64,
        executor_param: Option<String>,
        address_list: Option<String>,
    ) -> SchedulerResult<()> {
        if self.job_repo.load_by_id(job_id).await?.is_none() {
            return Err(SchedulerError::JobNotFound { id: job_id });
        }

        self.submitter.submit(
            TriggerRequest::new(job_id, TriggerType::Manual)
                .with_executor_param(executor_param)
                .with_address_list(address_list),
        );
        Ok(())
    }

    /// 终止某次运行：通知执行器停止作业线程，并把日志标记为失败
    pub async fn kill_log(&self, log_id: i64) -> SchedulerResult<ReturnT<String>> {
        let mut log = self
            .log_repo
            .load_by_id(log_id)
            .await?
            .ok_or(SchedulerError::JobLogNotFound { id: log_id })?;

        if log.trigger_code != SUCCESS_CODE {
            return Ok(ReturnT::fail("调度失败，无法终止日志"));
        }
        let Some(address) = log.executor_address.clone() else {
            return Ok(ReturnT::fail("执行器地址为空"));
        };

        let result = self
            .clients
            .executor(&address)?
            .kill(KillParam { job_id: log.job_id })
            .await;

        if result.is_success() {
            log.handle_time = Some(Utc::now());
            log.handle_code = FAIL_CODE;
            log.handle_msg = Some(format!("人为操作，主动终止:{}", result.msg_or_empty()));
            self.completer.complete(log).await?;
        } else {
            warn!("终止作业失败: log_id={}, msg={}", log_id, result.msg_or_empty());
        }

        Ok(result)
    }
}
