use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use scheduler_core::models::{
    BlockStrategy, ExecutorStatus, GlueType, IdleBeatParam, KillParam, LogParam, LogResult,
    ReturnT, TriggerParam, SUCCESS_CODE,
};
use scheduler_core::traits::ExecutorBiz;

use crate::executors::ShellJobHandler;
use crate::handler::{HandlerRegistry, JobHandler};
use crate::job_thread::{JobThread, JobThreadFactory, PushError};
use crate::job_thread_registry::JobThreadRegistry;

pub const CHANGE_HANDLER_REASON: &str =
    "change jobhandler or glue type, and terminate the old job thread.";
pub const DISCARD_LATER_MSG: &str = "block strategy effect：Discard Later";
pub const COVER_EARLY_REASON: &str = "block strategy effect：Cover Early";
pub const KILL_REASON: &str = "scheduling center kill job.";
pub const FORCE_KILL_REASON: &str = "scheduling center force kill job.";
pub const ALREADY_KILLED_MSG: &str = "job thread already killed.";
pub const BUSY_MSG: &str = "job thread is running or has trigger queue.";

/// 执行器对调度中心暴露的服务
pub struct ExecutorBizImpl {
    handlers: Arc<HandlerRegistry>,
    threads: Arc<JobThreadRegistry>,
    factory: JobThreadFactory,
    script_dir: PathBuf,
    thread_capacity: u32,
}

impl ExecutorBizImpl {
    pub fn new(
        handlers: Arc<HandlerRegistry>,
        threads: Arc<JobThreadRegistry>,
        factory: JobThreadFactory,
        script_dir: impl Into<PathBuf>,
        thread_capacity: u32,
    ) -> Self {
        Self {
            handlers,
            threads,
            factory,
            script_dir: script_dir.into(),
            thread_capacity,
        }
    }

    pub fn threads(&self) -> &Arc<JobThreadRegistry> {
        &self.threads
    }

    fn spawn(&self, param: &TriggerParam, handler: Arc<dyn JobHandler>) -> Arc<JobThread> {
        self.factory
            .spawn(param.job_id, handler, param.glue_type, param.glue_updatetime)
    }

    /// 解析处理器；已有线程的处理器或脚本版本变化时返回替换原因
    fn resolve_handler(
        &self,
        param: &TriggerParam,
        existing: Option<&Arc<JobThread>>,
    ) -> Result<(Arc<dyn JobHandler>, bool), ReturnT<String>> {
        match param.glue_type {
            GlueType::Bean => {
                let handler = self.handlers.get(&param.executor_handler).ok_or_else(|| {
                    ReturnT::fail(format!(
                        "job handler [{}] not found.",
                        param.executor_handler
                    ))
                })?;
                let changed = existing.is_some_and(|thread| {
                    thread.glue_type() != GlueType::Bean || !Arc::ptr_eq(thread.handler(), &handler)
                });
                Ok((handler, changed))
            }
            GlueType::GlueShell => {
                if let Some(thread) = existing {
                    if thread.glue_type() == GlueType::GlueShell
                        && thread.glue_updatetime() == param.glue_updatetime
                    {
                        return Ok((Arc::clone(thread.handler()), false));
                    }
                }
                let handler: Arc<dyn JobHandler> = Arc::new(ShellJobHandler::new(
                    param.job_id,
                    param.glue_source.clone(),
                    param.glue_updatetime,
                    self.script_dir.clone(),
                ));
                Ok((handler, existing.is_some()))
            }
        }
    }

    fn push(&self, thread: Arc<JobThread>, param: TriggerParam, handler: &Arc<dyn JobHandler>) -> ReturnT<String> {
        let log_id = param.log_id;
        let mut thread = thread;
        // 线程可能恰好空闲关闭，换一个新线程重试
        for _ in 0..3 {
            match thread.push(param.clone()) {
                Ok(()) => {
                    debug!("触发已入队: job_id={}, log_id={}", param.job_id, log_id);
                    return ReturnT::success();
                }
                Err(PushError::Duplicate) => {
                    return ReturnT::fail(format!("repeate trigger job, logId:{log_id}"));
                }
                Err(PushError::QueueFull) => {
                    warn!("作业队列已满: job_id={}, log_id={}", param.job_id, log_id);
                    return ReturnT::fail(format!(
                        "job trigger queue is full, logId:{log_id}"
                    ));
                }
                Err(PushError::Closed) => {
                    thread = self.threads.get_or_register(param.job_id, || {
                        self.spawn(&param, Arc::clone(handler))
                    });
                }
            }
        }
        ReturnT::fail(format!("job thread unavailable, logId:{log_id}"))
    }
}

#[async_trait]
impl ExecutorBiz for ExecutorBizImpl {
    async fn beat(&self) -> ReturnT<String> {
        ReturnT::success()
    }

    async fn idle_beat(&self, param: IdleBeatParam) -> ReturnT<String> {
        match self.threads.get(param.job_id) {
            Some(thread) if thread.is_running_or_has_queue() => ReturnT::fail(BUSY_MSG),
            _ => ReturnT::success(),
        }
    }

    async fn run(&self, param: TriggerParam) -> ReturnT<String> {
        let existing = self.threads.get(param.job_id).filter(|thread| !thread.is_closed());

        let (handler, handler_changed) = match self.resolve_handler(&param, existing.as_ref()) {
            Ok(resolved) => resolved,
            Err(failure) => return failure,
        };

        let mut replace_reason = handler_changed.then_some(CHANGE_HANDLER_REASON);
        if let (Some(thread), None) = (&existing, replace_reason) {
            match param.executor_block_strategy {
                BlockStrategy::DiscardLater if thread.is_running_or_has_queue() => {
                    return ReturnT::fail(DISCARD_LATER_MSG);
                }
                BlockStrategy::CoverEarly if thread.is_running_or_has_queue() => {
                    replace_reason = Some(COVER_EARLY_REASON);
                }
                _ => {}
            }
        }

        let thread = match (existing, replace_reason) {
            (Some(thread), None) => thread,
            (_, Some(reason)) => {
                info!("替换作业线程: job_id={}, reason={}", param.job_id, reason);
                let thread = self.spawn(&param, Arc::clone(&handler));
                self.threads.replace(Arc::clone(&thread), reason);
                thread
            }
            (None, None) => self
                .threads
                .get_or_register(param.job_id, || self.spawn(&param, Arc::clone(&handler))),
        };

        self.push(thread, param, &handler)
    }

    async fn kill(&self, param: KillParam) -> ReturnT<String> {
        if self.threads.remove(param.job_id, KILL_REASON).is_some() {
            ReturnT::success()
        } else {
            ReturnT::with_code(SUCCESS_CODE, ALREADY_KILLED_MSG)
        }
    }

    async fn log(&self, param: LogParam) -> ReturnT<LogResult> {
        let mut result = self
            .factory
            .logger()
            .read(param.log_date_time, param.log_id, param.from_line_num)
            .await;
        if !result.is_end {
            result.is_end = !self
                .threads
                .threads()
                .iter()
                .any(|thread| thread.holds_log(param.log_id));
        }
        ReturnT::success_with(result)
    }

    async fn status(&self) -> ReturnT<ExecutorStatus> {
        ReturnT::success_with(self.threads.status(self.thread_capacity))
    }

    async fn force_kill(&self, param: KillParam) -> ReturnT<String> {
        match self.threads.remove(param.job_id, FORCE_KILL_REASON) {
            Some(thread) => {
                thread.force_stop(FORCE_KILL_REASON);
                ReturnT::success()
            }
            None => ReturnT::with_code(SUCCESS_CODE, ALREADY_KILLED_MSG),
        }
    }
}
