//! # 作业处理器
//!
//! 执行器上的业务入口。BEAN模式按名称在 [`HandlerRegistry`] 中查找，
//! 脚本模式由调度参数中的源码临时构建。
//!
//! 处理器在作业线程内部的独立任务中执行，通过 [`JobContext`] 获得本次触发的参数、
//! 分片信息、日志写入器以及取消信号。

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use scheduler_core::models::{TriggerParam, FAIL_CODE, SUCCESS_CODE, TIMEOUT_CODE};
use scheduler_core::SchedulerResult;

use crate::job_logger::JobLogAppender;

/// 一次执行的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleResult {
    pub code: i32,
    pub msg: Option<String>,
}

impl HandleResult {
    pub fn success() -> Self {
        Self {
            code: SUCCESS_CODE,
            msg: None,
        }
    }

    pub fn success_with(msg: impl Into<String>) -> Self {
        Self {
            code: SUCCESS_CODE,
            msg: Some(msg.into()),
        }
    }

    pub fn fail(msg: impl Into<String>) -> Self {
        Self {
            code: FAIL_CODE,
            msg: Some(msg.into()),
        }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self {
            code: TIMEOUT_CODE,
            msg: Some(msg.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}

/// 单次执行的上下文
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: i64,
    pub log_id: i64,
    pub job_param: String,
    pub shard_index: u32,
    pub shard_total: u32,
    logger: JobLogAppender,
    cancel: CancellationToken,
}

impl JobContext {
    pub fn new(param: &TriggerParam, logger: JobLogAppender, cancel: CancellationToken) -> Self {
        Self {
            job_id: param.job_id,
            log_id: param.log_id,
            job_param: param.executor_params.clone(),
            shard_index: param.broadcast_index,
            shard_total: param.broadcast_total,
            logger,
            cancel,
        }
    }

    /// 追加一行到本次执行的日志文件
    pub fn log(&self, message: impl AsRef<str>) {
        self.logger.append(message.as_ref());
    }

    pub fn logger(&self) -> &JobLogAppender {
        &self.logger
    }

    /// 作业被终止或超时后置位，处理器应尽快返回
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// 作业处理器
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// 作业线程启动时调用一次
    async fn init(&self) -> SchedulerResult<()> {
        Ok(())
    }

    async fn execute(&self, ctx: JobContext) -> HandleResult;

    /// 作业线程退出时调用一次
    async fn destroy(&self) -> SchedulerResult<()> {
        Ok(())
    }
}

/// 以闭包实现的处理器
pub struct FnHandler<F> {
    func: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync,
    Fut: Future<Output = HandleResult> + Send,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync,
    Fut: Future<Output = HandleResult> + Send,
{
    async fn execute(&self, ctx: JobContext) -> HandleResult {
        (self.func)(ctx).await
    }
}

/// 按名称注册的BEAN处理器
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器，同名处理器会被替换
    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let name = name.into();
        tracing::info!("注册作业处理器: {}", name);
        self.handlers.insert(name, handler);
    }

    /// 以闭包注册处理器
    pub fn register_fn<F, Fut>(&self, name: impl Into<String>, func: F)
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandleResult> + Send + 'static,
    {
        self.register(name, Arc::new(FnHandler::new(func)));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
