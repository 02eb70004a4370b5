//! # 作业线程
//!
//! 每个作业ID对应一个作业线程：一个有界FIFO队列加一个tokio任务循环。
//! 循环逐个取出触发参数，在内部任务中执行处理器，并把结果推入回调通道。
//!
//! 状态流转：空闲 → 执行中 → 空闲 → … → 停止中 → 已排空。
//!
//! - 同一日志ID在入队后、出队前重复到达时直接拒绝
//! - 配置了超时的执行超时后返回 502，内部任务被中止，线程继续处理后续触发
//! - 停止时队列中尚未执行的触发逐条以失败回调上报，不会被静默丢弃
//! - 队列连续空闲达到阈值后线程自行关闭并从注册表移除；
//!   关闭与入队在同一把锁下判定，关闭后的入队返回 [`PushError::Closed`]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use scheduler_core::config::ExecutorConfig;
use scheduler_core::current_millis;
use scheduler_core::models::{GlueType, HandleCallbackParam, ThreadInfo, TriggerParam, FAIL_CODE};
use scheduler_infrastructure::MetricsCollector;

use crate::callback::CallbackSender;
use crate::handler::{HandleResult, JobContext, JobHandler};
use crate::job_logger::{JobFileLogger, JobLogAppender};
use crate::job_thread_registry::JobThreadRegistry;

/// 回调消息的最大字符数，超出部分以 `...` 结尾
pub const MAX_HANDLE_MSG_CHARS: usize = 50_000;

pub const TIMEOUT_MSG: &str = "job execute timeout ";
pub const RESULT_LOST_MSG: &str = "job handle result lost.";

/// 入队失败原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// 同一日志ID已在队列中
    Duplicate,
    QueueFull,
    /// 线程已停止或已空闲关闭
    Closed,
}

#[derive(Debug, Clone)]
pub struct JobThreadOptions {
    pub queue_capacity: usize,
    pub poll_timeout: Duration,
    /// 0表示不做空闲回收
    pub idle_poll_limit: u32,
}

impl JobThreadOptions {
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity,
            poll_timeout: config.poll_timeout(),
            idle_poll_limit: config.idle_poll_limit,
        }
    }
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<TriggerParam>,
    log_ids: HashSet<i64>,
    closed: bool,
}

pub struct JobThread {
    job_id: i64,
    handler: Arc<dyn JobHandler>,
    glue_type: GlueType,
    glue_updatetime: i64,
    options: JobThreadOptions,
    state: Mutex<QueueState>,
    notify: Notify,
    running: AtomicBool,
    running_log_id: AtomicI64,
    stop: CancellationToken,
    stop_reason: Mutex<Option<String>>,
    current: Mutex<Option<AbortHandle>>,
    callbacks: CallbackSender,
    logger: JobFileLogger,
    metrics: Arc<MetricsCollector>,
    registry: Weak<JobThreadRegistry>,
    start_time: i64,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// 作业线程共享的依赖，负责创建并启动线程
#[derive(Clone)]
pub struct JobThreadFactory {
    options: JobThreadOptions,
    callbacks: CallbackSender,
    logger: JobFileLogger,
    metrics: Arc<MetricsCollector>,
    registry: Weak<JobThreadRegistry>,
}

impl JobThreadFactory {
    pub fn new(
        options: JobThreadOptions,
        callbacks: CallbackSender,
        logger: JobFileLogger,
        metrics: Arc<MetricsCollector>,
        registry: &Arc<JobThreadRegistry>,
    ) -> Self {
        Self {
            options,
            callbacks,
            logger,
            metrics,
            registry: Arc::downgrade(registry),
        }
    }

    pub fn logger(&self) -> &JobFileLogger {
        &self.logger
    }

    /// 创建线程并启动其循环
    pub fn spawn(
        &self,
        job_id: i64,
        handler: Arc<dyn JobHandler>,
        glue_type: GlueType,
        glue_updatetime: i64,
    ) -> Arc<JobThread> {
        let thread = Arc::new(JobThread {
            job_id,
            handler,
            glue_type,
            glue_updatetime,
            options: self.options.clone(),
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            running: AtomicBool::new(false),
            running_log_id: AtomicI64::new(0),
            stop: CancellationToken::new(),
            stop_reason: Mutex::new(None),
            current: Mutex::new(None),
            callbacks: self.callbacks.clone(),
            logger: self.logger.clone(),
            metrics: Arc::clone(&self.metrics),
            registry: self.registry.clone(),
            start_time: current_millis(),
            handle: Mutex::new(None),
        });

        let runner = Arc::clone(&thread);
        let handle = tokio::spawn(async move { runner.run_loop().await });
        *thread.handle.lock() = Some(handle);
        debug!("作业线程已启动: job_id={}", job_id);
        thread
    }
}

/// 截断过长的回调消息
pub fn normalize_result(result: HandleResult) -> HandleResult {
    if result.code <= 0 {
        return HandleResult::fail(RESULT_LOST_MSG);
    }

    let msg = result.msg.map(|msg| {
        match msg.char_indices().nth(MAX_HANDLE_MSG_CHARS) {
            Some((index, _)) => format!("{}...", &msg[..index]),
            None => msg,
        }
    });
    HandleResult {
        code: result.code,
        msg,
    }
}

impl JobThread {
    pub fn job_id(&self) -> i64 {
        self.job_id
    }

    pub fn handler(&self) -> &Arc<dyn JobHandler> {
        &self.handler
    }

    pub fn glue_type(&self) -> GlueType {
        self.glue_type
    }

    pub fn glue_updatetime(&self) -> i64 {
        self.glue_updatetime
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// 触发参数入队
    pub fn push(&self, param: TriggerParam) -> Result<(), PushError> {
        {
            let mut state = self.state.lock();
            if state.closed || self.stop.is_cancelled() {
                return Err(PushError::Closed);
            }
            if state.log_ids.contains(&param.log_id) {
                info!("重复触发，拒绝入队: job_id={}, log_id={}", self.job_id, param.log_id);
                return Err(PushError::Duplicate);
            }
            if state.queue.len() >= self.options.queue_capacity {
                return Err(PushError::QueueFull);
            }
            state.log_ids.insert(param.log_id);
            state.queue.push_back(param);
        }
        self.notify.notify_one();
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_running_or_has_queue(&self) -> bool {
        let state = self.state.lock();
        self.is_running() || !state.queue.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_closed(&self) -> bool {
        self.stop.is_cancelled() || self.state.lock().closed
    }

    /// 该日志是否正在执行或仍在队列中
    pub fn holds_log(&self, log_id: i64) -> bool {
        self.running_log_id.load(Ordering::SeqCst) == log_id
            || self.state.lock().log_ids.contains(&log_id)
    }

    pub fn thread_info(&self, app_name: &str, address: &str) -> ThreadInfo {
        let state = if self.is_running() {
            "RUNNING"
        } else if self.pending_count() > 0 {
            "QUEUED"
        } else {
            "IDLE"
        };
        ThreadInfo {
            job_id: self.job_id,
            state: state.to_string(),
            app_name: app_name.to_string(),
            address: address.to_string(),
            start_time: self.start_time,
        }
    }

    /// 停止线程：取消处理器上下文，正在执行的内部任务随即被中止
    pub fn stop(&self, reason: &str) {
        {
            let mut stop_reason = self.stop_reason.lock();
            if stop_reason.is_none() {
                *stop_reason = Some(reason.to_string());
            }
        }
        self.stop.cancel();
        self.notify.notify_one();
        info!("作业线程停止: job_id={}, reason={}", self.job_id, reason);
    }

    /// 在调用方同步中止正在执行的内部任务，不等线程循环响应
    pub fn force_stop(&self, reason: &str) {
        self.stop(reason);
        if let Some(current) = self.current.lock().take() {
            current.abort();
            warn!("强制中止作业执行: job_id={}", self.job_id);
        }
    }

    /// 等待线程循环退出
    pub async fn join(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("作业线程退出异常: job_id={}, error={}", self.job_id, e);
            }
        }
    }

    fn stop_reason(&self) -> String {
        self.stop_reason
            .lock()
            .clone()
            .unwrap_or_else(|| "job thread stopped".to_string())
    }

    fn pop(&self) -> Option<TriggerParam> {
        let mut state = self.state.lock();
        let param = state.queue.pop_front()?;
        state.log_ids.remove(&param.log_id);
        self.running.store(true, Ordering::SeqCst);
        self.running_log_id.store(param.log_id, Ordering::SeqCst);
        Some(param)
    }

    async fn poll(&self) -> Option<TriggerParam> {
        if let Some(param) = self.pop() {
            return Some(param);
        }
        tokio::select! {
            _ = self.notify.notified() => {}
            _ = tokio::time::sleep(self.options.poll_timeout) => {}
            _ = self.stop.cancelled() => return None,
        }
        self.pop()
    }

    /// 队列为空且未在执行时关闭线程，返回是否已关闭
    fn close_if_idle(&self) -> bool {
        let mut state = self.state.lock();
        if state.queue.is_empty() && !self.is_running() {
            state.closed = true;
        }
        state.closed
    }

    async fn run_loop(self: Arc<Self>) {
        if let Err(e) = self.handler.init().await {
            error!("作业处理器初始化失败: job_id={}, error={}", self.job_id, e);
        }

        let mut idle_polls = 0u32;
        while !self.stop.is_cancelled() {
            match self.poll().await {
                Some(param) => {
                    idle_polls = 0;
                    self.process(param).await;
                }
                None => {
                    idle_polls += 1;
                    if self.options.idle_poll_limit > 0
                        && idle_polls >= self.options.idle_poll_limit
                        && self.close_if_idle()
                    {
                        if let Some(registry) = self.registry.upgrade() {
                            registry.remove_if_same(self.job_id, &self);
                        }
                        info!("作业线程长时间空闲，自行回收: job_id={}", self.job_id);
                        break;
                    }
                }
            }
        }

        self.drain();

        if let Err(e) = self.handler.destroy().await {
            error!("作业处理器销毁失败: job_id={}, error={}", self.job_id, e);
        }
        info!("作业线程已退出: job_id={}", self.job_id);
    }

    /// 关闭队列，未执行的触发以失败回调上报
    fn drain(&self) {
        let pending: Vec<TriggerParam> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.log_ids.clear();
            state.queue.drain(..).collect()
        };
        if pending.is_empty() {
            return;
        }

        let reason = self.stop_reason();
        warn!("作业线程停止，{} 个排队触发未执行: job_id={}", pending.len(), self.job_id);
        for param in pending {
            self.callbacks.push(HandleCallbackParam::new(
                param.log_id,
                param.log_date_time,
                FAIL_CODE,
                Some(format!("{reason} [job not executed, in the job queue, killed.]")),
            ));
        }
    }

    async fn process(&self, param: TriggerParam) {
        let started = Instant::now();
        let appender = self.logger.appender(param.log_date_time, param.log_id);
        appender.append(&format!(
            "----------- job execute start -----------\n----------- Param:{}",
            param.executor_params
        ));

        let result = normalize_result(self.execute(&param, &appender).await);
        appender.append(&format!(
            "----------- job execute end(finish) -----------\n----------- Result: handleCode={}, handleMsg = {}",
            result.code,
            result.msg.as_deref().unwrap_or_default()
        ));
        self.metrics
            .record_job_execution(result.is_success(), started.elapsed().as_secs_f64());

        let callback = if self.stop.is_cancelled() {
            let reason = self.stop_reason();
            appender.append(&format!("----------- JobThread toStop, stopReason:{reason}"));
            HandleCallbackParam::new(
                param.log_id,
                param.log_date_time,
                FAIL_CODE,
                Some(format!("{reason} [job running, killed]")),
            )
        } else {
            HandleCallbackParam::new(param.log_id, param.log_date_time, result.code, result.msg)
        };
        self.running_log_id.store(0, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.callbacks.push(callback);
    }

    async fn execute(&self, param: &TriggerParam, appender: &JobLogAppender) -> HandleResult {
        let cancel = self.stop.child_token();
        let ctx = JobContext::new(param, appender.clone(), cancel.clone());
        let handler = Arc::clone(&self.handler);
        let mut task = tokio::spawn(async move { handler.execute(ctx).await });
        *self.current.lock() = Some(task.abort_handle());

        let deadline = async {
            if param.executor_timeout > 0 {
                tokio::time::sleep(Duration::from_secs(param.executor_timeout as u64)).await;
            } else {
                std::future::pending::<()>().await;
            }
        };

        // 停止后不再等待处理器自行返回，被替换的线程立即让出执行权
        let joined = tokio::select! {
            joined = &mut task => joined,
            _ = self.stop.cancelled() => {
                task.abort();
                *self.current.lock() = None;
                appender.append("----------- job execute killed");
                warn!("作业线程已停止，中止正在执行的处理器: job_id={}, log_id={}", self.job_id, param.log_id);
                return HandleResult::fail("job execute killed.");
            }
            _ = deadline => {
                cancel.cancel();
                task.abort();
                *self.current.lock() = None;
                appender.append("----------- job execute timeout");
                warn!(
                    "作业执行超时: job_id={}, log_id={}, timeout={}s",
                    self.job_id, param.log_id, param.executor_timeout
                );
                return HandleResult::timeout(TIMEOUT_MSG);
            }
        };
        *self.current.lock() = None;

        match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => HandleResult::fail("job execute aborted."),
            Err(e) => {
                error!("作业处理器异常: job_id={}, error={}", self.job_id, e);
                appender.append(&format!("----------- JobThread Exception:{e}"));
                HandleResult::fail(format!("job handler panicked: {e}"))
            }
        }
    }
}
