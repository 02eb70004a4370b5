use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use scheduler_core::config::AdminConfig;
use scheduler_core::current_millis;
use scheduler_infrastructure::MetricsCollector;

use crate::job_trigger::{JobTrigger, TriggerRequest};

/// 按分钟清零的慢触发计数
pub struct SlowTriggerCounter {
    minute: AtomicI64,
    counts: DashMap<i64, AtomicU32>,
    threshold: Duration,
    limit: u32,
}

impl SlowTriggerCounter {
    pub fn new(threshold: Duration, limit: u32) -> Self {
        Self {
            minute: AtomicI64::new(current_millis() / 60_000),
            counts: DashMap::new(),
            threshold,
            limit,
        }
    }

    fn roll(&self) {
        let minute = current_millis() / 60_000;
        if self.minute.swap(minute, Ordering::AcqRel) != minute {
            self.counts.clear();
        }
    }

    /// 当前分钟内该作业的慢触发次数是否已超过上限
    pub fn is_slow(&self, job_id: i64) -> bool {
        self.roll();
        self.counts
            .get(&job_id)
            .map(|count| count.load(Ordering::Relaxed) > self.limit)
            .unwrap_or(false)
    }

    /// 记录一次触发耗时
    pub fn record(&self, job_id: i64, elapsed: Duration) {
        self.roll();
        if elapsed > self.threshold {
            self.counts
                .entry(job_id)
                .or_insert_with(|| AtomicU32::new(0))
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn count(&self, job_id: i64) -> u32 {
        self.counts
            .get(&job_id)
            .map(|count| count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

/// 各通道累计接收的触发数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerPoolStats {
    pub fast: u64,
    pub slow: u64,
    /// 通道已满、改为直接派生任务执行的触发
    pub overflow: u64,
}

/// 触发提交入口
pub trait TriggerSubmitter: Send + Sync {
    /// 异步提交，不等待触发完成
    fn submit(&self, request: TriggerRequest);
}

/// 触发线程池
///
/// 快慢两条通道各自由固定数量的工作任务消费。通道已满时直接派生任务执行，
/// 调度循环永远不会阻塞在提交上，也不会丢弃触发。
pub struct JobTriggerPool {
    trigger: Arc<JobTrigger>,
    counter: Arc<SlowTriggerCounter>,
    metrics: Arc<MetricsCollector>,
    fast_tx: mpsc::Sender<TriggerRequest>,
    slow_tx: mpsc::Sender<TriggerRequest>,
    shutdown: CancellationToken,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    fast_submitted: AtomicU64,
    slow_submitted: AtomicU64,
    overflowed: AtomicU64,
}

impl JobTriggerPool {
    pub fn start(
        trigger: Arc<JobTrigger>,
        config: &AdminConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Arc<Self> {
        let (fast_tx, fast_rx) = mpsc::channel(config.fast_queue_capacity);
        let (slow_tx, slow_rx) = mpsc::channel(config.slow_queue_capacity);
        let counter = Arc::new(SlowTriggerCounter::new(
            Duration::from_millis(config.slow_trigger_threshold_ms),
            config.slow_trigger_limit,
        ));
        let shutdown = CancellationToken::new();

        let mut workers = Vec::with_capacity(config.trigger_pool_fast_max + config.trigger_pool_slow_max);
        for (lane, rx, size) in [
            ("fast", fast_rx, config.trigger_pool_fast_max),
            ("slow", slow_rx, config.trigger_pool_slow_max),
        ] {
            let rx = Arc::new(Mutex::new(rx));
            for _ in 0..size {
                workers.push(tokio::spawn(Self::worker_loop(
                    lane,
                    Arc::clone(&rx),
                    Arc::clone(&trigger),
                    Arc::clone(&counter),
                    shutdown.clone(),
                )));
            }
        }

        info!(
            "触发线程池已启动: fast={}, slow={}",
            config.trigger_pool_fast_max, config.trigger_pool_slow_max
        );

        Arc::new(Self {
            trigger,
            counter,
            metrics,
            fast_tx,
            slow_tx,
            shutdown,
            workers: parking_lot::Mutex::new(workers),
            fast_submitted: AtomicU64::new(0),
            slow_submitted: AtomicU64::new(0),
            overflowed: AtomicU64::new(0),
        })
    }

    async fn worker_loop(
        lane: &'static str,
        rx: Arc<Mutex<mpsc::Receiver<TriggerRequest>>>,
        trigger: Arc<JobTrigger>,
        counter: Arc<SlowTriggerCounter>,
        shutdown: CancellationToken,
    ) {
        loop {
            let request = tokio::select! {
                _ = shutdown.cancelled() => break,
                request = async { rx.lock().await.recv().await } => request,
            };

            let Some(request) = request else {
                break;
            };
            debug!("{}通道执行触发: job_id={}", lane, request.job_id);
            let job_id = request.job_id;
            // 触发在独立任务中执行，单次触发panic不会让工作任务退出
            let trigger = Arc::clone(&trigger);
            let counter = Arc::clone(&counter);
            let run = tokio::spawn(async move { Self::execute(&trigger, &counter, request).await });
            if let Err(e) = run.await {
                error!("{}通道触发任务异常退出: job_id={}, error={}", lane, job_id, e);
            }
        }
    }

    async fn execute(trigger: &JobTrigger, counter: &SlowTriggerCounter, request: TriggerRequest) {
        let job_id = request.job_id;
        let started = Instant::now();
        if let Err(e) = trigger.trigger(request).await {
            error!("作业触发异常: job_id={}, error={}", job_id, e);
        }
        counter.record(job_id, started.elapsed());
    }

    pub fn slow_counter(&self) -> &SlowTriggerCounter {
        &self.counter
    }

    pub fn stats(&self) -> TriggerPoolStats {
        TriggerPoolStats {
            fast: self.fast_submitted.load(Ordering::Relaxed),
            slow: self.slow_submitted.load(Ordering::Relaxed),
            overflow: self.overflowed.load(Ordering::Relaxed),
        }
    }

    /// 停止全部工作任务，正在执行的触发会先完成
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                warn!("触发工作任务退出异常: {}", e);
            }
        }
        info!("触发线程池已停止");
    }
}

impl TriggerSubmitter for JobTriggerPool {
    fn submit(&self, request: TriggerRequest) {
        if self.shutdown.is_cancelled() {
            warn!("触发线程池已停止，忽略触发: job_id={}", request.job_id);
            return;
        }

        let lane = if self.counter.is_slow(request.job_id) {
            self.metrics.record_slow_pool_submission();
            self.slow_submitted.fetch_add(1, Ordering::Relaxed);
            &self.slow_tx
        } else {
            self.fast_submitted.fetch_add(1, Ordering::Relaxed);
            &self.fast_tx
        };

        match lane.try_send(request) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(request)) => {
                warn!("触发队列已满，直接执行: job_id={}", request.job_id);
                self.overflowed.fetch_add(1, Ordering::Relaxed);
                let trigger = Arc::clone(&self.trigger);
                let counter = Arc::clone(&self.counter);
                tokio::spawn(async move {
                    Self::execute(&trigger, &counter, request).await;
                });
            }
            Err(mpsc::error::TrySendError::Closed(request)) => {
                warn!("触发队列已关闭，忽略触发: job_id={}", request.job_id);
            }
        }
    }
}
