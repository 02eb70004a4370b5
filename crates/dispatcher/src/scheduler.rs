use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use scheduler_core::config::AdminConfig;
use scheduler_core::current_millis;
use scheduler_core::models::{JobInfo, MisfireStrategy, TriggerType};
use scheduler_core::traits::{JobInfoRepository, ScheduleLock};
use scheduler_core::SchedulerResult;
use scheduler_infrastructure::MetricsCollector;

use crate::cron_utils::generate_next_valid_time;
use crate::job_trigger::TriggerRequest;
use crate::time_ring::{TimeRing, RING_SLOTS};
use crate::trigger_pool::TriggerSubmitter;

/// 时间轮调度器
///
/// 两个独立循环：预读循环在调度锁内取出即将到期的作业并放入时间轮，
/// 时间轮循环每秒取出当前槽位交给触发线程池。两者只通过时间轮通信。
pub struct JobScheduler {
    job_repo: Arc<dyn JobInfoRepository>,
    lock: Arc<dyn ScheduleLock>,
    pool: Arc<dyn TriggerSubmitter>,
    ring: TimeRing,
    metrics: Arc<MetricsCollector>,
    pre_read_ms: i64,
    pre_read_count: usize,
    ring_drain_wait: Duration,
    schedule_shutdown: CancellationToken,
    ring_shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl JobScheduler {
    pub fn new(
        job_repo: Arc<dyn JobInfoRepository>,
        lock: Arc<dyn ScheduleLock>,
        pool: Arc<dyn TriggerSubmitter>,
        metrics: Arc<MetricsCollector>,
        config: &AdminConfig,
    ) -> Self {
        Self {
            job_repo,
            lock,
            pool,
            ring: TimeRing::new(),
            metrics,
            pre_read_ms: config.pre_read_ms,
            pre_read_count: config.pre_read_count(),
            ring_drain_wait: Duration::from_millis(config.ring_drain_wait_ms),
            schedule_shutdown: CancellationToken::new(),
            ring_shutdown: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn ring(&self) -> &TimeRing {
        &self.ring
    }

    /// 执行一轮预读，返回本轮是否读到了作业
    ///
    /// 只有获取调度锁或查询作业失败会让整轮失败，单个作业的错误不影响其他作业。
    pub async fn schedule_cycle(&self, now: i64) -> SchedulerResult<bool> {
        let started = Instant::now();
        let guard = self.lock.acquire().await?;
        let result = self.pre_read(now).await;
        if let Err(e) = guard.release().await {
            warn!("释放调度锁失败: {}", e);
        }

        if let Ok(count) = &result {
            self.metrics
                .record_schedule_cycle(*count, started.elapsed().as_secs_f64());
        }
        result.map(|count| count > 0)
    }

    async fn pre_read(&self, now: i64) -> SchedulerResult<usize> {
        let mut jobs = self
            .job_repo
            .schedule_job_query(now + self.pre_read_ms, self.pre_read_count)
            .await?;
        if jobs.is_empty() {
            return Ok(0);
        }

        for job in jobs.iter_mut() {
            if now > job.trigger_next_time + self.pre_read_ms {
                warn!(
                    "作业调度过期: job_id={}, trigger_next_time={}",
                    job.id, job.trigger_next_time
                );
                self.metrics.record_misfire();
                match job.misfire_strategy {
                    MisfireStrategy::FireOnceNow => {
                        self.pool
                            .submit(TriggerRequest::new(job.id, TriggerType::Misfire));
                        debug!("调度过期补偿触发: job_id={}", job.id);
                    }
                    MisfireStrategy::DoNothing => {}
                }
                self.refresh_next_valid_time(job, now);
            } else if now > job.trigger_next_time {
                self.pool.submit(TriggerRequest::new(job.id, TriggerType::Cron));
                debug!("轻微过期，立即触发: job_id={}", job.id);
                self.refresh_next_valid_time(job, now);

                if job.is_running() && now + self.pre_read_ms > job.trigger_next_time {
                    self.push_ring(job.trigger_next_time, job.id);
                    let from = job.trigger_next_time;
                    self.refresh_next_valid_time(job, from);
                }
            } else {
                self.push_ring(job.trigger_next_time, job.id);
                let from = job.trigger_next_time;
                self.refresh_next_valid_time(job, from);
            }
        }

        self.job_repo.schedule_update(&jobs).await?;
        Ok(jobs.len())
    }

    fn push_ring(&self, trigger_time: i64, job_id: i64) {
        let slot = TimeRing::slot_of(trigger_time);
        self.ring.push(slot, job_id);
        debug!("作业进入时间轮: job_id={}, slot={}", job_id, slot);
    }

    /// 按 `from` 推进作业的触发时间，没有后续时间或配置非法时停止调度
    pub fn refresh_next_valid_time(&self, job: &mut JobInfo, from: i64) {
        match generate_next_valid_time(job, from) {
            Ok(Some(next)) => {
                job.trigger_last_time = job.trigger_next_time;
                job.trigger_next_time = next;
            }
            Ok(None) => {
                info!("作业没有后续触发时间，停止调度: job_id={}", job.id);
                job.stop_schedule();
            }
            Err(e) => {
                error!("计算下次触发时间失败，停止调度: job_id={}, error={}", job.id, e);
                job.stop_schedule();
            }
        }
    }

    /// 取出当前秒及前一秒槽位中的作业并提交触发，返回提交数量
    pub fn ring_tick(&self, second: usize) -> usize {
        let due = self.ring.take_due(second);
        if !due.is_empty() {
            debug!("时间轮触发: second={}, jobs={:?}", second, due);
        }
        for job_id in &due {
            self.pool
                .submit(TriggerRequest::new(*job_id, TriggerType::Cron));
        }
        due.len()
    }

    pub fn start(self: &Arc<Self>) {
        let scheduler = Arc::clone(self);
        let schedule_handle = tokio::spawn(async move { scheduler.schedule_loop().await });

        let scheduler = Arc::clone(self);
        let ring_handle = tokio::spawn(async move { scheduler.ring_loop().await });

        self.handles.lock().extend([schedule_handle, ring_handle]);
        info!("调度器已启动: pre_read_ms={}", self.pre_read_ms);
    }

    async fn schedule_loop(&self) {
        let align = self.pre_read_ms - current_millis() % 1000;
        if self.sleep_or_cancel(&self.schedule_shutdown, align).await {
            return;
        }

        while !self.schedule_shutdown.is_cancelled() {
            let started = current_millis();
            let pre_read_success = match self.schedule_cycle(started).await {
                Ok(read) => read,
                Err(e) => {
                    error!("调度预读失败: {}", e);
                    false
                }
            };

            let now = current_millis();
            if now - started < 1000 {
                let sleep_ms = if pre_read_success {
                    1000 - now % 1000
                } else {
                    self.pre_read_ms - now % 1000
                };
                if self.sleep_or_cancel(&self.schedule_shutdown, sleep_ms).await {
                    break;
                }
            }
        }
        info!("调度预读循环已停止");
    }

    async fn ring_loop(&self) {
        loop {
            let sleep_ms = 1000 - current_millis() % 1000;
            if self.sleep_or_cancel(&self.ring_shutdown, sleep_ms).await {
                break;
            }

            let second = ((current_millis() / 1000) % RING_SLOTS as i64) as usize;
            self.ring_tick(second);
        }
        info!("时间轮循环已停止");
    }

    /// 等待指定毫秒，期间被取消则返回 `true`
    async fn sleep_or_cancel(&self, token: &CancellationToken, millis: i64) -> bool {
        let duration = Duration::from_millis(millis.max(0) as u64);
        tokio::select! {
            _ = token.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }

    /// 先停预读循环，等待时间轮清空后再停时间轮循环
    pub async fn stop(&self) {
        self.schedule_shutdown.cancel();
        tokio::time::sleep(Duration::from_secs(1)).await;

        if !self.ring.is_empty() {
            info!("等待时间轮清空: 剩余 {} 个作业", self.ring.len());
            let deadline = Instant::now() + self.ring_drain_wait;
            while !self.ring.is_empty() && Instant::now() < deadline {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            if !self.ring.is_empty() {
                warn!("时间轮未能在等待时间内清空: 剩余 {} 个作业", self.ring.len());
            }
        }

        self.ring_shutdown.cancel();
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("调度循环退出异常: {}", e);
            }
        }
        info!("调度器已停止");
    }
}
