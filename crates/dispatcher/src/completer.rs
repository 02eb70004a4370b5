use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashSet;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use scheduler_core::config::AdminConfig;
use scheduler_core::models::{
    HandleCallbackParam, JobLog, ReturnT, TriggerType, FAIL_CODE, SUCCESS_CODE,
};
use scheduler_core::traits::{JobInfoRepository, JobLogRepository};
use scheduler_core::SchedulerResult;
use scheduler_infrastructure::MetricsCollector;

use crate::job_trigger::TriggerRequest;
use crate::registry::JobRegistryService;
use crate::trigger_pool::TriggerSubmitter;

/// 结果丢失时写入的执行结果
pub const LOST_JOB_MSG: &str = "任务结果丢失，标记失败";

/// 按字符截断，避免切断多字节字符
pub fn truncate_chars(text: &str, max_len: usize) -> String {
    match text.char_indices().nth(max_len) {
        Some((index, _)) => text[..index].to_string(),
        None => text.to_string(),
    }
}

/// 执行结果处理
///
/// 回调按日志ID幂等：日志不存在或已终结时直接忽略。执行成功的作业会触发其子作业；
/// 后台循环定期把执行器已失联、长时间未回传结果的日志标记为失败。
pub struct JobCompleter {
    log_repo: Arc<dyn JobLogRepository>,
    job_repo: Arc<dyn JobInfoRepository>,
    registry: Arc<JobRegistryService>,
    submitter: Arc<dyn TriggerSubmitter>,
    metrics: Arc<MetricsCollector>,
    handle_msg_max_len: usize,
    lost_scan_interval: Duration,
    lost_threshold: chrono::Duration,
    callback_permits: Arc<Semaphore>,
    in_flight: DashSet<i64>,
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl JobCompleter {
    pub fn new(
        log_repo: Arc<dyn JobLogRepository>,
        job_repo: Arc<dyn JobInfoRepository>,
        registry: Arc<JobRegistryService>,
        submitter: Arc<dyn TriggerSubmitter>,
        metrics: Arc<MetricsCollector>,
        config: &AdminConfig,
    ) -> Self {
        Self {
            log_repo,
            job_repo,
            registry,
            submitter,
            metrics,
            handle_msg_max_len: config.handle_msg_max_len,
            lost_scan_interval: Duration::from_secs(config.lost_job_scan_interval_seconds),
            lost_threshold: chrono::Duration::minutes(config.lost_job_threshold_minutes),
            callback_permits: Arc::new(Semaphore::new(config.callback_pool_size)),
            in_flight: DashSet::new(),
            shutdown: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// 接收一批回调，异步处理后立即返回成功
    pub fn callback(self: &Arc<Self>, params: Vec<HandleCallbackParam>) -> ReturnT<String> {
        self.metrics.record_callbacks(params.len());
        let completer = Arc::clone(self);
        tokio::spawn(async move {
            let _permit = match Arc::clone(&completer.callback_permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    warn!("回调处理已关闭，丢弃 {} 条回调: {}", params.len(), e);
                    return;
                }
            };
            for param in params {
                let log_id = param.log_id;
                let result = completer.callback_one(param).await;
                debug!(
                    "处理回调: log_id={}, code={}, msg={}",
                    log_id,
                    result.code,
                    result.msg_or_empty()
                );
            }
        });
        ReturnT::success()
    }

    /// 处理单条回调
    pub async fn callback_one(&self, param: HandleCallbackParam) -> ReturnT<String> {
        if !self.in_flight.insert(param.log_id) {
            return ReturnT::fail("log repeate callback.");
        }
        let result = self.apply_callback(&param).await;
        self.in_flight.remove(&param.log_id);

        match result {
            Ok(result) => result,
            Err(e) => {
                error!("处理回调失败: log_id={}, error={}", param.log_id, e);
                ReturnT::fail(e.to_string())
            }
        }
    }

    async fn apply_callback(&self, param: &HandleCallbackParam) -> SchedulerResult<ReturnT<String>> {
        let Some(mut log) = self.log_repo.load_by_id(param.log_id).await? else {
            return Ok(ReturnT::fail("log item not found."));
        };
        if log.is_finalized() {
            return Ok(ReturnT::fail("log repeate callback."));
        }

        let mut handle_msg = String::new();
        if let Some(existing) = log.handle_msg.as_deref().filter(|m| !m.is_empty()) {
            handle_msg.push_str(existing);
            handle_msg.push('\n');
        }
        if let Some(msg) = param.handle_msg.as_deref() {
            handle_msg.push_str(msg);
        }

        log.handle_time = Some(Utc::now());
        log.handle_code = param.handle_code;
        log.handle_msg = Some(handle_msg);

        if self.complete(log).await? {
            Ok(ReturnT::success())
        } else {
            Ok(ReturnT::fail("log repeate callback."))
        }
    }

    /// 终结日志：先以条件更新认领日志，认领成功且执行成功时再触发子作业
    ///
    /// 返回日志是否由本次调用终结。并发的回调与丢失扫描只有一方能认领，
    /// 未认领的一方不会触发子作业。
    pub async fn complete(&self, mut log: JobLog) -> SchedulerResult<bool> {
        if let Some(msg) = log.handle_msg.as_mut() {
            if msg.chars().count() > self.handle_msg_max_len {
                *msg = truncate_chars(msg, self.handle_msg_max_len);
            }
        }

        if !self.log_repo.update_handle_info(&log).await? {
            debug!("日志已被终结，忽略: log_id={}", log.id);
            return Ok(false);
        }

        if log.handle_code == SUCCESS_CODE {
            match self.trigger_children(&log).await {
                Ok(Some(child_msg)) => {
                    let mut msg = log.handle_msg.unwrap_or_default();
                    msg.push_str(&child_msg);
                    let msg = truncate_chars(&msg, self.handle_msg_max_len);
                    if let Err(e) = self.log_repo.update_handle_msg(log.id, &msg).await {
                        warn!("写入子作业触发记录失败: log_id={}, error={}", log.id, e);
                    }
                }
                Ok(None) => {}
                Err(e) => error!("触发子作业失败: log_id={}, error={}", log.id, e),
            }
        }

        Ok(true)
    }

    async fn trigger_children(&self, log: &JobLog) -> SchedulerResult<Option<String>> {
        let Some(job) = self.job_repo.load_by_id(log.job_id).await? else {
            return Ok(None);
        };
        if job.child_job_ids.is_empty() {
            return Ok(None);
        }

        let total = job.child_job_ids.len();
        let mut lines = vec![String::new(), ">>>>>>>>>>>触发子任务<<<<<<<<<<<".to_string()];
        for (position, child_id) in job.child_job_ids.iter().copied().enumerate() {
            let outcome = if child_id <= 0 || child_id == job.id {
                Err("子任务ID无效".to_string())
            } else {
                match self.job_repo.load_by_id(child_id).await {
                    Ok(Some(_)) => {
                        self.submitter
                            .submit(TriggerRequest::new(child_id, TriggerType::Parent));
                        Ok(())
                    }
                    Ok(None) => Err("子任务不存在".to_string()),
                    Err(e) => Err(e.to_string()),
                }
            };

            lines.push(match outcome {
                Ok(()) => format!(
                    "{}/{} [任务ID={}], 触发成功, 触发备注: 已提交",
                    position + 1,
                    total,
                    child_id
                ),
                Err(reason) => format!(
                    "{}/{} [任务ID={}], 触发失败, 触发备注: {}",
                    position + 1,
                    total,
                    child_id,
                    reason
                ),
            });
        }

        info!("作业 {} 执行成功，已处理 {} 个子作业", job.id, total);
        Ok(Some(lines.join("\n")))
    }

    /// 把执行器已失联、超过阈值仍未回传结果的日志标记为失败，返回处理条数
    pub async fn mark_lost_jobs(&self) -> SchedulerResult<usize> {
        let threshold = Utc::now() - self.lost_threshold;
        let candidates = self.log_repo.find_running_before(threshold).await?;
        if candidates.is_empty() {
            return Ok(0);
        }

        let alive = self.registry.alive_addresses().await?;
        let mut marked = 0;
        for mut log in candidates {
            let lost = match log.executor_address.as_deref() {
                Some(address) => !alive.contains(address),
                None => true,
            };
            if !lost {
                continue;
            }

            log.handle_time = Some(Utc::now());
            log.handle_code = FAIL_CODE;
            log.handle_msg = Some(LOST_JOB_MSG.to_string());
            match self.complete(log.clone()).await {
                Ok(true) => {
                    marked += 1;
                    self.metrics.record_lost_job();
                    warn!(
                        "作业结果丢失，标记失败: log_id={}, job_id={}",
                        log.id, log.job_id
                    );
                }
                Ok(false) => {}
                Err(e) => error!("标记丢失作业失败: log_id={}, error={}", log.id, e),
            }
        }

        Ok(marked)
    }

    pub fn start(self: &Arc<Self>) {
        let completer = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                if let Err(e) = completer.mark_lost_jobs().await {
                    error!("扫描丢失作业失败: {}", e);
                }
                tokio::select! {
                    _ = completer.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(completer.lost_scan_interval) => {}
                }
            }
            info!("丢失作业监控已停止");
        });
        self.handles.lock().push(handle);
    }

    pub async fn stop(&self) {
        self.shutdown.cancel();
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("丢失作业监控退出异常: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_keeps_multibyte_boundary() {
        assert_eq!(truncate_chars("调度中心", 2), "调度");
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("abc", 3), "abc");
    }
}
