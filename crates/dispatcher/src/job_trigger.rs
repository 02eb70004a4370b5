use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use scheduler_core::models::{
    AddressType, JobGroup, JobInfo, JobLog, ReturnT, RouteStrategy, TriggerParam, TriggerType,
    FAIL_CODE,
};
use scheduler_core::traits::{JobGroupRepository, JobInfoRepository, JobLogRepository};
use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_infrastructure::MetricsCollector;

use crate::strategies::ExecutorRouter;

/// 一次触发请求
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerRequest {
    pub job_id: i64,
    pub trigger_type: TriggerType,
    /// 为空时使用作业配置的失败重试次数
    pub fail_retry_count: Option<i32>,
    /// 形如 `index/total` 的分片参数
    pub sharding_param: Option<String>,
    /// 覆盖作业配置的执行参数
    pub executor_param: Option<String>,
    /// 覆盖执行器分组的地址列表，逗号分隔
    pub address_list: Option<String>,
}

impl TriggerRequest {
    pub fn new(job_id: i64, trigger_type: TriggerType) -> Self {
        Self {
            job_id,
            trigger_type,
            fail_retry_count: None,
            sharding_param: None,
            executor_param: None,
            address_list: None,
        }
    }

    pub fn with_executor_param(mut self, executor_param: Option<String>) -> Self {
        self.executor_param = executor_param;
        self
    }

    pub fn with_address_list(mut self, address_list: Option<String>) -> Self {
        self.address_list = address_list;
        self
    }
}

/// 解析 `index/total` 形式的分片参数
pub fn parse_sharding_param(raw: &str) -> Option<(u32, u32)> {
    let (index, total) = raw.trim().split_once('/')?;
    let index: u32 = index.trim().parse().ok()?;
    let total: u32 = total.trim().parse().ok()?;
    (total > 0 && index < total).then_some((index, total))
}

/// 作业触发
///
/// 完成一次调度尝试：落库日志骨架、路由、调用执行器、回写触发结果。
/// 分片广播作业会对分组内每个地址各产生一条日志。
pub struct JobTrigger {
    job_repo: Arc<dyn JobInfoRepository>,
    group_repo: Arc<dyn JobGroupRepository>,
    log_repo: Arc<dyn JobLogRepository>,
    router: Arc<ExecutorRouter>,
    metrics: Arc<MetricsCollector>,
}

impl JobTrigger {
    pub fn new(
        job_repo: Arc<dyn JobInfoRepository>,
        group_repo: Arc<dyn JobGroupRepository>,
        log_repo: Arc<dyn JobLogRepository>,
        router: Arc<ExecutorRouter>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            job_repo,
            group_repo,
            log_repo,
            router,
            metrics,
        }
    }

    #[instrument(skip(self, request), fields(job_id = request.job_id, trigger_type = %request.trigger_type))]
    pub async fn trigger(&self, request: TriggerRequest) -> SchedulerResult<()> {
        let Some(mut job) = self.job_repo.load_by_id(request.job_id).await? else {
            warn!("触发作业失败，作业不存在: job_id={}", request.job_id);
            return Ok(());
        };

        if let Some(param) = request.executor_param {
            job.executor_param = param;
        }

        let fail_retry_count = request
            .fail_retry_count
            .filter(|count| *count >= 0)
            .unwrap_or(job.executor_fail_retry_count);

        let mut group = self
            .group_repo
            .load_by_id(job.job_group)
            .await?
            .ok_or(SchedulerError::JobGroupNotFound { id: job.job_group })?;

        if let Some(address_list) = request
            .address_list
            .filter(|list| !list.trim().is_empty())
        {
            group.address_type = AddressType::Manual;
            group.address_list = Some(address_list.trim().to_string());
        }

        let sharding = request
            .sharding_param
            .as_deref()
            .and_then(parse_sharding_param);

        let addresses = group.registry_list();
        if job.route_strategy == RouteStrategy::ShardingBroadcast
            && !addresses.is_empty()
            && sharding.is_none()
        {
            let total = addresses.len() as u32;
            let mut first_error = None;
            for index in 0..total {
                // 单个分片失败不影响其余分片
                if let Err(e) = self
                    .process_trigger(
                        &group,
                        &job,
                        fail_retry_count,
                        request.trigger_type,
                        index,
                        total,
                    )
                    .await
                {
                    error!(
                        "分片广播触发失败: job_id={}, shard={}/{}, error={}",
                        job.id, index, total, e
                    );
                    first_error.get_or_insert(e);
                }
            }
            if let Some(e) = first_error {
                return Err(e);
            }
        } else {
            let (index, total) = sharding.unwrap_or((0, 1));
            self.process_trigger(
                &group,
                &job,
                fail_retry_count,
                request.trigger_type,
                index,
                total,
            )
            .await?;
        }

        Ok(())
    }

    async fn process_trigger(
        &self,
        group: &JobGroup,
        job: &JobInfo,
        fail_retry_count: i32,
        trigger_type: TriggerType,
        index: u32,
        total: u32,
    ) -> SchedulerResult<()> {
        let started = Instant::now();
        let is_broadcast = job.route_strategy == RouteStrategy::ShardingBroadcast;
        let sharding_param = is_broadcast.then(|| format!("{index}/{total}"));

        let mut log = JobLog::new(job.job_group, job.id, Utc::now());
        log.id = self.log_repo.create(&log).await?;
        debug!("调度日志已创建: job_id={}, log_id={}", job.id, log.id);

        let trigger_param = TriggerParam {
            job_id: job.id,
            executor_handler: job.executor_handler.clone(),
            executor_params: job.executor_param.clone(),
            executor_block_strategy: job.block_strategy,
            executor_timeout: job.executor_timeout,
            log_id: log.id,
            log_date_time: log.trigger_time.timestamp_millis(),
            glue_type: job.glue_type,
            glue_source: job.glue_source.clone(),
            glue_updatetime: job.glue_updatetime,
            broadcast_index: index,
            broadcast_total: total,
        };

        let addresses = group.registry_list();
        let route_result: ReturnT<String> = if addresses.is_empty() {
            ReturnT::fail("调度失败：执行器地址为空")
        } else if is_broadcast {
            let address = addresses
                .get(index as usize)
                .or_else(|| addresses.first())
                .cloned();
            match address {
                Some(address) => ReturnT::success_with(address),
                None => ReturnT::fail("调度失败：执行器地址为空"),
            }
        } else {
            self.router
                .route(job.route_strategy, group.id, &trigger_param, &addresses)
                .await
        };

        let address = route_result
            .content
            .clone()
            .filter(|_| route_result.is_success());
        let trigger_result = match address.as_deref() {
            Some(address) => self.run_executor(address, trigger_param).await,
            None => ReturnT::with_code(FAIL_CODE, route_result.msg_or_empty()),
        };

        let mut trigger_msg = vec![
            format!("任务触发类型：{}", trigger_type.title()),
            format!(
                "执行器-注册方式：{}",
                match group.address_type {
                    AddressType::Auto => "自动注册",
                    AddressType::Manual => "手动录入",
                }
            ),
            format!("执行器-地址列表：{:?}", addresses),
            match sharding_param.as_deref() {
                Some(param) => format!("路由策略：{}({})", job.route_strategy.title(), param),
                None => format!("路由策略：{}", job.route_strategy.title()),
            },
            format!("阻塞处理策略：{}", job.block_strategy.title()),
            format!("任务超时时间：{}", job.executor_timeout),
            format!("失败重试次数：{}", fail_retry_count),
            ">>>>>>>>>>>触发调度<<<<<<<<<<<".to_string(),
        ];
        if address.is_some() {
            if let Some(route_msg) = route_result.msg.as_deref().filter(|m| !m.is_empty()) {
                trigger_msg.push(route_msg.to_string());
            }
        }
        trigger_msg.push(match address.as_deref() {
            Some(address) => format!(
                "触发调度：address：{}，code：{}，msg：{}",
                address,
                trigger_result.code,
                trigger_result.msg_or_empty()
            ),
            None => trigger_result.msg_or_empty().to_string(),
        });

        log.executor_address = address;
        log.executor_handler = Some(job.executor_handler.clone());
        log.executor_param = Some(job.executor_param.clone());
        log.executor_sharding_param = sharding_param;
        log.executor_fail_retry_count = fail_retry_count;
        log.trigger_code = trigger_result.code;
        log.trigger_msg = Some(trigger_msg.join("\n"));
        self.log_repo.update_trigger_info(&log).await?;

        self.metrics
            .record_trigger(trigger_result.is_success(), started.elapsed().as_secs_f64());
        info!(
            "作业触发完成: job_id={}, log_id={}, code={}",
            job.id, log.id, trigger_result.code
        );

        Ok(())
    }

    async fn run_executor(&self, address: &str, trigger_param: TriggerParam) -> ReturnT<String> {
        match self.router.clients().executor(address) {
            Ok(client) => client.run(trigger_param).await,
            Err(e) => {
                warn!("获取执行器客户端失败: address={}, error={}", address, e);
                ReturnT::fail(e.to_string())
            }
        }
    }
}
