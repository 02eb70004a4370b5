use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// Metrics collector for the job scheduler
///
/// 指标通过 `metrics` 门面记录，未安装导出器时所有操作均为空操作。
#[derive(Clone)]
pub struct MetricsCollector {
    // Coordinator metrics
    schedule_cycles_total: Counter,
    schedule_cycle_duration: Histogram,
    jobs_pre_read_total: Counter,
    misfires_total: Counter,
    triggers_total: Counter,
    trigger_failures_total: Counter,
    slow_pool_submissions_total: Counter,
    trigger_duration: Histogram,
    callbacks_total: Counter,
    lost_jobs_total: Counter,
    registry_live_addresses: Gauge,

    // Executor metrics
    job_executions_total: Counter,
    job_execution_failures_total: Counter,
    job_execution_duration: Histogram,
    callback_backlog_writes_total: Counter,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            schedule_cycles_total: counter!("scheduler_schedule_cycles_total"),
            schedule_cycle_duration: histogram!("scheduler_schedule_cycle_duration_seconds"),
            jobs_pre_read_total: counter!("scheduler_jobs_pre_read_total"),
            misfires_total: counter!("scheduler_misfires_total"),
            triggers_total: counter!("scheduler_triggers_total"),
            trigger_failures_total: counter!("scheduler_trigger_failures_total"),
            slow_pool_submissions_total: counter!("scheduler_slow_pool_submissions_total"),
            trigger_duration: histogram!("scheduler_trigger_duration_seconds"),
            callbacks_total: counter!("scheduler_callbacks_total"),
            lost_jobs_total: counter!("scheduler_lost_jobs_total"),
            registry_live_addresses: gauge!("scheduler_registry_live_addresses"),
            job_executions_total: counter!("executor_job_executions_total"),
            job_execution_failures_total: counter!("executor_job_execution_failures_total"),
            job_execution_duration: histogram!("executor_job_execution_duration_seconds"),
            callback_backlog_writes_total: counter!("executor_callback_backlog_writes_total"),
        }
    }

    /// 安装Prometheus导出器并监听抓取端口
    pub fn install_prometheus_exporter(bind_address: &str) -> Result<()> {
        let addr: SocketAddr = bind_address
            .parse()
            .with_context(|| format!("指标监听地址格式无效: {bind_address}"))?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("安装Prometheus导出器失败")?;
        info!("Prometheus指标端点已启动: {}", addr);
        Ok(())
    }

    pub fn record_schedule_cycle(&self, pre_read: usize, duration_seconds: f64) {
        self.schedule_cycles_total.increment(1);
        self.jobs_pre_read_total.increment(pre_read as u64);
        self.schedule_cycle_duration.record(duration_seconds);
    }

    pub fn record_misfire(&self) {
        self.misfires_total.increment(1);
    }

    pub fn record_trigger(&self, success: bool, duration_seconds: f64) {
        self.triggers_total.increment(1);
        if !success {
            self.trigger_failures_total.increment(1);
        }
        self.trigger_duration.record(duration_seconds);
    }

    pub fn record_slow_pool_submission(&self) {
        self.slow_pool_submissions_total.increment(1);
    }

    pub fn record_callbacks(&self, count: usize) {
        self.callbacks_total.increment(count as u64);
    }

    pub fn record_lost_job(&self) {
        self.lost_jobs_total.increment(1);
    }

    pub fn set_registry_live_addresses(&self, count: usize) {
        self.registry_live_addresses.set(count as f64);
    }

    pub fn record_job_execution(&self, success: bool, duration_seconds: f64) {
        self.job_executions_total.increment(1);
        if !success {
            self.job_execution_failures_total.increment(1);
        }
        self.job_execution_duration.record(duration_seconds);
    }

    pub fn record_backlog_write(&self) {
        self.callback_backlog_writes_total.increment(1);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
