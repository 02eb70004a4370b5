use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 调度中心配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,
    pub bind_address: String,
    /// 为空时不校验访问令牌
    pub access_token: Option<String>,

    /// 预读窗口（毫秒）
    pub pre_read_ms: i64,
    pub trigger_pool_fast_max: usize,
    pub trigger_pool_slow_max: usize,
    pub fast_queue_capacity: usize,
    pub slow_queue_capacity: usize,
    /// 单次触发超过该耗时计为一次慢触发
    pub slow_trigger_threshold_ms: u64,
    /// 一分钟内慢触发超过该次数后改走慢线程池
    pub slow_trigger_limit: u32,

    pub beat_interval_seconds: u64,
    pub dead_timeout_seconds: u64,

    pub lost_job_scan_interval_seconds: u64,
    pub lost_job_threshold_minutes: i64,

    /// 停机时等待时间轮清空的上限
    pub ring_drain_wait_ms: u64,
    pub handle_msg_max_len: usize,

    pub registry_pool_size: usize,
    pub callback_pool_size: usize,
    /// 调用执行器RPC的超时
    pub executor_request_timeout_seconds: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8080".to_string(),
            access_token: None,
            pre_read_ms: 5000,
            trigger_pool_fast_max: 200,
            trigger_pool_slow_max: 100,
            fast_queue_capacity: 2000,
            slow_queue_capacity: 5000,
            slow_trigger_threshold_ms: 500,
            slow_trigger_limit: 10,
            beat_interval_seconds: 30,
            dead_timeout_seconds: 90,
            lost_job_scan_interval_seconds: 60,
            lost_job_threshold_minutes: 10,
            ring_drain_wait_ms: 8000,
            handle_msg_max_len: 15000,
            registry_pool_size: 10,
            callback_pool_size: 10,
            executor_request_timeout_seconds: 3,
        }
    }
}

impl AdminConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(anyhow::anyhow!("调度中心监听地址格式无效: {}", self.bind_address));
        }

        if self.pre_read_ms <= 0 {
            return Err(anyhow::anyhow!("预读窗口必须大于0"));
        }

        if self.trigger_pool_fast_max < 10 {
            return Err(anyhow::anyhow!("快线程池最大线程数不能小于10"));
        }

        if self.trigger_pool_slow_max < 10 {
            return Err(anyhow::anyhow!("慢线程池最大线程数不能小于10"));
        }

        if self.fast_queue_capacity == 0 || self.slow_queue_capacity == 0 {
            return Err(anyhow::anyhow!("触发队列容量必须大于0"));
        }

        if self.beat_interval_seconds == 0 {
            return Err(anyhow::anyhow!("心跳间隔必须大于0"));
        }

        if self.dead_timeout_seconds <= self.beat_interval_seconds {
            return Err(anyhow::anyhow!("失效超时必须大于心跳间隔"));
        }

        if self.lost_job_scan_interval_seconds == 0 || self.lost_job_threshold_minutes <= 0 {
            return Err(anyhow::anyhow!("结果丢失检测参数必须大于0"));
        }

        if self.registry_pool_size == 0 || self.callback_pool_size == 0 {
            return Err(anyhow::anyhow!("注册与回调处理线程数必须大于0"));
        }

        Ok(())
    }

    /// 单轮预读上限，与两个触发池的总吞吐成正比
    pub fn pre_read_count(&self) -> usize {
        (self.trigger_pool_fast_max + self.trigger_pool_slow_max) * 20
    }

    pub fn beat_interval(&self) -> Duration {
        Duration::from_secs(self.beat_interval_seconds)
    }

    pub fn dead_timeout(&self) -> Duration {
        Duration::from_secs(self.dead_timeout_seconds)
    }
}

/// 执行器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub enabled: bool,
    /// 对应调度中心的执行器分组
    pub app_name: String,
    /// 显式指定的注册地址，为空时由 `ip` 与 `port` 拼接
    pub address: Option<String>,
    pub ip: Option<String>,
    pub port: u16,
    pub bind_address: String,
    pub admin_addresses: Vec<String>,
    pub access_token: Option<String>,

    pub log_path: String,
    pub callback_backlog_path: String,

    /// 上报给调度中心的线程容量
    pub max_thread_count: u32,
    pub queue_capacity: usize,
    /// 队列连续为空的轮询次数达到该值后作业线程自行回收
    pub idle_poll_limit: u32,
    pub poll_timeout_ms: u64,

    pub beat_interval_seconds: u64,
    pub thread_report_interval_seconds: u64,
    pub admin_request_timeout_seconds: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            app_name: "job-executor".to_string(),
            address: None,
            ip: None,
            port: 9999,
            bind_address: "0.0.0.0:9999".to_string(),
            admin_addresses: vec!["http://127.0.0.1:8080".to_string()],
            access_token: None,
            log_path: "data/logs/jobhandler".to_string(),
            callback_backlog_path: "data/logs/callbacklog".to_string(),
            max_thread_count: 2,
            queue_capacity: 1000,
            idle_poll_limit: 30,
            poll_timeout_ms: 1000,
            beat_interval_seconds: 30,
            thread_report_interval_seconds: 5,
            admin_request_timeout_seconds: 3,
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.app_name.trim().is_empty() {
            return Err(anyhow::anyhow!("执行器应用名不能为空"));
        }

        if self.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(anyhow::anyhow!("执行器监听地址格式无效: {}", self.bind_address));
        }

        if self.admin_addresses.is_empty() {
            return Err(anyhow::anyhow!("调度中心地址不能为空"));
        }

        if self.max_thread_count == 0 {
            return Err(anyhow::anyhow!("线程容量必须大于0"));
        }

        if self.queue_capacity == 0 {
            return Err(anyhow::anyhow!("触发队列容量必须大于0"));
        }

        if self.poll_timeout_ms == 0 {
            return Err(anyhow::anyhow!("队列轮询超时必须大于0"));
        }

        if self.beat_interval_seconds == 0 || self.thread_report_interval_seconds == 0 {
            return Err(anyhow::anyhow!("心跳与上报间隔必须大于0"));
        }

        Ok(())
    }

    /// 注册到调度中心的地址
    pub fn resolved_address(&self, fallback_host: &str) -> String {
        if let Some(address) = self.address.as_deref().filter(|a| !a.trim().is_empty()) {
            return address.trim().to_string();
        }

        let host = self
            .ip
            .as_deref()
            .filter(|ip| !ip.trim().is_empty())
            .unwrap_or(fallback_host);
        format!("http://{}:{}", host, self.port)
    }

    pub fn beat_interval(&self) -> Duration {
        Duration::from_secs(self.beat_interval_seconds)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}
