//! 调度中心与执行器之间的RPC报文

use serde::{Deserialize, Serialize};

use crate::models::BlockStrategy;
use crate::models::GlueType;

/// 访问令牌请求头
pub const ACCESS_TOKEN_HEADER: &str = "X-Job-Access-Token";

/// 成功
pub const SUCCESS_CODE: i32 = 200;
/// 失败
pub const FAIL_CODE: i32 = 500;
/// 执行超时
pub const TIMEOUT_CODE: i32 = 502;

/// 执行器侧路由
pub mod executor_paths {
    pub const BEAT: &str = "/beat";
    pub const IDLE_BEAT: &str = "/idleBeat";
    pub const RUN: &str = "/run";
    pub const KILL: &str = "/kill";
    pub const LOG: &str = "/log";
    pub const STATUS: &str = "/status";
    pub const FORCE_KILL: &str = "/forceKill";
}

/// 调度中心侧路由
pub mod admin_paths {
    pub const CALLBACK: &str = "/api/callback";
    pub const REGISTRY: &str = "/api/registry";
    pub const REGISTRY_REMOVE: &str = "/api/registryRemove";
    pub const REPORT_RUNNING_THREADS: &str = "/api/reportRunningThreads";
}

/// 统一响应体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnT<T = String> {
    pub code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub content: Option<T>,
}

impl<T> ReturnT<T> {
    pub fn success() -> Self {
        Self {
            code: SUCCESS_CODE,
            msg: None,
            content: None,
        }
    }

    pub fn success_with(content: T) -> Self {
        Self {
            code: SUCCESS_CODE,
            msg: None,
            content: Some(content),
        }
    }

    pub fn fail(msg: impl Into<String>) -> Self {
        Self::with_code(FAIL_CODE, msg)
    }

    pub fn with_code(code: i32, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: Some(msg.into()),
            content: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    pub fn msg_or_empty(&self) -> &str {
        self.msg.as_deref().unwrap_or("")
    }
}

/// 单次触发参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerParam {
    pub job_id: i64,
    pub executor_handler: String,
    pub executor_params: String,
    pub executor_block_strategy: BlockStrategy,
    /// 超时秒数，0表示不限制
    pub executor_timeout: i32,
    pub log_id: i64,
    pub log_date_time: i64,
    pub glue_type: GlueType,
    pub glue_source: String,
    pub glue_updatetime: i64,
    pub broadcast_index: u32,
    pub broadcast_total: u32,
}

impl TriggerParam {
    pub fn new(job_id: i64, log_id: i64, executor_handler: impl Into<String>) -> Self {
        Self {
            job_id,
            executor_handler: executor_handler.into(),
            executor_params: String::new(),
            executor_block_strategy: BlockStrategy::SerialExecution,
            executor_timeout: 0,
            log_id,
            log_date_time: chrono::Utc::now().timestamp_millis(),
            glue_type: GlueType::Bean,
            glue_source: String::new(),
            glue_updatetime: 0,
            broadcast_index: 0,
            broadcast_total: 1,
        }
    }
}

/// 执行结果回调
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleCallbackParam {
    pub log_id: i64,
    pub log_date_time: i64,
    pub handle_code: i32,
    pub handle_msg: Option<String>,
}

impl HandleCallbackParam {
    pub fn new(log_id: i64, log_date_time: i64, handle_code: i32, handle_msg: Option<String>) -> Self {
        Self {
            log_id,
            log_date_time,
            handle_code,
            handle_msg,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdleBeatParam {
    pub job_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillParam {
    pub job_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogParam {
    pub log_date_time: i64,
    pub log_id: i64,
    pub from_line_num: u32,
}

/// 增量日志读取结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogResult {
    pub from_line_num: u32,
    pub to_line_num: u32,
    pub log_content: String,
    pub is_end: bool,
}

/// 执行器线程占用情况
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorStatus {
    pub thread_capacity: u32,
    pub running_count: u32,
    pub pending_count: u32,
}

impl ExecutorStatus {
    /// 剩余可用容量，可能为负
    pub fn free(&self) -> i64 {
        i64::from(self.thread_capacity)
            - i64::from(self.running_count)
            - i64::from(self.pending_count)
    }
}

/// 执行器上报的运行中作业线程快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadInfo {
    pub job_id: i64,
    pub state: String,
    pub app_name: String,
    pub address: String,
    pub start_time: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_t_json_shape() {
        let ok: ReturnT<String> = ReturnT::success();
        assert_eq!(serde_json::to_string(&ok).unwrap(), r#"{"code":200}"#);

        let failed: ReturnT<String> = serde_json::from_str(r#"{"code":500,"msg":"boom"}"#).unwrap();
        assert!(!failed.is_success());
        assert_eq!(failed.msg_or_empty(), "boom");
    }

    #[test]
    fn test_trigger_param_camel_case() {
        let mut param = TriggerParam::new(7, 42, "demoHandler");
        param.executor_block_strategy = BlockStrategy::CoverEarly;
        let value = serde_json::to_value(&param).unwrap();
        assert_eq!(value["jobId"], 7);
        assert_eq!(value["logId"], 42);
        assert_eq!(value["executorBlockStrategy"], "COVER_EARLY");
        assert_eq!(value["glueType"], "BEAN");
    }

    #[test]
    fn test_executor_status_free() {
        let status = ExecutorStatus {
            thread_capacity: 2,
            running_count: 1,
            pending_count: 3,
        };
        assert_eq!(status.free(), -2);
    }
}
