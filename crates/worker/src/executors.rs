use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{error, info};

use scheduler_core::SchedulerResult;

use crate::handler::{HandleResult, HandlerRegistry, JobContext, JobHandler};
use crate::job_logger::JobLogAppender;

/// 内置HTTP处理器的注册名
pub const HTTP_HANDLER_NAME: &str = "httpJobHandler";

/// 注册执行器自带的处理器
pub fn register_builtin_handlers(registry: &HandlerRegistry) {
    registry.register(HTTP_HANDLER_NAME, std::sync::Arc::new(HttpJobHandler::new()));
}

/// Shell脚本处理器
///
/// 脚本源码随调度参数下发，按 `{job_id}_{glue_updatetime}.sh` 落盘后用 bash 执行，
/// 参数依次为执行参数、分片序号、分片总数。标准输出与标准错误逐行写入作业日志。
pub struct ShellJobHandler {
    job_id: i64,
    glue_source: String,
    glue_updatetime: i64,
    script_dir: PathBuf,
}

impl ShellJobHandler {
    pub fn new(
        job_id: i64,
        glue_source: impl Into<String>,
        glue_updatetime: i64,
        script_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            job_id,
            glue_source: glue_source.into(),
            glue_updatetime,
            script_dir: script_dir.into(),
        }
    }

    pub fn glue_updatetime(&self) -> i64 {
        self.glue_updatetime
    }

    pub fn script_path(&self) -> PathBuf {
        self.script_dir
            .join(format!("{}_{}.sh", self.job_id, self.glue_updatetime))
    }

    async fn write_script(&self) -> SchedulerResult<PathBuf> {
        let path = self.script_path();
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(path);
        }
        tokio::fs::create_dir_all(&self.script_dir).await?;
        tokio::fs::write(&path, self.glue_source.as_bytes()).await?;
        Ok(path)
    }
}

async fn pump_lines<R>(reader: R, logger: JobLogAppender)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        logger.append(&line);
    }
}

#[async_trait]
impl JobHandler for ShellJobHandler {
    async fn init(&self) -> SchedulerResult<()> {
        self.write_script().await.map(|_| ())
    }

    async fn execute(&self, ctx: JobContext) -> HandleResult {
        let start_time = Instant::now();
        let script = match self.write_script().await {
            Ok(script) => script,
            Err(e) => return HandleResult::fail(format!("写入脚本失败: {e}")),
        };

        info!(
            "执行Shell脚本: job_id={}, log_id={}, script={}",
            ctx.job_id,
            ctx.log_id,
            script.display()
        );

        let mut cmd = Command::new("bash");
        cmd.arg(&script)
            .arg(&ctx.job_param)
            .arg(ctx.shard_index.to_string())
            .arg(ctx.shard_total.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return HandleResult::fail(format!("启动Shell命令失败: {e}")),
        };
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let out_logger = ctx.logger().clone();
        let err_logger = ctx.logger().clone();
        let run = async move {
            let stdout_task = async {
                if let Some(stdout) = stdout {
                    pump_lines(stdout, out_logger).await;
                }
            };
            let stderr_task = async {
                if let Some(stderr) = stderr {
                    pump_lines(stderr, err_logger).await;
                }
            };
            tokio::join!(stdout_task, stderr_task);
            child.wait().await
        };

        let status = tokio::select! {
            status = run => status,
            _ = ctx.cancellation().cancelled() => {
                return HandleResult::fail("脚本执行已终止");
            }
        };

        match status {
            Ok(status) if status.success() => {
                info!(
                    "Shell脚本执行完成: job_id={}, duration={}ms",
                    ctx.job_id,
                    start_time.elapsed().as_millis()
                );
                HandleResult::success()
            }
            Ok(status) => HandleResult::fail(format!(
                "script exit value({}) is failed",
                status.code().unwrap_or(-1)
            )),
            Err(e) => {
                error!("等待脚本进程结束失败: job_id={}, error={}", ctx.job_id, e);
                HandleResult::fail(format!("等待进程结束失败: {e}"))
            }
        }
    }
}

/// HTTP处理器参数，执行参数为该结构的JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpTaskParams {
    pub url: String,
    pub method: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub body: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// 发起一次HTTP请求，2xx视为成功
pub struct HttpJobHandler {
    client: reqwest::Client,
}

impl HttpJobHandler {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpJobHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHandler for HttpJobHandler {
    async fn execute(&self, ctx: JobContext) -> HandleResult {
        let params: HttpTaskParams = match serde_json::from_str(&ctx.job_param) {
            Ok(params) => params,
            Err(e) => return HandleResult::fail(format!("解析HTTP任务参数失败: {e}")),
        };

        let method = params.method.unwrap_or_else(|| "GET".to_string());
        let mut request = match method.to_uppercase().as_str() {
            "GET" => self.client.get(&params.url),
            "POST" => self.client.post(&params.url),
            "PUT" => self.client.put(&params.url),
            "DELETE" => self.client.delete(&params.url),
            "PATCH" => self.client.patch(&params.url),
            "HEAD" => self.client.head(&params.url),
            _ => return HandleResult::fail(format!("不支持的HTTP方法: {method}")),
        };

        if let Some(timeout) = params.timeout_seconds {
            request = request.timeout(Duration::from_secs(timeout));
        }
        for (key, value) in params.headers.unwrap_or_default() {
            request = request.header(&key, &value);
        }
        if let Some(body) = params.body {
            request = request.body(body);
        }

        ctx.log(format!("HTTP {} {}", method, params.url));
        let response = tokio::select! {
            response = request.send() => response,
            _ = ctx.cancellation().cancelled() => return HandleResult::fail("HTTP请求已终止"),
        };

        match response {
            Ok(response) => {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|e| format!("读取响应体失败: {e}"));
                ctx.log(format!("Status: {}\nResponse:\n{}", status.as_u16(), body));
                if status.is_success() {
                    HandleResult::success()
                } else {
                    HandleResult::fail(format!("HTTP请求失败，状态码: {}", status.as_u16()))
                }
            }
            Err(e) => {
                error!("HTTP任务执行失败: job_id={}, error={}", ctx.job_id, e);
                HandleResult::fail(format!("HTTP请求失败: {e}"))
            }
        }
    }
}
