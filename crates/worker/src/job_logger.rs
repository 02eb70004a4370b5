//! 每次执行一份日志文件，路径为 `{log_path}/{yyyy-MM-dd}/{log_id}.log`，
//! 调度中心通过 `log` RPC 按行增量读取。

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use scheduler_core::models::LogResult;

pub const LOG_FILE_NOT_FOUND: &str = "readLog fail, logFile not exists";

#[derive(Debug, Clone)]
pub struct JobFileLogger {
    base_path: PathBuf,
}

impl JobFileLogger {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// 日志按触发日期分目录存放
    pub fn log_file(&self, log_date_time: i64, log_id: i64) -> PathBuf {
        let date = DateTime::<Utc>::from_timestamp_millis(log_date_time)
            .unwrap_or_else(Utc::now)
            .format("%Y-%m-%d")
            .to_string();
        self.base_path.join(date).join(format!("{log_id}.log"))
    }

    pub fn appender(&self, log_date_time: i64, log_id: i64) -> JobLogAppender {
        JobLogAppender {
            path: Arc::new(self.log_file(log_date_time, log_id)),
        }
    }

    /// 从 `from_line`（从1开始）读取到文件末尾
    pub async fn read(&self, log_date_time: i64, log_id: i64, from_line: u32) -> LogResult {
        let path = self.log_file(log_date_time, log_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(_) => {
                return LogResult {
                    from_line_num: from_line,
                    to_line_num: 0,
                    log_content: LOG_FILE_NOT_FOUND.to_string(),
                    is_end: true,
                }
            }
        };

        let from_line = from_line.max(1);
        let mut to_line = 0;
        let mut lines = Vec::new();
        for (index, line) in content.lines().enumerate() {
            to_line = index as u32 + 1;
            if to_line >= from_line {
                lines.push(line);
            }
        }

        LogResult {
            from_line_num: from_line,
            to_line_num: to_line,
            log_content: lines.join("\n"),
            is_end: false,
        }
    }
}

/// 单个日志文件的追加写入器
#[derive(Debug, Clone)]
pub struct JobLogAppender {
    path: Arc<PathBuf>,
}

impl JobLogAppender {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, message: &str) {
        if let Err(e) = self.write_line(message) {
            warn!("写入作业日志失败: path={}, error={}", self.path.display(), e);
        }
    }

    fn write_line(&self, message: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_ref())?;
        let now = Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");
        for line in message.lines() {
            writeln!(file, "{now} {line}")?;
        }
        Ok(())
    }
}
