use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};

use job_scheduler::app::{AppMode, Application};
use job_scheduler::shutdown::{wait_for_shutdown_signal, ShutdownManager};
use scheduler_core::config::AppConfig;
use scheduler_core::logging::init_logging;

/// 分布式作业调度平台
#[derive(Debug, Parser)]
#[command(name = "job-scheduler", version, about = "分布式作业调度平台")]
struct Cli {
    /// 配置文件路径，为空时按默认路径查找
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// 运行模式
    #[arg(short, long, value_enum, default_value_t = Mode::All)]
    mode: Mode,

    /// 日志级别，覆盖配置文件
    #[arg(short, long, value_name = "LEVEL", value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    /// 日志格式，覆盖配置文件
    #[arg(long, value_name = "FORMAT", value_parser = ["json", "pretty"])]
    log_format: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Admin,
    Executor,
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).with_context(|| {
        format!("加载配置失败: {}", cli.config.as_deref().unwrap_or("默认路径"))
    })?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    init_logging(&config.logging)?;

    info!("启动分布式作业调度平台");
    info!("运行模式: {:?}", cli.mode);

    let mode = resolve_mode(cli.mode, &config)?;
    let app = Application::new(config, mode)?;

    let shutdown_manager = ShutdownManager::new();
    let shutdown_rx = shutdown_manager.subscribe().await;

    let mut app_handle = tokio::spawn(async move { app.run(shutdown_rx).await });

    tokio::select! {
        _ = wait_for_shutdown_signal() => {
            info!("收到关闭信号，开始优雅关闭...");
        }
        result = &mut app_handle => {
            // 启动失败时应用会提前退出
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(anyhow::anyhow!("应用任务异常退出: {e}")),
            };
        }
    }

    shutdown_manager.shutdown().await;

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Ok(Ok(()))) => info!("应用已优雅关闭"),
        Ok(Ok(Err(e))) => error!("应用关闭时发生错误: {e}"),
        Ok(Err(e)) => error!("应用任务异常退出: {e}"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    info!("分布式作业调度平台已退出");
    Ok(())
}

/// 按配置中启用的组件确定实际运行模式
fn resolve_mode(mode: Mode, config: &AppConfig) -> Result<AppMode> {
    match mode {
        Mode::Admin if !config.admin.enabled => Err(anyhow::anyhow!("调度中心被禁用，请检查配置")),
        Mode::Admin => Ok(AppMode::Admin),
        Mode::Executor if !config.executor.enabled => {
            Err(anyhow::anyhow!("执行器被禁用，请检查配置"))
        }
        Mode::Executor => Ok(AppMode::Executor),
        Mode::All => match (config.admin.enabled, config.executor.enabled) {
            (true, true) => Ok(AppMode::All),
            (true, false) => Ok(AppMode::Admin),
            (false, true) => Ok(AppMode::Executor),
            (false, false) => Err(anyhow::anyhow!("调度中心与执行器均被禁用，没有可启动的组件")),
        },
    }
}
