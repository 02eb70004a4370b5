use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use scheduler_api::{create_admin_app, create_executor_app};
use scheduler_core::config::{AppConfig, DatabaseBackend};
use scheduler_dispatcher::{Coordinator, CoordinatorRepositories, HttpExecutorClientPool};
use scheduler_infrastructure::{
    DatabaseManager, InMemoryStore, MetricsCollector, PostgresJobExecutorMappingRepository,
    PostgresJobGroupRepository, PostgresJobInfoRepository, PostgresJobLogRepository,
    PostgresRegistryRepository, PostgresScheduleLock,
};
use scheduler_worker::{ExecutorRuntime, HandleResult, HandlerRegistry};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 仅运行调度中心
    Admin,
    /// 仅运行执行器
    Executor,
    /// 同一进程内运行调度中心与执行器
    All,
}

impl AppMode {
    fn runs_admin(self) -> bool {
        matches!(self, AppMode::Admin | AppMode::All)
    }

    fn runs_executor(self) -> bool {
        matches!(self, AppMode::Executor | AppMode::All)
    }
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    metrics: Arc<MetricsCollector>,
    handlers: Arc<HandlerRegistry>,
}

impl Application {
    pub fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("初始化应用程序，模式: {:?}", mode);

        // 指标句柄在创建时绑定记录器，导出器必须先安装
        if config.observability.metrics_enabled {
            MetricsCollector::install_prometheus_exporter(
                &config.observability.metrics_bind_address,
            )?;
        }

        Ok(Self {
            config,
            mode,
            metrics: Arc::new(MetricsCollector::new()),
            handlers: Arc::new(default_handlers()),
        })
    }

    /// 替换执行器的作业处理器
    pub fn with_handlers(mut self, handlers: Arc<HandlerRegistry>) -> Self {
        self.handlers = handlers;
        self
    }

    /// 运行直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let running = self.start().await?;

        let _ = shutdown_rx.recv().await;
        info!("应用收到关闭信号");

        running.stop().await;
        Ok(())
    }

    /// 按模式启动组件
    pub async fn start(&self) -> Result<RunningApplication> {
        let admin = if self.mode.runs_admin() {
            Some(self.start_admin().await?)
        } else {
            None
        };

        let executor = if self.mode.runs_executor() {
            match self.start_executor().await {
                Ok(executor) => Some(executor),
                Err(e) => {
                    if let Some(admin) = admin {
                        admin.stop().await;
                    }
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(RunningApplication { admin, executor })
    }

    async fn start_admin(&self) -> Result<RunningAdmin> {
        let config = &self.config.admin;
        info!("启动调度中心: {}", config.bind_address);

        let repositories = create_repositories(&self.config).await?;
        let clients = HttpExecutorClientPool::new(
            config.access_token.clone(),
            Duration::from_secs(config.executor_request_timeout_seconds),
        )
        .context("创建执行器客户端失败")?;

        let coordinator = Coordinator::new(
            repositories.clone(),
            Arc::new(clients),
            Arc::clone(&self.metrics),
            config,
        );

        let listener = TcpListener::bind(&config.bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {}", config.bind_address))?;
        let app = create_admin_app(&coordinator, config.access_token.as_deref());
        let server = HttpServer::serve("调度中心", listener, app)?;

        coordinator.start();
        info!("调度中心启动在 http://{}", server.local_addr);

        Ok(RunningAdmin {
            coordinator,
            repositories,
            server,
        })
    }

    async fn start_executor(&self) -> Result<RunningExecutor> {
        let mut config = self.config.executor.clone();
        info!("启动执行器: app={}, bind={}", config.app_name, config.bind_address);

        let listener = TcpListener::bind(&config.bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {}", config.bind_address))?;
        let local_addr = listener.local_addr().context("读取监听地址失败")?;
        if config.port == 0 {
            config.port = local_addr.port();
        }

        let access_token = config.access_token.clone();
        let runtime = ExecutorRuntime::builder(config)
            .handlers(Arc::clone(&self.handlers))
            .metrics(Arc::clone(&self.metrics))
            .build()
            .context("创建执行器失败")?;

        let app = create_executor_app(runtime.executor_biz(), access_token.as_deref());
        let server = HttpServer::serve("执行器", listener, app)?;

        runtime.start();
        info!("执行器启动在 http://{}，注册地址 {}", server.local_addr, runtime.address());

        Ok(RunningExecutor { runtime, server })
    }
}

/// 已启动的组件
pub struct RunningApplication {
    admin: Option<RunningAdmin>,
    executor: Option<RunningExecutor>,
}

impl RunningApplication {
    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin.as_ref().map(|admin| admin.server.local_addr)
    }

    pub fn executor_addr(&self) -> Option<SocketAddr> {
        self.executor.as_ref().map(|executor| executor.server.local_addr)
    }

    pub fn coordinator(&self) -> Option<&Coordinator> {
        self.admin.as_ref().map(|admin| &admin.coordinator)
    }

    pub fn repositories(&self) -> Option<&CoordinatorRepositories> {
        self.admin.as_ref().map(|admin| &admin.repositories)
    }

    pub fn executor(&self) -> Option<&ExecutorRuntime> {
        self.executor.as_ref().map(|executor| &executor.runtime)
    }

    /// 先停执行器，使其注销与剩余回调仍能送达调度中心
    pub async fn stop(self) {
        if let Some(executor) = self.executor {
            executor.stop().await;
        }
        if let Some(admin) = self.admin {
            admin.stop().await;
        }
        info!("所有组件已停止");
    }
}

struct RunningAdmin {
    coordinator: Coordinator,
    repositories: CoordinatorRepositories,
    server: HttpServer,
}

impl RunningAdmin {
    async fn stop(self) {
        self.server.stop().await;
        self.coordinator.stop().await;
    }
}

struct RunningExecutor {
    runtime: ExecutorRuntime,
    server: HttpServer,
}

impl RunningExecutor {
    async fn stop(self) {
        self.server.stop().await;
        self.runtime.stop().await;
    }
}

struct HttpServer {
    name: &'static str,
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl HttpServer {
    fn serve(name: &'static str, listener: TcpListener, app: Router) -> Result<Self> {
        let local_addr = listener.local_addr().context("读取监听地址失败")?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                error!("{}HTTP服务运行失败: {}", name, e);
            }
        });

        Ok(Self {
            name,
            local_addr,
            shutdown_tx,
            handle,
        })
    }

    async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.handle.await {
            warn!("{}HTTP服务退出异常: {}", self.name, e);
        }
        info!("{}HTTP服务已停止", self.name);
    }
}

/// 按存储后端创建仓储
async fn create_repositories(config: &AppConfig) -> Result<CoordinatorRepositories> {
    match config.database.backend {
        DatabaseBackend::Memory => {
            warn!("使用内存存储，数据不会持久化");
            Ok(CoordinatorRepositories::in_memory(&InMemoryStore::new()))
        }
        DatabaseBackend::Postgres => {
            info!("连接数据库: {}", mask_database_url(&config.database.url));
            let manager = DatabaseManager::new(&config.database).await?;
            let pool = manager.pool();

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("运行数据库迁移失败")?;
            info!("数据库连接成功");

            Ok(CoordinatorRepositories {
                jobs: Arc::new(PostgresJobInfoRepository::new(pool.clone())),
                groups: Arc::new(PostgresJobGroupRepository::new(pool.clone())),
                logs: Arc::new(PostgresJobLogRepository::new(pool.clone())),
                registry: Arc::new(PostgresRegistryRepository::new(pool.clone())),
                mappings: Arc::new(PostgresJobExecutorMappingRepository::new(pool.clone())),
                lock: Arc::new(PostgresScheduleLock::new(pool)),
            })
        }
    }
}

/// 内置的演示处理器
fn default_handlers() -> HandlerRegistry {
    let handlers = HandlerRegistry::new();
    handlers.register_fn("demoJobHandler", |ctx| async move {
        ctx.log(format!(
            "demoJobHandler: param={}, shard={}/{}",
            ctx.job_param, ctx.shard_index, ctx.shard_total
        ));
        HandleResult::success()
    });
    handlers
}

/// 屏蔽数据库URL中的密码
fn mask_database_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let mut masked = url.to_string();
            masked.replace_range(colon_pos + 1..at_pos, "***");
            return masked;
        }
    }
    url.to_string()
}
