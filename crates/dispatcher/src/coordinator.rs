use std::sync::Arc;

use tracing::info;

use scheduler_core::config::AdminConfig;
use scheduler_core::traits::{
    AdminBiz, JobExecutorMappingRepository, JobGroupRepository, JobInfoRepository,
    JobLogRepository, JobRegistryRepository, ScheduleLock,
};
use scheduler_infrastructure::{InMemoryStore, MetricsCollector};

use crate::admin_service::AdminBizImpl;
use crate::completer::JobCompleter;
use crate::controller::JobController;
use crate::executor_client::ExecutorClientProvider;
use crate::job_trigger::JobTrigger;
use crate::registry::JobRegistryService;
use crate::scheduler::JobScheduler;
use crate::strategies::ExecutorRouter;
use crate::trigger_pool::{JobTriggerPool, TriggerSubmitter};

/// 调度中心依赖的全部仓储
#[derive(Clone)]
pub struct CoordinatorRepositories {
    pub jobs: Arc<dyn JobInfoRepository>,
    pub groups: Arc<dyn JobGroupRepository>,
    pub logs: Arc<dyn JobLogRepository>,
    pub registry: Arc<dyn JobRegistryRepository>,
    pub mappings: Arc<dyn JobExecutorMappingRepository>,
    pub lock: Arc<dyn ScheduleLock>,
}

impl CoordinatorRepositories {
    pub fn in_memory(store: &InMemoryStore) -> Self {
        Self {
            jobs: store.jobs.clone(),
            groups: store.groups.clone(),
            logs: store.logs.clone(),
            registry: store.registry.clone(),
            mappings: store.mappings.clone(),
            lock: store.lock.clone(),
        }
    }
}

/// 调度中心运行时
///
/// 进程内唯一的一组调度组件，按依赖顺序构建，按相反顺序停止。
pub struct Coordinator {
    pool: Arc<JobTriggerPool>,
    scheduler: Arc<JobScheduler>,
    registry: Arc<JobRegistryService>,
    completer: Arc<JobCompleter>,
    admin_biz: Arc<AdminBizImpl>,
    controller: Arc<JobController>,
}

impl Coordinator {
    /// 构建组件并启动触发线程池，调度循环在 `start` 之后才开始
    pub fn new(
        repos: CoordinatorRepositories,
        clients: Arc<dyn ExecutorClientProvider>,
        metrics: Arc<MetricsCollector>,
        config: &AdminConfig,
    ) -> Self {
        let router = Arc::new(ExecutorRouter::new(
            Arc::clone(&clients),
            Arc::clone(&repos.mappings),
        ));
        let trigger = Arc::new(JobTrigger::new(
            Arc::clone(&repos.jobs),
            Arc::clone(&repos.groups),
            Arc::clone(&repos.logs),
            router,
            Arc::clone(&metrics),
        ));
        let pool = JobTriggerPool::start(trigger, config, Arc::clone(&metrics));
        let submitter: Arc<dyn TriggerSubmitter> = pool.clone();

        let scheduler = Arc::new(JobScheduler::new(
            Arc::clone(&repos.jobs),
            Arc::clone(&repos.lock),
            Arc::clone(&submitter),
            Arc::clone(&metrics),
            config,
        ));
        let registry = Arc::new(JobRegistryService::new(
            Arc::clone(&repos.registry),
            Arc::clone(&repos.groups),
            Arc::clone(&metrics),
            config,
        ));
        let completer = Arc::new(JobCompleter::new(
            Arc::clone(&repos.logs),
            Arc::clone(&repos.jobs),
            Arc::clone(&registry),
            Arc::clone(&submitter),
            Arc::clone(&metrics),
            config,
        ));
        let admin_biz = Arc::new(AdminBizImpl::new(
            Arc::clone(&completer),
            Arc::clone(&registry),
            config.dead_timeout(),
        ));
        let controller = Arc::new(JobController::new(
            Arc::clone(&repos.jobs),
            Arc::clone(&repos.groups),
            Arc::clone(&repos.logs),
            submitter,
            clients,
            Arc::clone(&completer),
        ));

        Self {
            pool,
            scheduler,
            registry,
            completer,
            admin_biz,
            controller,
        }
    }

    pub fn start(&self) {
        self.registry.start();
        self.completer.start();
        self.scheduler.start();
        info!("调度中心已启动");
    }

    pub async fn stop(&self) {
        self.scheduler.stop().await;
        self.completer.stop().await;
        self.registry.stop().await;
        self.pool.stop().await;
        info!("调度中心已停止");
    }

    pub fn admin_biz(&self) -> Arc<dyn AdminBiz> {
        self.admin_biz.clone()
    }

    pub fn admin_service(&self) -> &Arc<AdminBizImpl> {
        &self.admin_biz
    }

    pub fn controller(&self) -> &Arc<JobController> {
        &self.controller
    }

    pub fn scheduler(&self) -> &Arc<JobScheduler> {
        &self.scheduler
    }
}
