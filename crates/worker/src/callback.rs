//! # 回调通道
//!
//! 作业线程把执行结果推入无界队列，由独立的投递循环批量回传调度中心。
//! 投递失败的批次写入 [`CallbackBacklog`]，重试循环按心跳间隔重新投递，
//! 成功后才删除积压文件。同一结果可能被投递多次，由调度中心按日志ID去重。

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use scheduler_core::models::HandleCallbackParam;
use scheduler_core::traits::AdminBiz;
use scheduler_infrastructure::MetricsCollector;

use crate::backlog::CallbackBacklog;

/// 作业线程持有的回调入口
#[derive(Debug, Clone)]
pub struct CallbackSender {
    tx: mpsc::UnboundedSender<HandleCallbackParam>,
}

impl CallbackSender {
    pub fn push(&self, param: HandleCallbackParam) {
        let log_id = param.log_id;
        if self.tx.send(param).is_err() {
            error!("回调通道已关闭，执行结果未能入队: log_id={}", log_id);
        }
    }
}

pub struct CallbackChannel {
    tx: mpsc::UnboundedSender<HandleCallbackParam>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<HandleCallbackParam>>>,
    admin: Arc<dyn AdminBiz>,
    backlog: Arc<CallbackBacklog>,
    metrics: Arc<MetricsCollector>,
    retry_interval: Duration,
    deliver_shutdown: CancellationToken,
    retry_shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl CallbackChannel {
    pub fn new(
        admin: Arc<dyn AdminBiz>,
        backlog: Arc<CallbackBacklog>,
        metrics: Arc<MetricsCollector>,
        retry_interval: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            admin,
            backlog,
            metrics,
            retry_interval,
            deliver_shutdown: CancellationToken::new(),
            retry_shutdown: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn sender(&self) -> CallbackSender {
        CallbackSender {
            tx: self.tx.clone(),
        }
    }

    pub fn backlog(&self) -> &Arc<CallbackBacklog> {
        &self.backlog
    }

    pub fn start(self: &Arc<Self>) {
        let Some(rx) = self.rx.lock().take() else {
            warn!("回调通道已启动");
            return;
        };

        let channel = Arc::clone(self);
        let deliver = tokio::spawn(async move { channel.deliver_loop(rx).await });

        let channel = Arc::clone(self);
        let retry = tokio::spawn(async move { channel.retry_loop().await });

        self.handles.lock().extend([deliver, retry]);
        info!("回调通道已启动");
    }

    async fn deliver_loop(&self, mut rx: mpsc::UnboundedReceiver<HandleCallbackParam>) {
        loop {
            let first = tokio::select! {
                item = rx.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
                _ = self.deliver_shutdown.cancelled() => break,
            };

            let mut batch = vec![first];
            while let Ok(item) = rx.try_recv() {
                batch.push(item);
            }
            self.deliver(batch).await;
        }

        // 停止前把队列里剩下的结果再投递一次
        let mut rest = Vec::new();
        while let Ok(item) = rx.try_recv() {
            rest.push(item);
        }
        if !rest.is_empty() {
            self.deliver(rest).await;
        }
        info!("回调投递循环已停止");
    }

    /// 投递一批结果，失败时写入积压
    pub async fn deliver(&self, batch: Vec<HandleCallbackParam>) -> bool {
        let result = self.admin.callback(batch.clone()).await;
        if result.is_success() {
            debug!("回调投递成功: size={}", batch.len());
            return true;
        }

        warn!(
            "回调投递失败，写入积压: size={}, code={}, msg={}",
            batch.len(),
            result.code,
            result.msg_or_empty()
        );
        match self.backlog.write(&batch).await {
            Ok(_) => self.metrics.record_backlog_write(),
            Err(e) => error!("写入回调积压失败，{} 条结果丢失: {}", batch.len(), e),
        }
        false
    }

    async fn retry_loop(&self) {
        loop {
            tokio::select! {
                _ = self.retry_shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.retry_interval) => {}
            }
            self.retry_backlog().await;
        }
        info!("回调重试循环已停止");
    }

    /// 重新投递全部积压文件，返回成功删除的文件数
    pub async fn retry_backlog(&self) -> usize {
        let files = match self.backlog.list().await {
            Ok(files) => files,
            Err(e) => {
                error!("读取回调积压目录失败: {}", e);
                return 0;
            }
        };

        let mut delivered = 0;
        for path in files {
            let batch = match self.backlog.read(&path).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!("回调积压文件无法解析，保留原文件: path={}, error={}", path.display(), e);
                    continue;
                }
            };

            let result = self.admin.callback(batch).await;
            if !result.is_success() {
                debug!("回调积压重试失败: path={}, msg={}", path.display(), result.msg_or_empty());
                continue;
            }
            match self.backlog.remove(&path).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!("删除回调积压文件失败: path={}, error={}", path.display(), e),
            }
        }

        if delivered > 0 {
            info!("回调积压重试完成: delivered={}", delivered);
        }
        delivered
    }

    /// 停止投递与重试；调用前作业线程应已全部退出
    pub async fn stop(&self) {
        self.deliver_shutdown.cancel();
        self.retry_shutdown.cancel();
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("回调循环退出异常: {}", e);
            }
        }
        self.retry_backlog().await;
    }
}
