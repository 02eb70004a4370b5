use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::info;

use scheduler_core::models::{ExecutorStatus, ThreadInfo};

use crate::job_thread::JobThread;

/// 作业ID到作业线程的映射
///
/// 同一作业ID任意时刻最多一个存活线程。注册与替换都在 DashMap 的分片锁内完成。
#[derive(Default)]
pub struct JobThreadRegistry {
    threads: DashMap<i64, Arc<JobThread>>,
}

impl JobThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, job_id: i64) -> Option<Arc<JobThread>> {
        self.threads.get(&job_id).map(|entry| Arc::clone(entry.value()))
    }

    /// 返回已有的存活线程，没有或已关闭时注册新线程
    pub fn get_or_register(
        &self,
        job_id: i64,
        create: impl FnOnce() -> Arc<JobThread>,
    ) -> Arc<JobThread> {
        match self.threads.entry(job_id) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_closed() {
                    let thread = create();
                    entry.insert(Arc::clone(&thread));
                    thread
                } else {
                    Arc::clone(entry.get())
                }
            }
            Entry::Vacant(entry) => {
                let thread = create();
                entry.insert(Arc::clone(&thread));
                thread
            }
        }
    }

    /// 用新线程替换旧线程，旧线程以 `reason` 停止
    pub fn replace(&self, thread: Arc<JobThread>, reason: &str) -> Option<Arc<JobThread>> {
        let old = self.threads.insert(thread.job_id(), thread);
        if let Some(old) = &old {
            old.stop(reason);
        }
        old
    }

    /// 移除并停止线程
    pub fn remove(&self, job_id: i64, reason: &str) -> Option<Arc<JobThread>> {
        let (_, thread) = self.threads.remove(&job_id)?;
        thread.stop(reason);
        Some(thread)
    }

    /// 仅当映射中仍是该线程时移除
    pub fn remove_if_same(&self, job_id: i64, thread: &Arc<JobThread>) -> bool {
        self.threads
            .remove_if(&job_id, |_, current| Arc::ptr_eq(current, thread))
            .is_some()
    }

    pub fn threads(&self) -> Vec<Arc<JobThread>> {
        self.threads
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn status(&self, thread_capacity: u32) -> ExecutorStatus {
        let mut running_count = 0u32;
        let mut pending_count = 0u32;
        for thread in self.threads() {
            if thread.is_running_or_has_queue() {
                running_count += 1;
            }
            pending_count += thread.pending_count() as u32;
        }
        ExecutorStatus {
            thread_capacity,
            running_count,
            pending_count,
        }
    }

    pub fn thread_infos(&self, app_name: &str, address: &str) -> Vec<ThreadInfo> {
        let mut infos: Vec<ThreadInfo> = self
            .threads()
            .iter()
            .map(|thread| thread.thread_info(app_name, address))
            .collect();
        infos.sort_by_key(|info| info.job_id);
        infos
    }

    /// 停止全部线程并等待其排空退出
    pub async fn stop_all(&self, reason: &str) {
        let job_ids: Vec<i64> = self.threads.iter().map(|entry| *entry.key()).collect();
        let mut stopped = Vec::with_capacity(job_ids.len());
        for job_id in job_ids {
            if let Some(thread) = self.remove(job_id, reason) {
                stopped.push(thread);
            }
        }
        for thread in &stopped {
            thread.join().await;
        }
        info!("全部作业线程已停止: count={}", stopped.len());
    }
}
