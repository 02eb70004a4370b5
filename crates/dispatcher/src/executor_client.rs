use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use scheduler_core::models::{
    executor_paths, ExecutorStatus, IdleBeatParam, KillParam, LogParam, LogResult, ReturnT,
    TriggerParam, ACCESS_TOKEN_HEADER,
};
use scheduler_core::traits::ExecutorBiz;
use scheduler_core::{SchedulerError, SchedulerResult};

/// 按地址获取执行器客户端
pub trait ExecutorClientProvider: Send + Sync {
    fn executor(&self, address: &str) -> SchedulerResult<Arc<dyn ExecutorBiz>>;
}

/// 基于HTTP的执行器客户端
pub struct HttpExecutorClient {
    base_url: String,
    access_token: Option<String>,
    http_client: reqwest::Client,
}

impl HttpExecutorClient {
    pub fn new(
        address: &str,
        access_token: Option<String>,
        http_client: reqwest::Client,
    ) -> SchedulerResult<Self> {
        let base_url = address.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(SchedulerError::InvalidArgument("执行器地址不能为空".to_string()));
        }

        Ok(Self {
            base_url,
            access_token,
            http_client,
        })
    }

    pub fn address(&self) -> &str {
        &self.base_url
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> ReturnT<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http_client.post(&url).json(body);
        if let Some(token) = self.access_token.as_deref() {
            request = request.header(ACCESS_TOKEN_HEADER, token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("调用执行器失败: url={}, error={}", url, e);
                return ReturnT::fail(format!("调用执行器失败: address={}, error={}", self.base_url, e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("执行器返回异常状态: url={}, status={}", url, status);
            return ReturnT::fail(format!(
                "执行器返回异常状态: address={}, status={}, body={}",
                self.base_url, status, body
            ));
        }

        match response.json::<ReturnT<T>>().await {
            Ok(result) => {
                debug!("调用执行器完成: url={}, code={}", url, result.code);
                result
            }
            Err(e) => ReturnT::fail(format!(
                "解析执行器响应失败: address={}, error={}",
                self.base_url, e
            )),
        }
    }
}

#[async_trait]
impl ExecutorBiz for HttpExecutorClient {
    async fn beat(&self) -> ReturnT<String> {
        self.post(executor_paths::BEAT, &serde_json::json!({})).await
    }

    async fn idle_beat(&self, param: IdleBeatParam) -> ReturnT<String> {
        self.post(executor_paths::IDLE_BEAT, &param).await
    }

    async fn run(&self, param: TriggerParam) -> ReturnT<String> {
        self.post(executor_paths::RUN, &param).await
    }

    async fn kill(&self, param: KillParam) -> ReturnT<String> {
        self.post(executor_paths::KILL, &param).await
    }

    async fn log(&self, param: LogParam) -> ReturnT<LogResult> {
        self.post(executor_paths::LOG, &param).await
    }

    async fn status(&self) -> ReturnT<ExecutorStatus> {
        self.post(executor_paths::STATUS, &serde_json::json!({})).await
    }

    async fn force_kill(&self, param: KillParam) -> ReturnT<String> {
        self.post(executor_paths::FORCE_KILL, &param).await
    }
}

/// 按地址缓存的HTTP客户端池，所有客户端共享一个连接池
pub struct HttpExecutorClientPool {
    clients: DashMap<String, Arc<HttpExecutorClient>>,
    access_token: Option<String>,
    http_client: reqwest::Client,
}

impl HttpExecutorClientPool {
    pub fn new(access_token: Option<String>, timeout: Duration) -> SchedulerResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SchedulerError::Network(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            clients: DashMap::new(),
            access_token,
            http_client,
        })
    }
}

impl ExecutorClientProvider for HttpExecutorClientPool {
    fn executor(&self, address: &str) -> SchedulerResult<Arc<dyn ExecutorBiz>> {
        if let Some(client) = self.clients.get(address) {
            return Ok(client.clone());
        }

        let client = Arc::new(HttpExecutorClient::new(
            address,
            self.access_token.clone(),
            self.http_client.clone(),
        )?);
        let client = self
            .clients
            .entry(address.to_string())
            .or_insert(client)
            .clone();
        Ok(client)
    }
}
