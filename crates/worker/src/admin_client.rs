use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use scheduler_core::models::{
    admin_paths, HandleCallbackParam, RegistryParam, ReturnT, ThreadInfo, ACCESS_TOKEN_HEADER,
};
use scheduler_core::traits::AdminBiz;
use scheduler_core::{SchedulerError, SchedulerResult};

/// 基于HTTP的调度中心客户端
///
/// 配置了多个调度中心时按顺序尝试，第一个返回成功的即为结果。
pub struct HttpAdminClient {
    admin_addresses: Vec<String>,
    access_token: Option<String>,
    http_client: reqwest::Client,
}

impl HttpAdminClient {
    pub fn new(
        admin_addresses: &[String],
        access_token: Option<String>,
        timeout: Duration,
    ) -> SchedulerResult<Self> {
        let admin_addresses: Vec<String> = admin_addresses
            .iter()
            .map(|address| address.trim().trim_end_matches('/').to_string())
            .filter(|address| !address.is_empty())
            .collect();
        if admin_addresses.is_empty() {
            return Err(SchedulerError::Configuration("调度中心地址不能为空".to_string()));
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SchedulerError::Network(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            admin_addresses,
            access_token,
            http_client,
        })
    }

    pub fn admin_addresses(&self) -> &[String] {
        &self.admin_addresses
    }

    async fn post_one<B>(&self, base_url: &str, path: &str, body: &B) -> ReturnT<String>
    where
        B: Serialize + ?Sized + Sync,
    {
        let url = format!("{base_url}{path}");
        let mut request = self.http_client.post(&url).json(body);
        if let Some(token) = self.access_token.as_deref() {
            request = request.header(ACCESS_TOKEN_HEADER, token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return ReturnT::fail(format!("调用调度中心失败: address={base_url}, error={e}"))
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return ReturnT::fail(format!(
                "调度中心返回异常状态: address={base_url}, status={status}, body={body}"
            ));
        }

        match response.json::<ReturnT<String>>().await {
            Ok(result) => result,
            Err(e) => ReturnT::fail(format!(
                "解析调度中心响应失败: address={base_url}, error={e}"
            )),
        }
    }

    async fn post<B>(&self, path: &str, body: &B) -> ReturnT<String>
    where
        B: Serialize + ?Sized + Sync,
    {
        let mut last = ReturnT::fail("调度中心地址为空");
        for base_url in &self.admin_addresses {
            let result = self.post_one(base_url, path, body).await;
            if result.is_success() {
                debug!("调用调度中心完成: address={}, path={}", base_url, path);
                return result;
            }
            warn!(
                "调用调度中心失败: address={}, path={}, msg={}",
                base_url,
                path,
                result.msg_or_empty()
            );
            last = result;
        }
        last
    }
}

#[async_trait]
impl AdminBiz for HttpAdminClient {
    async fn callback(&self, params: Vec<HandleCallbackParam>) -> ReturnT<String> {
        self.post(admin_paths::CALLBACK, &params).await
    }

    async fn registry(&self, param: RegistryParam) -> ReturnT<String> {
        self.post(admin_paths::REGISTRY, &param).await
    }

    async fn registry_remove(&self, param: RegistryParam) -> ReturnT<String> {
        self.post(admin_paths::REGISTRY_REMOVE, &param).await
    }

    async fn report_running_threads(&self, threads: Vec<ThreadInfo>) -> ReturnT<String> {
        self.post(admin_paths::REPORT_RUNNING_THREADS, &threads).await
    }
}
