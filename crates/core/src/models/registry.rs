use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 注册类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistryType {
    Executor,
    Admin,
}

impl RegistryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryType::Executor => "EXECUTOR",
            RegistryType::Admin => "ADMIN",
        }
    }
}

/// 执行器心跳注册参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryParam {
    /// 注册类型，通常为 `EXECUTOR`
    pub registry_group: String,
    /// 执行器应用名，对应 `JobGroup::app_name`
    pub registry_key: String,
    /// 执行器地址
    pub registry_value: String,
    #[serde(default)]
    pub running_count: u32,
    #[serde(default)]
    pub thread_capacity: u32,
}

impl RegistryParam {
    pub fn executor(app_name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            registry_group: RegistryType::Executor.as_str().to_string(),
            registry_key: app_name.into(),
            registry_value: address.into(),
            running_count: 0,
            thread_capacity: 0,
        }
    }

    pub fn with_occupancy(mut self, running_count: u32, thread_capacity: u32) -> Self {
        self.running_count = running_count;
        self.thread_capacity = thread_capacity;
        self
    }

    /// 分组、应用名、地址均不能为空
    pub fn is_valid(&self) -> bool {
        !self.registry_group.trim().is_empty()
            && !self.registry_key.trim().is_empty()
            && !self.registry_value.trim().is_empty()
    }
}

/// 注册表中的一条存活记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub id: i64,
    pub registry_group: String,
    pub registry_key: String,
    pub registry_value: String,
    pub running_count: u32,
    pub thread_capacity: u32,
    pub update_time: DateTime<Utc>,
}
