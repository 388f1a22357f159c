//! 远程订阅注册表客户端
//!
//! 客户端 → 应用服务器的订阅上报 / 注销 / 查询调用。实现
//! [`SubscriptionRegistry`]，生命周期控制器可以像使用本地注册表一样
//! 使用远端注册表。

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::registry::SubscriptionRegistry;
use crate::types::{ApiResponse, DeviceSubscription, SubscriptionRecord, SubscriptionRecordJson};

/// 客户端配置
#[derive(Debug, Clone)]
pub struct RegistryClientConfig {
    /// 服务器 URL
    pub server_url: String,
    /// 请求超时（秒）
    pub timeout: u64,
    /// 是否验证 TLS 证书
    pub verify_tls: bool,
}

impl Default for RegistryClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".to_string(),
            timeout: 30,
            verify_tls: true,
        }
    }
}

/// 远程注册表客户端
pub struct RemoteRegistry {
    config: RegistryClientConfig,
    http_client: Client,
}

impl RemoteRegistry {
    /// 创建新的客户端实例
    pub fn new(config: RegistryClientConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// 使用默认配置创建客户端
    pub fn with_server_url(server_url: &str) -> Result<Self> {
        let mut config = RegistryClientConfig::default();
        config.server_url = server_url.to_string();
        Self::new(config)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<ApiResponse<T>> {
        let url = format!("{}{}", self.config.server_url, path);
        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                Error::RegistryUnavailable(format!("Failed to connect to {}: {}", url, e))
            })?;

        // 检查 HTTP 状态码
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response".to_string());
            return Err(Error::RegistryUnavailable(format!(
                "HTTP {} from {}: {}",
                status, url, body
            )));
        }

        response.json().await.map_err(|e| {
            Error::RegistryUnavailable(format!("Failed to parse response from {}: {}", url, e))
        })
    }
}

#[async_trait]
impl SubscriptionRegistry for RemoteRegistry {
    async fn register(&self, identity: &str, handle: DeviceSubscription) -> Result<()> {
        info!("Uploading subscription for identity: {}", identity);

        let api: ApiResponse<serde_json::Value> = self
            .post(
                "/api/push/subscribe",
                serde_json::json!({
                    "identity": identity,
                    "subscription": handle.to_json(),
                }),
            )
            .await?;

        if api.code != 0 {
            return Err(Error::RegistryUnavailable(format!(
                "code {}: {}",
                api.code, api.message
            )));
        }
        Ok(())
    }

    async fn delete(&self, identity: &str) -> Result<()> {
        info!("Removing subscription for identity: {}", identity);

        let api: ApiResponse<serde_json::Value> = self
            .post(
                "/api/push/unsubscribe",
                serde_json::json!({ "identity": identity }),
            )
            .await?;

        if api.code != 0 {
            return Err(Error::RegistryUnavailable(format!(
                "code {}: {}",
                api.code, api.message
            )));
        }
        Ok(())
    }

    async fn get(&self, identity: &str) -> Result<Option<SubscriptionRecord>> {
        debug!("Fetching subscription for identity: {}", identity);

        let api: ApiResponse<SubscriptionRecordJson> = self
            .post(
                "/api/push/subscription",
                serde_json::json!({ "identity": identity }),
            )
            .await?;

        if api.code != 0 {
            return Err(Error::RegistryUnavailable(format!(
                "code {}: {}",
                api.code, api.message
            )));
        }

        match api.data {
            None => Ok(None),
            Some(json) => Ok(Some(SubscriptionRecord::try_from(json)?)),
        }
    }
}
