//! 消息分发引擎
//!
//! 从注册表读取订阅记录，将应用消息加密、签名后单次投递到推送服务端点，
//! 并按响应码解释投递结果。不自动重试，不持久化投递状态。

use std::sync::Arc;

use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::keys::ApplicationServerKeys;
use crate::protocol::WebPushProtocol;
use crate::registry::SubscriptionRegistry;
use crate::types::{DeliveryResult, OutboundMessage, Urgency};

/// 分发配置
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// VAPID sub 声明（mailto: 或 https: 联系方式）
    pub contact: String,
    /// 推送服务保留消息的秒数（TTL 头）
    pub ttl: u32,
    /// 消息紧急程度
    pub urgency: Urgency,
    /// 请求超时（秒）
    pub timeout: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            contact: "mailto:admin@example.com".to_string(),
            ttl: 2_419_200,
            urgency: Urgency::Normal,
            timeout: 30,
        }
    }
}

/// 分发引擎
pub struct DispatchEngine<R: SubscriptionRegistry> {
    config: DispatchConfig,
    http_client: Client,
    protocol: WebPushProtocol,
    keys: ApplicationServerKeys,
    registry: Arc<R>,
}

impl<R: SubscriptionRegistry> DispatchEngine<R> {
    /// 创建分发引擎
    pub fn new(
        keys: ApplicationServerKeys,
        registry: Arc<R>,
        config: DispatchConfig,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
            protocol: WebPushProtocol::new(),
            keys,
            registry,
        })
    }

    /// 发送一条消息
    ///
    /// 单次同步往返；没有订阅记录时直接返回，不发起网络请求。
    pub async fn send(&self, identity: &str, message: &OutboundMessage) -> Result<DeliveryResult> {
        let record = match self.registry.get(identity).await? {
            Some(record) => record,
            None => {
                debug!("No subscription record for identity: {}", identity);
                return Ok(DeliveryResult::NotSubscribed);
            }
        };

        let payload = message.payload()?;
        let body = self.protocol.encrypt(&record.handle.keys, &payload)?;
        let authorization = self.protocol.vapid_authorization(
            &record.handle.endpoint,
            &self.keys,
            &self.config.contact,
        )?;

        debug!(
            "Delivering {} byte payload to {}",
            payload.len(),
            record.handle.endpoint
        );
        let response = self
            .http_client
            .post(&record.handle.endpoint)
            .header("Authorization", authorization)
            .header("Content-Encoding", "aes128gcm")
            .header("Content-Type", "application/octet-stream")
            .header("TTL", self.config.ttl.to_string())
            .header("Urgency", self.config.urgency.as_str())
            .body(body)
            .send()
            .await;

        match response {
            Ok(response) => self.settle(identity, response.status()).await,
            Err(e) => {
                // 超时与连接失败按临时失败处理，重试策略留给调用方
                warn!("Push service request failed: {}", e);
                Ok(DeliveryResult::TemporaryFailure)
            }
        }
    }

    /// 按推送服务的响应码落账
    async fn settle(&self, identity: &str, status: StatusCode) -> Result<DeliveryResult> {
        if status.is_success() {
            debug!("Delivered notification for identity: {}", identity);
            return Ok(DeliveryResult::Delivered);
        }

        match status.as_u16() {
            // 端点已被推送服务判死：清掉记录，自愈
            404 | 410 => {
                info!(
                    "Subscription for {} is gone (HTTP {}), pruning",
                    identity,
                    status.as_u16()
                );
                self.registry.delete(identity).await?;
                Ok(DeliveryResult::StaleSubscription)
            }
            429 => Ok(DeliveryResult::TemporaryFailure),
            s if s >= 500 => Ok(DeliveryResult::TemporaryFailure),
            s => {
                warn!("Push service rejected request for {} (HTTP {})", identity, s);
                Ok(DeliveryResult::RejectedRequest { status: s })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;
    use crate::types::{DeviceSubscription, SubscriptionKeys};

    fn handle() -> DeviceSubscription {
        let mut p256dh = vec![0x04u8];
        p256dh.extend_from_slice(&[0xab; 64]);
        DeviceSubscription {
            endpoint: "https://push.example/abc".to_string(),
            keys: SubscriptionKeys {
                p256dh,
                auth: vec![0x11; 16],
            },
        }
    }

    fn engine(registry: Arc<MemoryRegistry>) -> DispatchEngine<MemoryRegistry> {
        DispatchEngine::new(
            ApplicationServerKeys::generate(),
            registry,
            DispatchConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_send_without_record_returns_not_subscribed() {
        let registry = Arc::new(MemoryRegistry::new());
        let engine = engine(registry);
        let result = engine
            .send("nobody", &OutboundMessage::text("Hello"))
            .await
            .unwrap();
        assert_eq!(result, DeliveryResult::NotSubscribed);
    }

    #[tokio::test]
    async fn test_settle_success() {
        let registry = Arc::new(MemoryRegistry::new());
        let engine = engine(registry);
        let result = engine.settle("user-1", StatusCode::CREATED).await.unwrap();
        assert_eq!(result, DeliveryResult::Delivered);
    }

    #[tokio::test]
    async fn test_settle_gone_prunes_record() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.register("user-1", handle()).await.unwrap();
        let engine = engine(registry.clone());

        let result = engine.settle("user-1", StatusCode::GONE).await.unwrap();
        assert_eq!(result, DeliveryResult::StaleSubscription);
        // 之后的查询必须为空
        assert!(registry.get("user-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_settle_temporary_failures() {
        let registry = Arc::new(MemoryRegistry::new());
        let engine = engine(registry);

        let result = engine
            .settle("user-1", StatusCode::TOO_MANY_REQUESTS)
            .await
            .unwrap();
        assert_eq!(result, DeliveryResult::TemporaryFailure);

        let result = engine
            .settle("user-1", StatusCode::SERVICE_UNAVAILABLE)
            .await
            .unwrap();
        assert_eq!(result, DeliveryResult::TemporaryFailure);
    }

    #[tokio::test]
    async fn test_settle_rejected_request() {
        let registry = Arc::new(MemoryRegistry::new());
        let engine = engine(registry.clone());
        registry.register("user-1", handle()).await.unwrap();

        let result = engine
            .settle("user-1", StatusCode::PAYLOAD_TOO_LARGE)
            .await
            .unwrap();
        assert_eq!(result, DeliveryResult::RejectedRequest { status: 413 });
        // 普通 4xx 不清理记录
        assert!(registry.get("user-1").await.unwrap().is_some());
    }
}
