//! 订阅注册表
//!
//! 服务端持有的身份 → 订阅记录映射。同一身份最多一条记录：register 为
//! 整体覆盖式 upsert（后写者胜），delete 幂等，存储层故障以
//! `RegistryUnavailable` 上抛，绝不静默丢失。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::types::{DeviceSubscription, SubscriptionRecord};

/// 订阅注册表接口
#[async_trait]
pub trait SubscriptionRegistry: Send + Sync {
    /// 写入或整体覆盖订阅记录
    async fn register(&self, identity: &str, handle: DeviceSubscription) -> Result<()>;

    /// 删除订阅记录（不存在时不报错）
    async fn delete(&self, identity: &str) -> Result<()>;

    /// 读取订阅记录
    async fn get(&self, identity: &str) -> Result<Option<SubscriptionRecord>>;
}

/// 内存注册表
///
/// 用于测试与单进程部署；按身份整体替换，读写互斥由 RwLock 保证。
pub struct MemoryRegistry {
    records: RwLock<HashMap<String, SubscriptionRecord>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// 当前记录数
    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubscriptionRegistry for MemoryRegistry {
    async fn register(&self, identity: &str, handle: DeviceSubscription) -> Result<()> {
        let record = SubscriptionRecord {
            identity: identity.to_string(),
            handle,
            created_at: Utc::now(),
        };
        self.records
            .write()
            .await
            .insert(identity.to_string(), record);
        debug!("Registered subscription for identity: {}", identity);
        Ok(())
    }

    async fn delete(&self, identity: &str) -> Result<()> {
        self.records.write().await.remove(identity);
        debug!("Deleted subscription for identity: {}", identity);
        Ok(())
    }

    async fn get(&self, identity: &str) -> Result<Option<SubscriptionRecord>> {
        Ok(self.records.read().await.get(identity).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubscriptionKeys;

    fn handle(endpoint: &str) -> DeviceSubscription {
        let mut p256dh = vec![0x04u8];
        p256dh.extend_from_slice(&[0xab; 64]);
        DeviceSubscription {
            endpoint: endpoint.to_string(),
            keys: SubscriptionKeys {
                p256dh,
                auth: vec![0x11; 16],
            },
        }
    }

    #[tokio::test]
    async fn test_register_is_last_write_wins() {
        let registry = MemoryRegistry::new();
        registry.register("user-1", handle("https://push.example/a")).await.unwrap();
        registry.register("user-1", handle("https://push.example/b")).await.unwrap();

        let record = registry.get("user-1").await.unwrap().unwrap();
        assert_eq!(record.handle.endpoint, "https://push.example/b");
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_get_absent_identity() {
        let registry = MemoryRegistry::new();
        assert!(registry.get("nobody").await.unwrap().is_none());
    }

    #[test]
    fn test_delete_is_idempotent() {
        tokio_test::block_on(async {
            let registry = MemoryRegistry::new();
            registry.register("user-1", handle("https://push.example/a")).await.unwrap();
            registry.delete("user-1").await.unwrap();
            registry.delete("user-1").await.unwrap();
            assert!(registry.get("user-1").await.unwrap().is_none());
        });
    }
}
