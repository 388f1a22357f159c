//! 集成测试 - 需要本地推送接收端

use std::sync::Arc;

use async_trait::async_trait;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::SecretKey;
use rand::rngs::OsRng;
use rand::RngCore;

use web_push_core::{
    ApplicationServerKeys, DeliveryResult, DeviceSubscription, DispatchConfig, DispatchEngine,
    LifecycleController, LifecycleState, MemoryRegistry, OutboundMessage, PushPlatform, Result,
    SubscribeOptions, SubscriptionKeys, SubscriptionRegistry,
};

const SINK_URL: &str = "http://127.0.0.1:9009";

async fn sink_available() -> bool {
    let client = reqwest::Client::new();
    match client.get(format!("{}/health", SINK_URL)).send().await {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}

/// 平台桩：像浏览器一样生成订阅密钥，并把端点指向本地接收端
struct StubPlatform {
    endpoint: String,
}

#[async_trait]
impl PushPlatform for StubPlatform {
    async fn existing_subscription(&self) -> Result<Option<DeviceSubscription>> {
        Ok(None)
    }

    async fn subscribe(&self, _options: SubscribeOptions) -> Result<DeviceSubscription> {
        let device_secret = SecretKey::random(&mut OsRng);
        let p256dh = device_secret
            .public_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec();
        let mut auth = vec![0u8; 16];
        OsRng.fill_bytes(&mut auth);

        Ok(DeviceSubscription {
            endpoint: self.endpoint.clone(),
            keys: SubscriptionKeys { p256dh, auth },
        })
    }

    async fn unsubscribe(&self) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_end_to_end_delivery() {
    if !sink_available().await {
        // 本地推送接收端未运行，跳过此测试
        eprintln!("Push sink not running at {}, skipping", SINK_URL);
        return;
    }

    let registry = Arc::new(MemoryRegistry::new());
    let server_keys = ApplicationServerKeys::generate();

    let platform = StubPlatform {
        endpoint: format!("{}/push/abc", SINK_URL),
    };
    let controller = LifecycleController::new(
        platform,
        registry.clone(),
        "user-1",
        &server_keys.public_key_base64(),
    )
    .unwrap();

    assert_eq!(
        controller.bootstrap().await.unwrap(),
        LifecycleState::Unsubscribed
    );
    controller.subscribe().await.unwrap();
    assert!(registry.get("user-1").await.unwrap().is_some());

    let engine = DispatchEngine::new(server_keys, registry.clone(), DispatchConfig::default())
        .unwrap();
    let result = engine
        .send("user-1", &OutboundMessage::text("Hello"))
        .await
        .unwrap();
    assert_eq!(result, DeliveryResult::Delivered);
}

#[tokio::test]
async fn test_subscribe_then_unsubscribe_clears_registry() {
    let registry = Arc::new(MemoryRegistry::new());
    let server_keys = ApplicationServerKeys::generate();

    let platform = StubPlatform {
        endpoint: format!("{}/push/abc", SINK_URL),
    };
    let controller = LifecycleController::new(
        platform,
        registry.clone(),
        "user-1",
        &server_keys.public_key_base64(),
    )
    .unwrap();

    controller.subscribe().await.unwrap();
    assert!(registry.get("user-1").await.unwrap().is_some());

    controller.unsubscribe().await.unwrap();
    assert!(registry.get("user-1").await.unwrap().is_none());
    assert_eq!(controller.state().await, LifecycleState::Unsubscribed);
}

#[tokio::test]
async fn test_send_without_subscription() {
    let registry = Arc::new(MemoryRegistry::new());
    let engine = DispatchEngine::new(
        ApplicationServerKeys::generate(),
        registry,
        DispatchConfig::default(),
    )
    .unwrap();

    let result = engine
        .send("nobody", &OutboundMessage::text("Hello"))
        .await
        .unwrap();
    assert_eq!(result, DeliveryResult::NotSubscribed);
}
