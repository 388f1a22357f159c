//! 数据类型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::{base64url_decode, base64url_encode};

/// 设备订阅密钥材料
///
/// p256dh 为未压缩的 P-256 公钥点（65 字节），auth 为 16 字节认证密钥。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionKeys {
    pub p256dh: Vec<u8>,
    pub auth: Vec<u8>,
}

/// 设备订阅句柄
///
/// 推送服务为当前设备分配的投递地址与加密材料。创建后不可变，
/// 重新订阅总是产生新的句柄，旧句柄直接丢弃。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSubscription {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

impl DeviceSubscription {
    /// 转换为线上传输格式
    pub fn to_json(&self) -> SubscriptionJson {
        SubscriptionJson {
            endpoint: self.endpoint.clone(),
            keys: SubscriptionKeysJson {
                p256dh: base64url_encode(&self.keys.p256dh),
                auth: base64url_encode(&self.keys.auth),
            },
        }
    }
}

/// 订阅记录（注册表持有）
#[derive(Debug, Clone)]
pub struct SubscriptionRecord {
    pub identity: String,
    pub handle: DeviceSubscription,
    pub created_at: DateTime<Utc>,
}

/// 待发送消息
///
/// 发送时即席构造，不做持久化；序列化为 JSON 载荷交由分发引擎加密。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl OutboundMessage {
    pub fn new(title: &str, body: &str) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            icon: None,
        }
    }

    /// 仅指定正文的便捷构造
    pub fn text(body: &str) -> Self {
        Self::new("Notification", body)
    }

    /// 序列化为加密前的原始载荷
    pub fn payload(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Encoding(e.to_string()))
    }
}

/// 消息紧急程度（Urgency 头）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Urgency {
    VeryLow,
    Low,
    #[default]
    Normal,
    High,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::VeryLow => "very-low",
            Urgency::Low => "low",
            Urgency::Normal => "normal",
            Urgency::High => "high",
        }
    }
}

/// 投递结果
///
/// 投递失败是正常返回值而非异常，调用方按枚举分支处理。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    /// 推送服务已接收
    Delivered,
    /// 该身份没有订阅记录
    NotSubscribed,
    /// 推送服务已判定订阅失效，记录已清理
    StaleSubscription,
    /// 临时失败，调用方可自行退避重试
    TemporaryFailure,
    /// 请求被推送服务拒绝，不应重试
    RejectedRequest { status: u16 },
}

/// 订阅上报格式（浏览器 PushSubscription.toJSON() 的形状）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionJson {
    pub endpoint: String,
    pub keys: SubscriptionKeysJson,
}

/// 订阅密钥上报格式
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionKeysJson {
    pub p256dh: String,
    pub auth: String,
}

impl TryFrom<SubscriptionJson> for DeviceSubscription {
    type Error = Error;

    fn try_from(json: SubscriptionJson) -> Result<Self> {
        let p256dh = base64url_decode(&json.keys.p256dh)?;
        let auth = base64url_decode(&json.keys.auth)?;

        // p256dh 必须是未压缩 SEC1 点，auth 必须是 16 字节
        if p256dh.len() != 65 || p256dh[0] != 0x04 {
            return Err(Error::InvalidParam(
                "p256dh must be a 65-byte uncompressed P-256 point".to_string(),
            ));
        }
        if auth.len() != 16 {
            return Err(Error::InvalidParam(
                "auth must be a 16-byte secret".to_string(),
            ));
        }

        Ok(DeviceSubscription {
            endpoint: json.endpoint,
            keys: SubscriptionKeys { p256dh, auth },
        })
    }
}

/// 订阅记录传输格式（远程注册表 API）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRecordJson {
    pub identity: String,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRecordJson> for SubscriptionRecord {
    type Error = Error;

    fn try_from(json: SubscriptionRecordJson) -> Result<Self> {
        let handle = DeviceSubscription::try_from(SubscriptionJson {
            endpoint: json.endpoint,
            keys: SubscriptionKeysJson {
                p256dh: json.p256dh,
                auth: json.auth,
            },
        })?;
        Ok(SubscriptionRecord {
            identity: json.identity,
            handle,
            created_at: json.created_at,
        })
    }
}

/// 统一 API 响应
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub message: String,
    pub data: Option<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> SubscriptionJson {
        SubscriptionJson {
            endpoint: "https://push.example/abc".to_string(),
            keys: SubscriptionKeysJson {
                p256dh: base64url_encode(&{
                    let mut point = vec![0x04u8];
                    point.extend_from_slice(&[0xab; 64]);
                    point
                }),
                auth: base64url_encode(&[0x11; 16]),
            },
        }
    }

    #[test]
    fn test_subscription_json_round_trip() {
        let sub = DeviceSubscription::try_from(sample_json()).unwrap();
        assert_eq!(sub.endpoint, "https://push.example/abc");
        assert_eq!(sub.keys.p256dh.len(), 65);
        assert_eq!(sub.keys.auth.len(), 16);

        let json = sub.to_json();
        let back = DeviceSubscription::try_from(json).unwrap();
        assert_eq!(back, sub);
    }

    #[test]
    fn test_subscription_json_rejects_bad_point() {
        let mut json = sample_json();
        json.keys.p256dh = base64url_encode(&[0x02; 33]);
        let result = DeviceSubscription::try_from(json);
        assert!(matches!(result, Err(Error::InvalidParam(_))));
    }

    #[test]
    fn test_subscription_json_rejects_short_auth() {
        let mut json = sample_json();
        json.keys.auth = base64url_encode(&[0x11; 8]);
        let result = DeviceSubscription::try_from(json);
        assert!(matches!(result, Err(Error::InvalidParam(_))));
    }

    #[test]
    fn test_outbound_message_payload() {
        let message = OutboundMessage::text("Hello");
        let payload = message.payload().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["body"], "Hello");
        assert_eq!(value["title"], "Notification");
        // icon 省略时不出现在载荷中
        assert!(value.get("icon").is_none());
    }
}
