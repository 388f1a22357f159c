//! Web Push 推送核心库
//!
//! 提供完整的 Web Push 订阅生命周期与消息分发实现，包括：
//! - 应用服务器密钥对（VAPID）与公钥编解码
//! - 订阅生命周期状态机（单飞保护的订阅 / 退订）
//! - 订阅注册表（内存 / SQLite / 远程 HTTP）
//! - 分发引擎（aes128gcm 载荷加密 + VAPID 签名投递）

pub mod dispatch;
pub mod error;
pub mod keys;
pub mod lifecycle;
pub mod protocol;
pub mod registry;
pub mod remote;
pub mod sqlite;
pub mod types;

pub use dispatch::{DispatchConfig, DispatchEngine};
pub use error::{Error, Result};
pub use keys::ApplicationServerKeys;
pub use lifecycle::{LifecycleController, LifecycleState, PushPlatform, SubscribeOptions};
pub use protocol::WebPushProtocol;
pub use registry::{MemoryRegistry, SubscriptionRegistry};
pub use remote::{RegistryClientConfig, RemoteRegistry};
pub use sqlite::SqliteRegistry;
pub use types::*;
