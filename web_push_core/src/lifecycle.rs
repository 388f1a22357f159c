//! 订阅生命周期控制
//!
//! 跟踪设备在「未订阅 / 订阅中 / 已订阅 / 退订中」之间的转换，统一驱动
//! 平台订阅接口与订阅注册表。状态值本身就是单飞保护：处于过渡态时拒绝
//! 新的转换请求，句柄镜像只由驱动当前转换的任务写入。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::protocol::decode_application_server_key;
use crate::registry::SubscriptionRegistry;
use crate::types::DeviceSubscription;

/// 平台订阅参数
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    pub user_visible_only: bool,
    pub application_server_key: Vec<u8>,
}

/// 平台订阅接口
///
/// 对浏览器 PushManager 一类平台能力的抽象。平台订阅对象是外部持有的
/// 不透明能力，这里只暴露句柄读取与撤销，不做结构化深拷贝。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushPlatform: Send + Sync {
    /// 查询设备上已存在的平台级订阅
    async fn existing_subscription(&self) -> Result<Option<DeviceSubscription>>;

    /// 发起平台级订阅
    ///
    /// 用户拒绝授权返回 [`Error::SubscriptionDenied`]，其余平台故障返回
    /// [`Error::Platform`]。
    async fn subscribe(&self, options: SubscribeOptions) -> Result<DeviceSubscription>;

    /// 撤销平台级订阅
    async fn unsubscribe(&self) -> Result<()>;
}

/// 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unsubscribed,
    Subscribing,
    Subscribed,
    Unsubscribing,
}

/// 生命周期控制器
pub struct LifecycleController<P: PushPlatform, R: SubscriptionRegistry> {
    platform: P,
    registry: Arc<R>,
    identity: String,
    server_key: Vec<u8>,
    state: Arc<RwLock<LifecycleState>>,
    subscription: Arc<RwLock<Option<DeviceSubscription>>>,
}

impl<P: PushPlatform, R: SubscriptionRegistry> LifecycleController<P, R> {
    /// 创建控制器
    ///
    /// 应用服务器公钥在此处一次性解码，公钥损坏直接失败，不会带着
    /// 垃圾密钥进入订阅流程。
    pub fn new(
        platform: P,
        registry: Arc<R>,
        identity: &str,
        server_public_key: &str,
    ) -> Result<Self> {
        let server_key = decode_application_server_key(server_public_key)?;
        Ok(Self {
            platform,
            registry,
            identity: identity.to_string(),
            server_key,
            state: Arc::new(RwLock::new(LifecycleState::Unsubscribed)),
            subscription: Arc::new(RwLock::new(None)),
        })
    }

    /// 启动时同步平台现状
    ///
    /// 平台上已有订阅时直接采用该句柄，不重新注册。
    pub async fn bootstrap(&self) -> Result<LifecycleState> {
        match self.platform.existing_subscription().await? {
            Some(handle) => {
                info!(
                    "Adopting existing platform subscription for identity: {}",
                    self.identity
                );
                *self.subscription.write().await = Some(handle);
                *self.state.write().await = LifecycleState::Subscribed;
                Ok(LifecycleState::Subscribed)
            }
            None => {
                *self.state.write().await = LifecycleState::Unsubscribed;
                Ok(LifecycleState::Unsubscribed)
            }
        }
    }

    /// 订阅
    ///
    /// 已订阅时重复调用是幂等覆盖：平台返回的句柄（无论新旧）整体替换
    /// 注册表记录。
    pub async fn subscribe(&self) -> Result<DeviceSubscription> {
        // 单飞检查并进入 Subscribing
        let previous = {
            let mut state = self.state.write().await;
            match *state {
                LifecycleState::Subscribing | LifecycleState::Unsubscribing => {
                    return Err(Error::OperationInProgress)
                }
                current => {
                    *state = LifecycleState::Subscribing;
                    current
                }
            }
        };

        let options = SubscribeOptions {
            user_visible_only: true,
            application_server_key: self.server_key.clone(),
        };
        let handle = match self.platform.subscribe(options).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Platform subscribe failed: {}", e);
                *self.state.write().await = previous;
                return Err(e);
            }
        };

        *self.subscription.write().await = Some(handle.clone());
        *self.state.write().await = LifecycleState::Subscribed;

        // 平台订阅成功后上报注册表；上报失败上抛，但本地状态保持与平台一致
        self.registry.register(&self.identity, handle.clone()).await?;

        info!("Subscribed identity: {}", self.identity);
        Ok(handle)
    }

    /// 退订
    ///
    /// 未订阅时调用是空操作。
    pub async fn unsubscribe(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            match *state {
                LifecycleState::Subscribing | LifecycleState::Unsubscribing => {
                    return Err(Error::OperationInProgress)
                }
                LifecycleState::Unsubscribed => return Ok(()),
                LifecycleState::Subscribed => *state = LifecycleState::Unsubscribing,
            }
        }

        // 平台撤销失败不阻止注册表删除：服务端不应保留过期端点
        if let Err(e) = self.platform.unsubscribe().await {
            warn!("Platform unsubscribe failed: {}", e);
        }
        // 注册表删除失败只记录，本地状态始终反映平台侧视图
        if let Err(e) = self.registry.delete(&self.identity).await {
            warn!("Registry delete failed: {}", e);
        }

        *self.subscription.write().await = None;
        *self.state.write().await = LifecycleState::Unsubscribed;
        info!("Unsubscribed identity: {}", self.identity);
        Ok(())
    }

    /// 当前状态
    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    /// 当前句柄镜像
    pub async fn subscription(&self) -> Option<DeviceSubscription> {
        self.subscription.read().await.clone()
    }
}
