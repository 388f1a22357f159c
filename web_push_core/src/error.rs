//! 错误类型定义

use thiserror::Error;

/// 错误类型
#[derive(Debug, Error)]
pub enum Error {
    /// 公钥解码错误
    #[error("Key decode error: {0}")]
    Decode(String),

    /// 密码学错误
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// 网络错误
    #[error("Network error: {0}")]
    Network(String),

    /// 用户或平台拒绝订阅
    #[error("Subscription denied by user or platform")]
    SubscriptionDenied,

    /// 平台订阅接口错误
    #[error("Platform error: {0}")]
    Platform(String),

    /// 已有订阅/退订操作进行中
    #[error("Operation in progress")]
    OperationInProgress,

    /// 订阅注册表不可用
    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// 参数错误
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    /// 编解码错误
    #[error("Encoding/Decoding error: {0}")]
    Encoding(String),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 结果类型
pub type Result<T> = std::result::Result<T, Error>;
