//! 应用服务器密钥对（VAPID）
//!
//! 进程级长期密钥：启动时加载一次，显式传递给生命周期控制器与分发引擎，
//! 运行期不做轮换。公钥半边以 Base64url 文本分发给客户端。

use std::path::Path;

use p256::ecdsa::SigningKey;
use rand::rngs::OsRng;

use crate::error::{Error, Result};
use crate::protocol::{base64url_encode, decode_application_server_key};

/// 应用服务器密钥对
#[derive(Clone)]
pub struct ApplicationServerKeys {
    signing_key: SigningKey,
}

impl ApplicationServerKeys {
    /// 生成新的密钥对
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// 从 Base64url 编码的私钥标量恢复
    pub fn from_base64(text: &str) -> Result<Self> {
        let bytes = decode_application_server_key(text)?;
        let signing_key = SigningKey::from_slice(&bytes)
            .map_err(|e| Error::Crypto(format!("Invalid VAPID private key: {}", e)))?;
        Ok(Self { signing_key })
    }

    /// 未压缩 SEC1 公钥点（65 字节）
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.signing_key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    /// 分发给客户端的 Base64url 公钥
    pub fn public_key_base64(&self) -> String {
        base64url_encode(&self.public_key_bytes())
    }

    /// Base64url 编码的私钥标量
    pub fn private_key_base64(&self) -> String {
        base64url_encode(self.signing_key.to_bytes().as_slice())
    }

    /// 从文件加载（文件内容为 Base64url 私钥）
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_base64(text.trim())
    }

    /// 保存私钥到文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.private_key_base64())?;
        Ok(())
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}
