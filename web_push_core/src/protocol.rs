//! Web Push 线上协议实现
//!
//! 协议流程：
//! 1. 密钥分发：应用服务器公钥以 URL 安全 Base64 文本发布，订阅时解码为
//!    平台接口所需的二进制 applicationServerKey
//! 2. 载荷加密：对订阅密钥做 ECDH，经 HKDF-SHA256 派生内容密钥，
//!    AES-128-GCM 单记录加密（RFC 8291 aes128gcm）
//! 3. 投递签名：按端点 origin 签发短时效 ES256 JWT（RFC 8292 VAPID）
//!
//! 依赖库说明：
//! - p256: 用于 ECDH 密钥协商与 VAPID ES256 签名
//! - hkdf/sha2/aes-gcm: 用于 aes128gcm 内容加密

use base64::{
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD as BASE64_URL},
    Engine,
};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes128Gcm, Nonce,
};
use chrono::Utc;
use hkdf::Hkdf;
use p256::ecdsa::{signature::Signer, Signature};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{ecdh, PublicKey, SecretKey};
use rand::rngs::OsRng;
use rand::RngCore;
use reqwest::Url;
use sha2::Sha256;

use crate::error::{Error, Result};
use crate::keys::ApplicationServerKeys;
use crate::types::SubscriptionKeys;

/// VAPID 令牌有效期（秒）
const VAPID_EXPIRY_SECS: i64 = 12 * 60 * 60;

/// Web Push 协议
pub struct WebPushProtocol {
    /// aes128gcm 记录大小
    record_size: u32,
}

impl WebPushProtocol {
    /// 创建协议实例
    pub fn new() -> Self {
        Self { record_size: 4096 }
    }

    /// 加密消息载荷（aes128gcm）
    ///
    /// 每次调用生成新的临时密钥与盐。
    pub fn encrypt(&self, keys: &SubscriptionKeys, payload: &[u8]) -> Result<Vec<u8>> {
        let ephemeral = SecretKey::random(&mut OsRng);
        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);
        self.encrypt_with(keys, payload, &ephemeral, &salt)
    }

    /// 以给定的临时密钥与盐加密（确定性，供测试对照参考向量）
    pub(crate) fn encrypt_with(
        &self,
        keys: &SubscriptionKeys,
        payload: &[u8],
        as_secret: &SecretKey,
        salt: &[u8; 16],
    ) -> Result<Vec<u8>> {
        // 单记录：载荷 + 分隔符 + AEAD 标签必须装进一条记录
        if payload.len() + 17 > self.record_size as usize {
            return Err(Error::InvalidParam(
                "Payload too large for a single record".to_string(),
            ));
        }

        let ua_public = PublicKey::from_sec1_bytes(&keys.p256dh)
            .map_err(|_| Error::Crypto("Invalid p256dh subscription key".to_string()))?;
        let as_public = as_secret.public_key().to_encoded_point(false);
        let shared = ecdh::diffie_hellman(as_secret.to_nonzero_scalar(), ua_public.as_affine());

        // IKM = HKDF(auth, ecdh)("WebPush: info" || 0x00 || ua_public || as_public)
        let mut key_info = Vec::with_capacity(14 + 65 + 65);
        key_info.extend_from_slice(b"WebPush: info\0");
        key_info.extend_from_slice(&keys.p256dh);
        key_info.extend_from_slice(as_public.as_bytes());
        let hk = Hkdf::<Sha256>::new(Some(&keys.auth), shared.raw_secret_bytes().as_slice());
        let mut ikm = [0u8; 32];
        hk.expand(&key_info, &mut ikm)
            .map_err(|e| Error::Crypto(e.to_string()))?;

        // 内容密钥与随机数由盐和 IKM 派生
        let hk = Hkdf::<Sha256>::new(Some(salt), &ikm);
        let mut cek = [0u8; 16];
        hk.expand(b"Content-Encoding: aes128gcm\0", &mut cek)
            .map_err(|e| Error::Crypto(e.to_string()))?;
        let mut nonce = [0u8; 12];
        hk.expand(b"Content-Encoding: nonce\0", &mut nonce)
            .map_err(|e| Error::Crypto(e.to_string()))?;

        // 末记录：载荷 || 0x02 分隔符
        let mut record = Vec::with_capacity(payload.len() + 1);
        record.extend_from_slice(payload);
        record.push(0x02);

        let cipher = Aes128Gcm::new_from_slice(&cek)
            .map_err(|e| Error::Crypto(e.to_string()))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), record.as_slice())
            .map_err(|_| Error::Crypto("AEAD encryption failed".to_string()))?;

        // 头部: salt(16) || rs(4) || idlen(1) || 临时公钥(65)
        let mut body = Vec::with_capacity(16 + 4 + 1 + 65 + ciphertext.len());
        body.extend_from_slice(salt);
        body.extend_from_slice(&self.record_size.to_be_bytes());
        body.push(as_public.as_bytes().len() as u8);
        body.extend_from_slice(as_public.as_bytes());
        body.extend_from_slice(&ciphertext);

        Ok(body)
    }

    /// 构造投递请求的 Authorization 头
    pub fn vapid_authorization(
        &self,
        endpoint: &str,
        keys: &ApplicationServerKeys,
        contact: &str,
    ) -> Result<String> {
        let token = self.vapid_token(endpoint, keys, contact)?;
        Ok(format!("vapid t={}, k={}", token, keys.public_key_base64()))
    }

    /// 签发短时效 VAPID 令牌（ES256 JWT，aud 为端点 origin）
    fn vapid_token(
        &self,
        endpoint: &str,
        keys: &ApplicationServerKeys,
        contact: &str,
    ) -> Result<String> {
        let url = Url::parse(endpoint)
            .map_err(|e| Error::InvalidParam(format!("Invalid endpoint URL: {}", e)))?;
        let aud = url.origin().ascii_serialization();
        let exp = Utc::now().timestamp() + VAPID_EXPIRY_SECS;

        let header = serde_json::json!({ "typ": "JWT", "alg": "ES256" });
        let claims = serde_json::json!({ "aud": aud, "exp": exp, "sub": contact });
        let header_bytes =
            serde_json::to_vec(&header).map_err(|e| Error::Encoding(e.to_string()))?;
        let claims_bytes =
            serde_json::to_vec(&claims).map_err(|e| Error::Encoding(e.to_string()))?;

        let signing_input = format!(
            "{}.{}",
            base64url_encode(&header_bytes),
            base64url_encode(&claims_bytes)
        );
        let signature: Signature = keys.signing_key().sign(signing_input.as_bytes());

        Ok(format!(
            "{}.{}",
            signing_input,
            base64url_encode(signature.to_bytes().as_slice())
        ))
    }
}

impl Default for WebPushProtocol {
    fn default() -> Self {
        Self::new()
    }
}

/// 应用服务器公钥解码（Key Codec）
///
/// 输入为可能缺失填充的 URL 安全 Base64：右侧补 `=` 至 4 的倍数，
/// 将 `-`/`_` 翻译为标准字母表，再按标准 Base64 解码。
pub fn decode_application_server_key(input: &str) -> Result<Vec<u8>> {
    let mut text = input.trim().to_string();
    while text.len() % 4 != 0 {
        text.push('=');
    }
    let text = text.replace('-', "+").replace('_', "/");
    BASE64.decode(text).map_err(|e| Error::Decode(e.to_string()))
}

/// Base64 编码（标准字母表）
pub fn base64_encode(data: &[u8]) -> String {
    BASE64.encode(data)
}

/// Base64 解码（标准字母表）
pub fn base64_decode(data: &str) -> Result<Vec<u8>> {
    BASE64.decode(data).map_err(|e| Error::Encoding(e.to_string()))
}

/// Base64url 编码（无填充）
pub fn base64url_encode(data: &[u8]) -> String {
    BASE64_URL.encode(data)
}

/// Base64url 解码（容忍缺失的填充）
pub fn base64url_decode(data: &str) -> Result<Vec<u8>> {
    decode_application_server_key(data)
}
