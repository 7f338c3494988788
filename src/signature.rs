//! 请求签名
//!
//! 预哈希串为 `timestamp + signable`（无分隔符），HMAC-SHA256 后输出 Base64。
//! 各交易所对 secret 的处理方式与时间戳格式不同，统一登记在 [`convention`] 中。

use crate::error::{Error, Result};
use crate::exchange::ExchangeId;
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// secret 到 HMAC 密钥的推导方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDerivation {
    /// secret 原文字节直接作为密钥
    Raw,
    /// secret 视为 Base64 文本，解码后作为密钥
    Base64Decoded,
}

impl KeyDerivation {
    pub fn derive(&self, secret: &str) -> Result<Vec<u8>> {
        if secret.is_empty() {
            return Err(Error::InvalidCredential("empty secret".to_string()));
        }

        match self {
            KeyDerivation::Raw => Ok(secret.as_bytes().to_vec()),
            KeyDerivation::Base64Decoded => base64::engine::general_purpose::STANDARD
                .decode(secret.trim())
                .map_err(|e| Error::InvalidCredential(format!("secret is not base64: {}", e))),
        }
    }
}

/// 参与签名的时间戳格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFormat {
    /// 2024-05-01T12:00:00.000Z
    Iso8601Millis,
    /// 1714564800
    UnixSeconds,
}

impl TimestampFormat {
    pub fn format(&self, at: DateTime<Utc>) -> String {
        match self {
            TimestampFormat::Iso8601Millis => at.to_rfc3339_opts(SecondsFormat::Millis, true),
            TimestampFormat::UnixSeconds => at.timestamp().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningConvention {
    pub key: KeyDerivation,
    pub timestamp: TimestampFormat,
}

const OKX: SigningConvention = SigningConvention {
    key: KeyDerivation::Raw,
    timestamp: TimestampFormat::Iso8601Millis,
};

const COINBASE: SigningConvention = SigningConvention {
    key: KeyDerivation::Base64Decoded,
    timestamp: TimestampFormat::UnixSeconds,
};

/// 签名约定表，新增交易所时必须在此登记
pub fn convention(exchange: ExchangeId) -> SigningConvention {
    match exchange {
        ExchangeId::Okx => OKX,
        ExchangeId::Coinbase => COINBASE,
    }
}

/// HMAC-SHA256 签名，返回 Base64
pub fn sign(signable: &str, secret: &str, timestamp: &str, key: KeyDerivation) -> Result<String> {
    let key_material = key.derive(secret)?;
    let payload = format!("{}{}", timestamp, signable);
    let mut mac = Hmac::<Sha256>::new_from_slice(&key_material)
        .map_err(|e| Error::InvalidCredential(e.to_string()))?;
    mac.update(payload.as_bytes());
    let sig = mac.finalize().into_bytes();
    Ok(base64::engine::general_purpose::STANDARD.encode(sig))
}

/// 绑定到某个交易所签名约定的签名器
#[derive(Debug, Clone, Copy)]
pub struct SignatureEngine {
    convention: SigningConvention,
}

impl SignatureEngine {
    pub fn for_exchange(exchange: ExchangeId) -> Self {
        Self {
            convention: convention(exchange),
        }
    }

    pub fn timestamp(&self, at: DateTime<Utc>) -> String {
        self.convention.timestamp.format(at)
    }

    pub fn sign(&self, signable: &str, secret: &str, timestamp: &str) -> Result<String> {
        sign(signable, secret, timestamp, self.convention.key)
    }
}
