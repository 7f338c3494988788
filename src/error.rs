use crate::exchange::ExchangeId;
use thiserror::Error;

/// 错误分类：调用方据此区分“输入有误”“远端/暂时性故障”“内部不变量被破坏”
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 需要调用方修正输入（缺少密钥、交易所不支持等）
    Input,
    /// 代理或交易所返回的错误，可由调用方决定是否重试
    Remote,
    /// 返回结构不符合约定或本地存储异常
    Internal,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("wallet not connected")]
    NotConnected,

    #[error("missing credential for {0}")]
    MissingCredential(ExchangeId),

    #[error("unsupported exchange: {0}")]
    UnsupportedExchange(String),

    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// 同一交易所只允许保存一组凭证
    #[error("credential for {0} already registered")]
    CredentialExists(ExchangeId),

    /// api key 同时是存储键，不允许两组凭证共用
    #[error("api key {0} already registered")]
    ApiKeyExists(String),

    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("HTTP {status} {body}")]
    ExchangeApiError { status: u64, body: String },

    #[error("unknown api error: {0}")]
    UnknownApiError(String),

    /// 代理本身不可达或返回非 2xx
    #[error("proxy error: {0}")]
    Proxy(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotConnected
            | Error::MissingCredential(_)
            | Error::UnsupportedExchange(_)
            | Error::InvalidCredential(_)
            | Error::CredentialExists(_)
            | Error::ApiKeyExists(_)
            | Error::InvalidOrder(_)
            | Error::Config(_) => ErrorKind::Input,
            Error::ExchangeApiError { .. }
            | Error::UnknownApiError(_)
            | Error::Proxy(_)
            | Error::Http(_) => ErrorKind::Remote,
            Error::MalformedResponse(_) | Error::Storage(_) | Error::Json(_) | Error::Io(_) => {
                ErrorKind::Internal
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_api_error_display() {
        let err = Error::ExchangeApiError {
            status: 429,
            body: "rate limited".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 429 rate limited");
        assert_eq!(err.kind(), ErrorKind::Remote);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            Error::MissingCredential(ExchangeId::Okx).kind(),
            ErrorKind::Input
        );
        assert_eq!(
            Error::UnsupportedExchange("Kraken".into()).kind(),
            ErrorKind::Input
        );
        assert_eq!(Error::NotConnected.kind(), ErrorKind::Input);
        assert_eq!(Error::ApiKeyExists("k1".into()).kind(), ErrorKind::Input);
        assert_eq!(
            Error::MalformedResponse("no variant".into()).kind(),
            ErrorKind::Internal
        );
        assert_eq!(Error::UnknownApiError("x".into()).kind(), ErrorKind::Remote);
    }

    #[test]
    fn test_missing_credential_display() {
        let err = Error::MissingCredential(ExchangeId::Coinbase);
        assert_eq!(err.to_string(), "missing credential for Coinbase");
    }
}
