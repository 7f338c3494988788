use crate::error::{Error, Result};
use crate::keystore::{FileStorage, KeyStore};
use crate::proxy::HttpProxy;
use crate::session::TokenIdentity;
use crate::tracing_init::LogFormat;
use serde::Deserialize;
use std::fmt::{Debug, Formatter};
use std::time::Duration;
use tracing::info;
use url::Url;

pub const ENV_PROXY_URL: &str = "TRENDLENS_PROXY_URL";
pub const ENV_TOKEN: &str = "TRENDLENS_TOKEN";
pub const ENV_STORE_DIR: &str = "TRENDLENS_STORE_DIR";
pub const ENV_LOG_DIR: &str = "TRENDLENS_LOG_DIR";
pub const ENV_LOG_FORMAT: &str = "TRENDLENS_LOG_FORMAT";

fn default_store_dir() -> String {
    ".trendlens".to_string()
}

fn default_log_dir() -> String {
    "log".to_string()
}

fn default_timeout() -> u64 {
    10_000
}

#[derive(Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub proxy_url: String,
    /// 代理签发的登录 token，为空时只能访问公共接口
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_store_dir")]
    pub store_dir: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_timeout")]
    pub request_timeout_ms: u64,
    /// 日志文件格式，`json` 或 `text`
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("proxy_url", &self.proxy_url)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("store_dir", &self.store_dir)
            .field("log_dir", &self.log_dir)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proxy_url: String::new(),
            token: None,
            store_dir: default_store_dir(),
            log_dir: default_log_dir(),
            request_timeout_ms: default_timeout(),
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    pub fn parse(buf: &str) -> Result<Self> {
        native_json::parse(buf).map_err(|e| Error::Config(format!("parse config: {}", e)))
    }

    /// 读取配置文件（可选），再用 `.env` 与 `TRENDLENS_*` 环境变量覆盖
    pub fn load(path: Option<&str>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(path) => {
                info!("Load config from {}", path);
                let buf = std::fs::read_to_string(path)
                    .map_err(|e| Error::Config(format!("read {}: {}", path, e)))?;
                Self::parse(&buf)?
            }
            None => Self::default(),
        };

        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_PROXY_URL) {
            self.proxy_url = url;
        }
        if let Some(token) = lookup(ENV_TOKEN) {
            self.token = Some(token);
        }
        if let Some(dir) = lookup(ENV_STORE_DIR) {
            self.store_dir = dir;
        }
        if let Some(dir) = lookup(ENV_LOG_DIR) {
            self.log_dir = dir;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            self.log_format = format.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.proxy_url.is_empty() {
            return Err(Error::Config(format!(
                "proxy_url missing, set it in the config file or {}",
                ENV_PROXY_URL
            )));
        }
        Url::parse(&self.proxy_url)
            .map_err(|e| Error::Config(format!("invalid proxy_url {}: {}", self.proxy_url, e)))?;
        if self.request_timeout_ms == 0 {
            return Err(Error::Config("request_timeout_ms must be positive".to_string()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn identity(&self) -> Result<TokenIdentity> {
        let token = self
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Config(format!("token missing, set {}", ENV_TOKEN)))?;
        Ok(TokenIdentity::new(&self.proxy_url, token, self.timeout()))
    }

    pub fn public_proxy(&self) -> Result<HttpProxy> {
        HttpProxy::anonymous(&self.proxy_url, self.timeout())
    }

    pub fn key_store(&self) -> KeyStore<FileStorage> {
        KeyStore::new(FileStorage::new(&self.store_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_with_defaults() {
        let config = Config::parse(r#"{"proxy_url": "http://localhost:8080"}"#).unwrap();
        assert_eq!(config.proxy_url, "http://localhost:8080");
        assert_eq!(config.token, None);
        assert_eq!(config.store_dir, ".trendlens");
        assert_eq!(config.log_dir, "log");
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.log_format, LogFormat::Json);
        config.validate().unwrap();
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::parse(
            r#"{"proxy_url": "http://localhost:8080", "token": "file", "request_timeout_ms": 500}"#,
        )
        .unwrap();

        let env: HashMap<&str, &str> = [
            (ENV_PROXY_URL, "https://proxy.example.com/rpc"),
            (ENV_TOKEN, "env"),
            (ENV_LOG_FORMAT, "text"),
        ]
        .into_iter()
        .collect();
        config
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.proxy_url, "https://proxy.example.com/rpc");
        assert_eq!(config.token.as_deref(), Some("env"));
        assert_eq!(config.request_timeout_ms, 500);
        assert_eq!(config.log_format, LogFormat::Text);

        let bad = |name: &str| (name == ENV_LOG_FORMAT).then(|| "xml".to_string());
        assert!(matches!(config.apply_overrides(bad), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate() {
        assert!(matches!(Config::default().validate(), Err(Error::Config(_))));

        let config = Config {
            proxy_url: "localhost".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = Config {
            proxy_url: "http://localhost".to_string(),
            request_timeout_ms: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_identity_requires_token() {
        let config = Config {
            proxy_url: "http://localhost".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.identity(), Err(Error::Config(_))));
        assert!(config.public_proxy().is_ok());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"proxy_url": "http://localhost:9000", "store_dir": "/tmp/keys", "log_format": "text"}"#,
        )
        .unwrap();

        let config = Config::parse(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(config.store_dir, "/tmp/keys");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(format!("{:?}", config).contains("localhost:9000"));
    }

    #[test]
    fn test_debug_hides_token() {
        let config = Config {
            proxy_url: "http://localhost".to_string(),
            token: Some("super-secret-token".to_string()),
            ..Config::default()
        };
        assert!(!format!("{:?}", config).contains("super-secret-token"));
    }
}
