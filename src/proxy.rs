//! 代理 RPC 接口与基于 HTTP/JSON 的实现
//!
//! 每个方法对应 `POST {proxy_url}/{method}`，请求体为命名参数组成的 JSON 对象。

use crate::decoder;
use crate::error::{Error, Result};
use crate::wire::{
    ApiData, InstrumentType, Instruction, Pair, RequestNumber, ResultEnvelope, WireExchange,
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// 代理侧能力，认证句柄与公共句柄都实现该接口
pub trait ProxyRpc: Send + Sync {
    /// 提交请求描述，返回请求序号
    fn add_instruction(
        &self,
        instruction: &Instruction,
    ) -> impl Future<Output = Result<RequestNumber>> + Send;

    /// 取回该序号对应的待签名串
    fn get_signature_string(
        &self,
        number: RequestNumber,
    ) -> impl Future<Output = Result<String>> + Send;

    fn run_request(
        &self,
        number: RequestNumber,
        signature: &str,
        timestamp: &str,
    ) -> impl Future<Output = Result<ResultEnvelope>> + Send;

    /// 公共接口，无需签名
    fn get_instruments(
        &self,
        exchange: WireExchange,
        instrument_type: InstrumentType,
    ) -> impl Future<Output = Result<Vec<Pair>>> + Send;

    fn register_api_key(&self, data: &ApiData) -> impl Future<Output = Result<bool>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpProxy {
    client: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl HttpProxy {
    /// 带 Bearer token 的认证句柄
    pub fn new(proxy_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        if token.is_empty() {
            return Err(Error::Config("empty proxy token".to_string()));
        }
        Self::build(proxy_url, Some(token.to_string()), timeout)
    }

    /// 仅用于公共接口的匿名句柄
    pub fn anonymous(proxy_url: &str, timeout: Duration) -> Result<Self> {
        Self::build(proxy_url, None, timeout)
    }

    fn build(proxy_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(proxy_url)
            .map_err(|e| Error::Config(format!("invalid proxy url {}: {}", proxy_url, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base,
            token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, args: Value) -> Result<T> {
        let url = self
            .base
            .join(method)
            .map_err(|e| Error::Config(format!("invalid proxy method {}: {}", method, e)))?;

        debug!("proxy call {}", method);
        let mut request = self.client.post(url).json(&args);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Error::Proxy(format!("{} {}", status.as_u16(), body)));
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::MalformedResponse(format!("{} reply: {}", method, e)))
    }
}

impl ProxyRpc for HttpProxy {
    async fn add_instruction(&self, instruction: &Instruction) -> Result<RequestNumber> {
        self.call("add_instruction", json!({ "instruction": instruction }))
            .await
    }

    async fn get_signature_string(&self, number: RequestNumber) -> Result<String> {
        self.call("get_signature_string", json!({ "request_number": number }))
            .await
    }

    async fn run_request(
        &self,
        number: RequestNumber,
        signature: &str,
        timestamp: &str,
    ) -> Result<ResultEnvelope> {
        let raw: Value = self
            .call(
                "run_request",
                json!({
                    "request_number": number,
                    "signature": signature,
                    "timestamp": timestamp,
                }),
            )
            .await?;
        decoder::envelope(raw)
    }

    async fn get_instruments(
        &self,
        exchange: WireExchange,
        instrument_type: InstrumentType,
    ) -> Result<Vec<Pair>> {
        self.call(
            "get_instruments",
            json!({ "exchange": exchange, "instrument_type": instrument_type }),
        )
        .await
    }

    async fn register_api_key(&self, data: &ApiData) -> Result<bool> {
        self.call("register_api_key", json!({ "api_data": data }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{BalancesRequest, RequestPayload};
    use mockito::Matcher;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn instruction() -> Instruction {
        Instruction {
            api_key: "k1".to_string(),
            exchange: WireExchange::Okx,
            request: RequestPayload::Balances(BalancesRequest { currency: None }),
        }
    }

    #[test]
    fn test_base_url_normalized() {
        let proxy = HttpProxy::anonymous("http://localhost:8080/api", TIMEOUT).unwrap();
        assert_eq!(proxy.base_url().as_str(), "http://localhost:8080/api/");
        assert!(!proxy.is_authenticated());

        assert!(matches!(
            HttpProxy::anonymous("not a url", TIMEOUT),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            HttpProxy::new("http://localhost:8080", "", TIMEOUT),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_add_instruction() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/add_instruction")
            .match_header("authorization", "Bearer tok")
            .match_body(Matcher::PartialJson(json!({
                "instruction": {"api_key": "k1", "exchange": {"Okx": null}}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("7")
            .create_async()
            .await;

        let proxy = HttpProxy::new(&server.url(), "tok", TIMEOUT).unwrap();
        let number = proxy.add_instruction(&instruction()).await.unwrap();
        assert_eq!(number, RequestNumber(7));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_run_request_envelope() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/run_request")
            .match_body(Matcher::Json(json!({
                "request_number": 7,
                "signature": "c2ln",
                "timestamp": "1714564800"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"Err":{"ApiClientError":{"Http":{"status":429,"body":"rate limited"}}}}"#)
            .create_async()
            .await;

        let proxy = HttpProxy::new(&server.url(), "tok", TIMEOUT).unwrap();
        let envelope = proxy
            .run_request(RequestNumber(7), "c2ln", "1714564800")
            .await
            .unwrap();
        assert!(matches!(envelope, ResultEnvelope::Err(_)));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/get_signature_string")
            .with_status(401)
            .with_body("Unauthorized")
            .create_async()
            .await;

        let proxy = HttpProxy::new(&server.url(), "bad", TIMEOUT).unwrap();
        match proxy.get_signature_string(RequestNumber(1)).await {
            Err(Error::Proxy(detail)) => {
                assert!(detail.contains("401"));
                assert!(detail.contains("Unauthorized"));
            }
            other => panic!("unexpected {:?}", other),
        }

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_instruments_anonymous() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/get_instruments")
            .match_header("authorization", Matcher::Missing)
            .match_body(Matcher::Json(json!({
                "exchange": {"Coinbase": null},
                "instrument_type": {"Spot": null}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"base":"BTC","quote":"USD"},{"base":"ETH","quote":"USD"}]"#)
            .create_async()
            .await;

        let proxy = HttpProxy::anonymous(&server.url(), TIMEOUT).unwrap();
        let pairs = proxy
            .get_instruments(WireExchange::Coinbase, InstrumentType::Spot)
            .await
            .unwrap();
        assert_eq!(pairs, vec![Pair::new("BTC", "USD"), Pair::new("ETH", "USD")]);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_malformed_reply() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/register_api_key")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let proxy = HttpProxy::new(&server.url(), "tok", TIMEOUT).unwrap();
        let data = ApiData {
            exchange: WireExchange::Okx,
            api_key: "k1".to_string(),
            passphrase: Some("p1".to_string()),
        };
        assert!(matches!(
            proxy.register_api_key(&data).await,
            Err(Error::MalformedResponse(_))
        ));
    }
}
