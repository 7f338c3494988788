//! 请求流水线：构建 → 取待签名串 → 签名 → 执行 → 解码
//!
//! 每一步消费上一步的值并产出下一步的值，失败后无法从中间状态继续。
//! 密钥存储的锁只在单次查找期间持有，不跨越任何代理往返。

use crate::decoder;
use crate::error::{Error, Result};
use crate::exchange::ExchangeId;
use crate::keystore::{self, Credential, SharedKeyStore, Storage};
use crate::order::PostOrderRequest;
use crate::proxy::ProxyRpc;
use crate::session::Wallet;
use crate::signature::SignatureEngine;
use crate::wire::{
    ApiData, Balance, BalancesRequest, Instruction, Instrument, InstrumentType,
    InstrumentsRequest, OrderData, OrdersListRequest, Pair, PendingOrder, RequestNumber,
    RequestPayload, Response, ResultEnvelope,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub type Clock = fn() -> DateTime<Utc>;

/// 已提交到代理，持有请求序号
pub struct Built<P: ProxyRpc> {
    actor: Arc<P>,
    credential: Credential,
    number: RequestNumber,
}

/// 已取回待签名串
pub struct SignableFetched<P: ProxyRpc> {
    actor: Arc<P>,
    credential: Credential,
    number: RequestNumber,
    signable: String,
}

pub struct Signed<P: ProxyRpc> {
    actor: Arc<P>,
    number: RequestNumber,
    signature: String,
    timestamp: String,
}

pub struct Executed {
    number: RequestNumber,
    envelope: ResultEnvelope,
}

impl<P: ProxyRpc> Built<P> {
    pub fn number(&self) -> RequestNumber {
        self.number
    }

    pub async fn fetch_signable(self) -> Result<SignableFetched<P>> {
        let signable = self.actor.get_signature_string(self.number).await?;
        debug!("{} 已取回待签名串", self.number);
        Ok(SignableFetched {
            actor: self.actor,
            credential: self.credential,
            number: self.number,
            signable,
        })
    }
}

impl<P: ProxyRpc> SignableFetched<P> {
    pub fn signable(&self) -> &str {
        &self.signable
    }

    /// 按交易所约定生成时间戳并签名
    pub fn sign(self, at: DateTime<Utc>) -> Result<Signed<P>> {
        let engine = SignatureEngine::for_exchange(self.credential.exchange);
        let timestamp = engine.timestamp(at);
        let signature = engine.sign(&self.signable, &self.credential.secret_key, &timestamp)?;
        Ok(Signed {
            actor: self.actor,
            number: self.number,
            signature,
            timestamp,
        })
    }
}

impl<P: ProxyRpc> Signed<P> {
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub async fn execute(self) -> Result<Executed> {
        let envelope = self
            .actor
            .run_request(self.number, &self.signature, &self.timestamp)
            .await?;
        Ok(Executed {
            number: self.number,
            envelope,
        })
    }
}

impl Executed {
    pub fn envelope(&self) -> &ResultEnvelope {
        &self.envelope
    }

    pub fn decode(self) -> Result<Response> {
        let number = self.number;
        decoder::decode(self.envelope).inspect_err(|e| warn!("{} 执行失败: {}", number, e))
    }
}

pub struct RequestPipeline<P: ProxyRpc, S: Storage> {
    actor: Option<Arc<P>>,
    keys: SharedKeyStore<S>,
    clock: Clock,
}

impl<P: ProxyRpc, S: Storage> RequestPipeline<P, S> {
    pub fn new(actor: Option<Arc<P>>, keys: SharedKeyStore<S>) -> Self {
        Self {
            actor,
            keys,
            clock: Utc::now,
        }
    }

    pub fn from_wallet(wallet: &Wallet<P>, keys: SharedKeyStore<S>) -> Self {
        Self::new(wallet.handle(), keys)
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn keys(&self) -> &SharedKeyStore<S> {
        &self.keys
    }

    fn actor(&self) -> Result<Arc<P>> {
        self.actor.clone().ok_or(Error::NotConnected)
    }

    fn credential(&self, exchange: ExchangeId) -> Result<Credential> {
        keystore::lock(&self.keys)?
            .get_by_exchange(exchange)
            .ok_or(Error::MissingCredential(exchange))
    }

    /// 第一步：检查会话与凭证，提交请求描述
    pub async fn build(&self, exchange: ExchangeId, request: RequestPayload) -> Result<Built<P>> {
        let actor = self.actor()?;
        let credential = self.credential(exchange)?;

        let name = request.name();
        let instruction = Instruction {
            api_key: credential.api_key.clone(),
            exchange: exchange.to_wire(),
            request,
        };
        let number = actor.add_instruction(&instruction).await?;
        info!("{} {} 请求已提交 {}", exchange, name, number);

        Ok(Built {
            actor,
            credential,
            number,
        })
    }

    /// 完整执行一次请求
    pub async fn execute(&self, exchange: ExchangeId, request: RequestPayload) -> Result<Response> {
        let built = self.build(exchange, request).await?;
        let fetched = built.fetch_signable().await?;
        let signed = fetched.sign((self.clock)())?;
        let executed = signed.execute().await?;
        executed.decode()
    }

    pub async fn balances(
        &self,
        exchange: ExchangeId,
        currencies: &[String],
    ) -> Result<Vec<Balance>> {
        let currency = if currencies.is_empty() {
            None
        } else {
            Some(currencies.to_vec())
        };
        self.execute(exchange, RequestPayload::Balances(BalancesRequest { currency }))
            .await?
            .into_balances()
    }

    pub async fn instruments(
        &self,
        exchange: ExchangeId,
        instrument_type: InstrumentType,
        instrument_id: Option<Pair>,
    ) -> Result<Vec<Instrument>> {
        let request = RequestPayload::Instruments(InstrumentsRequest {
            instrument_type,
            instrument_id,
        });
        self.execute(exchange, request).await?.into_instruments()
    }

    pub async fn post_order(
        &self,
        exchange: ExchangeId,
        order: &PostOrderRequest,
    ) -> Result<OrderData> {
        self.actor()?;
        let payload = order.to_payload()?;
        let data = self
            .execute(exchange, RequestPayload::PostOrder(payload))
            .await?
            .into_order()?;
        info!("{} 下单成功 {}", exchange, data.code);
        Ok(data)
    }

    pub async fn pending_orders(
        &self,
        exchange: ExchangeId,
        instrument_type: InstrumentType,
        instrument_id: &str,
    ) -> Result<Vec<PendingOrder>> {
        let request = RequestPayload::OrdersList(OrdersListRequest {
            instrument_type,
            instrument_id: instrument_id.to_string(),
            pending: true,
        });
        self.execute(exchange, request).await?.into_pending_orders()
    }

    /// 本地保存凭证并向代理登记（不上传 secret），登记失败时撤销本地保存
    pub async fn register_key(&self, credential: Credential) -> Result<()> {
        let actor = self.actor()?;

        let data = ApiData {
            exchange: credential.exchange.to_wire(),
            api_key: credential.api_key.clone(),
            passphrase: credential.passphrase.clone(),
        };
        let exchange = credential.exchange;
        keystore::lock(&self.keys)?.add(credential)?;

        let registered = match actor.register_api_key(&data).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::Proxy(format!(
                "api key {} rejected by proxy",
                data.api_key
            ))),
            Err(e) => Err(e),
        };

        if let Err(e) = registered {
            warn!("{} 凭证登记失败，撤销本地保存: {}", exchange, e);
            keystore::lock(&self.keys)?.remove(&data.api_key)?;
            return Err(e);
        }

        info!("{} 凭证已登记 {}", exchange, data.api_key);
        Ok(())
    }
}
