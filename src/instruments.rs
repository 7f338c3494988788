use crate::error::Result;
use crate::exchange::ExchangeId;
use crate::proxy::ProxyRpc;
use crate::wire::{InstrumentType, Pair};
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

/// 交易对及上线该交易对的交易所数量
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairWithCount {
    pub pair: Pair,
    pub count: usize,
}

/// 各交易所公开产品列表的缓存，使用匿名句柄即可
pub struct InstrumentsStore<P: ProxyRpc> {
    actor: Arc<P>,
    cache: HashMap<(ExchangeId, InstrumentType), Vec<Pair>>,
}

impl<P: ProxyRpc> InstrumentsStore<P> {
    pub fn new(actor: Arc<P>) -> Self {
        Self {
            actor,
            cache: HashMap::new(),
        }
    }

    /// 并发拉取所有交易所的产品列表，单个交易所失败不影响其他交易所
    pub async fn load_all(
        &mut self,
        instrument_type: InstrumentType,
    ) -> Vec<(ExchangeId, Result<usize>)> {
        let actor = &self.actor;
        let fetches = ExchangeId::ALL.into_iter().map(|exchange| async move {
            let pairs = actor
                .get_instruments(exchange.to_wire(), instrument_type)
                .await;
            (exchange, pairs)
        });

        let results = join_all(fetches).await;

        let mut outcome = Vec::with_capacity(results.len());
        for (exchange, pairs) in results {
            match pairs {
                Ok(pairs) => {
                    info!("{} {} 产品数: {}", exchange, instrument_type, pairs.len());
                    let count = pairs.len();
                    self.cache.insert((exchange, instrument_type), pairs);
                    outcome.push((exchange, Ok(count)));
                }
                Err(e) => {
                    warn!("{} {} 产品列表获取失败: {}", exchange, instrument_type, e);
                    outcome.push((exchange, Err(e)));
                }
            }
        }
        outcome
    }

    pub fn get(&self, exchange: ExchangeId, instrument_type: InstrumentType) -> Option<&[Pair]> {
        self.cache
            .get(&(exchange, instrument_type))
            .map(|pairs| pairs.as_slice())
    }

    /// 去重后的交易对，按交易所数量降序，数量相同按交易对排序
    pub fn unique_instruments(&self, instrument_type: InstrumentType) -> Vec<PairWithCount> {
        let mut counts: BTreeMap<&Pair, usize> = BTreeMap::new();
        for exchange in ExchangeId::ALL {
            if let Some(pairs) = self.get(exchange, instrument_type) {
                let mut seen: Vec<&Pair> = pairs.iter().collect();
                seen.sort();
                seen.dedup();
                for pair in seen {
                    *counts.entry(pair).or_default() += 1;
                }
            }
        }

        let mut unique: Vec<PairWithCount> = counts
            .into_iter()
            .map(|(pair, count)| PairWithCount {
                pair: pair.clone(),
                count,
            })
            .collect();
        unique.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.pair.cmp(&b.pair)));
        unique
    }

    pub fn has_exchange_instrument(
        &self,
        exchange: ExchangeId,
        instrument_type: InstrumentType,
        pair: &Pair,
    ) -> bool {
        self.get(exchange, instrument_type)
            .is_some_and(|pairs| pairs.contains(pair))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::wire::{ApiData, Instruction, RequestNumber, ResultEnvelope, WireExchange};

    struct CatalogueProxy;

    impl ProxyRpc for CatalogueProxy {
        async fn add_instruction(&self, _instruction: &Instruction) -> Result<RequestNumber> {
            Err(Error::Proxy("public handle".to_string()))
        }

        async fn get_signature_string(&self, _number: RequestNumber) -> Result<String> {
            Err(Error::Proxy("public handle".to_string()))
        }

        async fn run_request(
            &self,
            _number: RequestNumber,
            _signature: &str,
            _timestamp: &str,
        ) -> Result<ResultEnvelope> {
            Err(Error::Proxy("public handle".to_string()))
        }

        async fn get_instruments(
            &self,
            exchange: WireExchange,
            instrument_type: InstrumentType,
        ) -> Result<Vec<Pair>> {
            match (exchange, instrument_type) {
                (WireExchange::Okx, InstrumentType::Spot) => Ok(vec![
                    Pair::new("BTC", "USDT"),
                    Pair::new("ETH", "USDT"),
                    Pair::new("SOL", "USDT"),
                ]),
                (WireExchange::Coinbase, InstrumentType::Spot) => Ok(vec![
                    Pair::new("ETH", "USDT"),
                    Pair::new("BTC", "USDT"),
                    Pair::new("BTC", "USD"),
                ]),
                (WireExchange::Coinbase, _) => Err(Error::Proxy("503 unavailable".to_string())),
                _ => Ok(vec![]),
            }
        }

        async fn register_api_key(&self, _data: &ApiData) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_unique_instruments() {
        let mut store = InstrumentsStore::new(Arc::new(CatalogueProxy));
        let outcome = store.load_all(InstrumentType::Spot).await;
        assert!(outcome.iter().all(|(_, r)| r.is_ok()));

        let unique = store.unique_instruments(InstrumentType::Spot);
        let flat: Vec<(String, usize)> = unique
            .iter()
            .map(|p| (p.pair.to_string(), p.count))
            .collect();
        assert_eq!(
            flat,
            vec![
                ("BTC-USDT".to_string(), 2),
                ("ETH-USDT".to_string(), 2),
                ("BTC-USD".to_string(), 1),
                ("SOL-USDT".to_string(), 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_has_exchange_instrument() {
        let mut store = InstrumentsStore::new(Arc::new(CatalogueProxy));
        let pair = Pair::new("SOL", "USDT");
        assert!(!store.has_exchange_instrument(ExchangeId::Okx, InstrumentType::Spot, &pair));

        store.load_all(InstrumentType::Spot).await;
        assert!(store.has_exchange_instrument(ExchangeId::Okx, InstrumentType::Spot, &pair));
        assert!(!store.has_exchange_instrument(ExchangeId::Coinbase, InstrumentType::Spot, &pair));
        assert!(!store.has_exchange_instrument(ExchangeId::Okx, InstrumentType::Margin, &pair));
    }

    #[tokio::test]
    async fn test_partial_failure() {
        let mut store = InstrumentsStore::new(Arc::new(CatalogueProxy));
        let outcome = store.load_all(InstrumentType::Swap).await;

        let failed: Vec<ExchangeId> = outcome
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(e, _)| *e)
            .collect();
        assert_eq!(failed, vec![ExchangeId::Coinbase]);
        assert_eq!(store.get(ExchangeId::Okx, InstrumentType::Swap), Some(&[][..]));
        assert_eq!(store.get(ExchangeId::Coinbase, InstrumentType::Swap), None);
    }
}
