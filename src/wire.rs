//! 与代理交互的数据结构
//!
//! 代理侧的枚举统一编码为“单键对象”形式的变体：`{"Okx": null}`、`{"Buy": null}`。
//! 解码时要求恰好一个键，且键名必须是已知变体，绝不回退到默认值。

use serde::de::{Error as _, IgnoredAny};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// 读取单键对象的键名
fn deserialize_tag<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let map = BTreeMap::<String, IgnoredAny>::deserialize(deserializer)?;
    let mut keys = map.into_keys();
    match (keys.next(), keys.next()) {
        (Some(tag), None) => Ok(tag),
        (None, _) => Err(D::Error::custom("empty variant object")),
        (Some(_), Some(_)) => Err(D::Error::custom("more than one variant key")),
    }
}

macro_rules! wire_variant {
    ($(#[$meta:meta])* $name:ident { $($variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        /// 命令行等场景使用，大小写不敏感
        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s))
                    .ok_or_else(|| format!("Unknown {}: {}", stringify!($name), s))
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                use serde::ser::SerializeMap;
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(self.as_str(), &())?;
                map.end()
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let tag = deserialize_tag(deserializer)?;
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == tag)
                    .ok_or_else(|| {
                        D::Error::custom(format!("unknown {} variant {}", stringify!($name), tag))
                    })
            }
        }
    };
}

wire_variant! {
    /// 代理识别的交易所变体
    WireExchange { Okx, Coinbase }
}

wire_variant! {
    InstrumentType { Spot, Futures, Swap, Option, Margin }
}

wire_variant! {
    OrderSide { Buy, Sell }
}

wire_variant! {
    OrderType { Market, Limit, PostOnly, Fok, Ioc }
}

wire_variant! {
    /// Cross/Isolated 用于杠杆，Cash/SpotIsolated 用于非杠杆
    TradeMode { Cross, Isolated, Cash, SpotIsolated }
}

wire_variant! {
    PositionSide { Long, Short }
}

/// 交易对
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pair {
    pub base: String,
    pub quote: String,
}

impl Pair {
    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            base: base.to_string(),
            quote: quote.to_string(),
        }
    }
}

impl Display for Pair {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

/// 兼容 "BTC-USDT" 形式
impl FromStr for Pair {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('-') {
            Some((base, quote)) if !base.is_empty() && !quote.is_empty() => {
                Ok(Pair::new(base, quote))
            }
            _ => Err(format!("Invalid pair: {}", s)),
        }
    }
}

/// 代理返回的请求序号，用于关联后续的取签名串与执行
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestNumber(pub u64);

impl Display for RequestNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalancesRequest {
    /// 为空时表示查询全部币种
    pub currency: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentsRequest {
    pub instrument_type: InstrumentType,
    pub instrument_id: Option<Pair>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostOrderPayload {
    pub instrument_id: String,
    pub trade_mode: TradeMode,
    pub side: OrderSide,
    pub margin_currency: Option<String>,
    pub position_side: Option<PositionSide>,
    pub order_type: OrderType,
    pub size: f64,
    pub order_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrdersListRequest {
    pub instrument_type: InstrumentType,
    pub instrument_id: String,
    /// true 为挂单，false 为历史订单
    pub pending: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestPayload {
    Balances(BalancesRequest),
    Instruments(InstrumentsRequest),
    PostOrder(PostOrderPayload),
    OrdersList(OrdersListRequest),
}

impl RequestPayload {
    pub fn name(&self) -> &'static str {
        match self {
            RequestPayload::Balances(_) => "Balances",
            RequestPayload::Instruments(_) => "Instruments",
            RequestPayload::PostOrder(_) => "PostOrder",
            RequestPayload::OrdersList(_) => "OrdersList",
        }
    }
}

/// 尚未签名执行的请求描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub api_key: String,
    pub exchange: WireExchange,
    pub request: RequestPayload,
}

/// 向代理登记的 API 信息，不包含 secret
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiData {
    pub exchange: WireExchange,
    pub api_key: String,
    pub passphrase: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub currency: String,
    pub balance: String,
    pub available: String,
    pub hold: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub instrument_id: Pair,
    pub instrument_type: InstrumentType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderData {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub instrument_type: String,
    pub instrument_id: String,
    pub order_id: String,
    pub price: f64,
    pub size: f64,
    pub side: String,
    pub order_type: String,
    pub trade_mode: String,
    pub accumulated_fill_quantity: String,
}

/// `run_request` 成功时的返回值，变体集合是封闭的
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Balances(Vec<Balance>),
    Instruments(Vec<Instrument>),
    Order(OrderData),
    PendingOrders(Vec<PendingOrder>),
}

impl Response {
    pub const VARIANTS: [&'static str; 4] = ["Balances", "Instruments", "Order", "PendingOrders"];

    pub fn name(&self) -> &'static str {
        match self {
            Response::Balances(_) => "Balances",
            Response::Instruments(_) => "Instruments",
            Response::Order(_) => "Order",
            Response::PendingOrders(_) => "PendingOrders",
        }
    }
}

/// 代理返回的 `{Ok: ..} | {Err: ..}` 信封，在客户端入口处即确定分支
#[derive(Debug, Clone, PartialEq)]
pub enum ResultEnvelope {
    Ok(serde_json::Value),
    Err(serde_json::Value),
}
