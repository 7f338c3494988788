use crate::error::{Error, Result};
use crate::wire::WireExchange;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// 用户侧的交易所标识，同时作为凭证查找键与签名约定的选择依据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExchangeId {
    Okx,
    Coinbase,
}

impl ExchangeId {
    pub const ALL: [ExchangeId; 2] = [ExchangeId::Okx, ExchangeId::Coinbase];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::Okx => "Okx",
            ExchangeId::Coinbase => "Coinbase",
        }
    }

    /// 逐个变体显式映射，不经过数值转换，避免两个交易所被混淆
    pub fn to_wire(self) -> WireExchange {
        match self {
            ExchangeId::Okx => WireExchange::Okx,
            ExchangeId::Coinbase => WireExchange::Coinbase,
        }
    }

    pub fn from_wire(wire: WireExchange) -> Self {
        match wire {
            WireExchange::Okx => ExchangeId::Okx,
            WireExchange::Coinbase => ExchangeId::Coinbase,
        }
    }
}

impl Display for ExchangeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ExchangeId::ALL
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnsupportedExchange(s.to_string()))
    }
}

impl From<ExchangeId> for WireExchange {
    fn from(value: ExchangeId) -> Self {
        value.to_wire()
    }
}

impl From<WireExchange> for ExchangeId {
    fn from(value: WireExchange) -> Self {
        ExchangeId::from_wire(value)
    }
}

/// 由名称直接得到代理侧变体，未知名称返回 `UnsupportedExchange`
pub fn normalize(name: &str) -> Result<WireExchange> {
    Ok(name.parse::<ExchangeId>()?.to_wire())
}
