use crate::error::{Error, Result};
use crate::wire::{InstrumentType, OrderSide, OrderType, PositionSide, PostOrderPayload, TradeMode};

/// 根据产品类型推断可用的交易模式
pub fn infer_trade_modes(instrument_type: InstrumentType) -> Result<Vec<TradeMode>> {
    match instrument_type {
        InstrumentType::Spot => Ok(vec![TradeMode::Cash]),
        InstrumentType::Margin => Ok(vec![TradeMode::Cross, TradeMode::Isolated]),
        other => Err(Error::InvalidOrder(format!(
            "trade modes for {} not supported",
            other
        ))),
    }
}

/// 下单参数，默认买入市价单
#[derive(Debug, Clone, PartialEq)]
pub struct PostOrderRequest {
    trade_modes: Vec<TradeMode>,
    pub instrument_id: String,
    pub trade_mode: Option<TradeMode>,
    pub side: OrderSide,
    pub margin_currency: Option<String>,
    pub position_side: Option<PositionSide>,
    pub order_type: OrderType,
    pub size: f64,
    pub price: Option<f64>,
}

impl PostOrderRequest {
    pub fn new(trade_modes: Vec<TradeMode>, instrument_id: &str) -> Self {
        Self {
            trade_mode: trade_modes.first().copied(),
            trade_modes,
            instrument_id: instrument_id.to_string(),
            side: OrderSide::Buy,
            margin_currency: None,
            position_side: None,
            order_type: OrderType::Market,
            size: 0.0,
            price: None,
        }
    }

    /// 由产品类型推断交易模式后创建
    pub fn for_instrument(instrument_type: InstrumentType, instrument_id: &str) -> Result<Self> {
        Ok(Self::new(infer_trade_modes(instrument_type)?, instrument_id))
    }

    pub fn trade_modes(&self) -> &[TradeMode] {
        &self.trade_modes
    }

    pub fn with_side(mut self, side: OrderSide) -> Self {
        self.side = side;
        self
    }

    pub fn with_order_type(mut self, order_type: OrderType) -> Self {
        self.order_type = order_type;
        self
    }

    pub fn with_trade_mode(mut self, trade_mode: TradeMode) -> Self {
        self.trade_mode = Some(trade_mode);
        self
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_margin_currency(mut self, currency: &str) -> Self {
        self.margin_currency = Some(currency.to_string());
        self
    }

    pub fn with_position_side(mut self, position_side: PositionSide) -> Self {
        self.position_side = Some(position_side);
        self
    }

    /// 除市价单外都必须给出价格
    pub fn price_required(&self) -> bool {
        self.order_type != OrderType::Market
    }

    pub fn to_payload(&self) -> Result<PostOrderPayload> {
        if self.instrument_id.trim().is_empty() {
            return Err(Error::InvalidOrder("empty instrument id".to_string()));
        }

        let trade_mode = self
            .trade_mode
            .ok_or_else(|| Error::InvalidOrder("no trade mode available".to_string()))?;
        if !self.trade_modes.is_empty() && !self.trade_modes.contains(&trade_mode) {
            return Err(Error::InvalidOrder(format!(
                "trade mode {} not allowed for {}",
                trade_mode, self.instrument_id
            )));
        }

        if !self.size.is_finite() || self.size <= 0.0 {
            return Err(Error::InvalidOrder(format!("invalid size {}", self.size)));
        }

        let order_price = if self.price_required() {
            match self.price {
                Some(price) if price.is_finite() && price > 0.0 => Some(price),
                Some(price) => return Err(Error::InvalidOrder(format!("invalid price {}", price))),
                None => {
                    return Err(Error::InvalidOrder(format!(
                        "{} order requires a price",
                        self.order_type
                    )));
                }
            }
        } else {
            None
        };

        Ok(PostOrderPayload {
            instrument_id: self.instrument_id.clone(),
            trade_mode,
            side: self.side,
            margin_currency: self.margin_currency.clone(),
            position_side: self.position_side,
            order_type: self.order_type,
            size: self.size,
            order_price,
        })
    }
}
