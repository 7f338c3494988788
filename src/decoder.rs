//! 代理返回结果的解码
//!
//! 所有“哪个键存在”的判断都集中在这里，调用方只拿到类型化的结果或错误。

use crate::error::{Error, Result};
use crate::wire::{Balance, Instrument, OrderData, PendingOrder, Response, ResultEnvelope};
use serde_json::{Map, Value};

fn as_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| Error::MalformedResponse(format!("{} is not an object: {}", what, value)))
}

/// 将原始 JSON 判定为 Ok 或 Err 分支，两者必须恰好出现一个
pub fn envelope(value: Value) -> Result<ResultEnvelope> {
    let object = as_object(&value, "result envelope")?;
    match (object.contains_key("Ok"), object.contains_key("Err")) {
        (true, false) => Ok(ResultEnvelope::Ok(take(value, "Ok"))),
        (false, true) => Ok(ResultEnvelope::Err(take(value, "Err"))),
        (true, true) => Err(Error::MalformedResponse(
            "envelope carries both Ok and Err".to_string(),
        )),
        (false, false) => Err(Error::MalformedResponse(format!(
            "envelope carries neither Ok nor Err: {}",
            value
        ))),
    }
}

fn take(value: Value, key: &str) -> Value {
    match value {
        Value::Object(mut map) => map.remove(key).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// 错误分支：`ApiClientError.Http{status, body}` 映射为 `ExchangeApiError`，其余一律 `UnknownApiError`
pub fn api_error(err: &Value) -> Error {
    let http = err
        .get("ApiClientError")
        .and_then(|e| e.get("Http"))
        .and_then(|h| h.as_object());

    if let Some(http) = http {
        let status = http.get("status").and_then(|s| match s {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse::<u64>().ok(),
            _ => None,
        });

        if let Some(status) = status {
            let body = match http.get("body") {
                Some(Value::String(body)) => body.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            return Error::ExchangeApiError { status, body };
        }
    }

    Error::UnknownApiError(err.to_string())
}

pub fn extract_ok(envelope: ResultEnvelope) -> Result<Value> {
    match envelope {
        ResultEnvelope::Ok(value) => Ok(value),
        ResultEnvelope::Err(err) => Err(api_error(&err)),
    }
}

/// 成功值必须恰好包含一个已知的响应变体
pub fn decode_response(value: Value) -> Result<Response> {
    let object = as_object(&value, "response")?;
    let present: Vec<&str> = Response::VARIANTS
        .iter()
        .copied()
        .filter(|variant| object.contains_key(*variant))
        .collect();

    let variant = match present.as_slice() {
        [variant] => *variant,
        [] => {
            return Err(Error::MalformedResponse(format!(
                "no known response variant in {}",
                value
            )));
        }
        many => {
            return Err(Error::MalformedResponse(format!(
                "ambiguous response, variants present: {}",
                many.join(", ")
            )));
        }
    };

    let payload = object.get(variant).cloned().unwrap_or(Value::Null);
    let malformed =
        |e: serde_json::Error| Error::MalformedResponse(format!("{} payload: {}", variant, e));

    let response = match variant {
        "Balances" => Response::Balances(serde_json::from_value(payload).map_err(malformed)?),
        "Instruments" => {
            Response::Instruments(serde_json::from_value(payload).map_err(malformed)?)
        }
        "Order" => Response::Order(serde_json::from_value(payload).map_err(malformed)?),
        _ => Response::PendingOrders(serde_json::from_value(payload).map_err(malformed)?),
    };

    Ok(response)
}

pub fn decode(envelope: ResultEnvelope) -> Result<Response> {
    decode_response(extract_ok(envelope)?)
}

fn unexpected(expected: &str, got: &Response) -> Error {
    Error::MalformedResponse(format!(
        "expected {} response, got {}",
        expected,
        got.name()
    ))
}

impl Response {
    pub fn into_balances(self) -> Result<Vec<Balance>> {
        match self {
            Response::Balances(balances) => Ok(balances),
            other => Err(unexpected("Balances", &other)),
        }
    }

    pub fn into_instruments(self) -> Result<Vec<Instrument>> {
        match self {
            Response::Instruments(instruments) => Ok(instruments),
            other => Err(unexpected("Instruments", &other)),
        }
    }

    pub fn into_order(self) -> Result<OrderData> {
        match self {
            Response::Order(order) => Ok(order),
            other => Err(unexpected("Order", &other)),
        }
    }

    pub fn into_pending_orders(self) -> Result<Vec<PendingOrder>> {
        match self {
            Response::PendingOrders(orders) => Ok(orders),
            other => Err(unexpected("PendingOrders", &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{InstrumentType, Pair};
    use serde_json::json;

    #[test]
    fn test_decode_balances() {
        let raw = json!({
            "Ok": {
                "Balances": [
                    {"currency": "BTC", "balance": "1.5", "available": "1.0", "hold": "0.5"}
                ]
            }
        });

        let balances = decode(envelope(raw).unwrap())
            .unwrap()
            .into_balances()
            .unwrap();
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].currency, "BTC");
        assert_eq!(balances[0].hold, "0.5");
    }

    #[test]
    fn test_decode_each_variant() {
        let instruments = decode_response(json!({
            "Instruments": [
                {"instrument_id": {"base": "BTC", "quote": "USDT"}, "instrument_type": {"Spot": null}}
            ]
        }))
        .unwrap()
        .into_instruments()
        .unwrap();
        assert_eq!(instruments[0].instrument_id, Pair::new("BTC", "USDT"));
        assert_eq!(instruments[0].instrument_type, InstrumentType::Spot);

        let order = decode_response(json!({"Order": {"code": "0"}}))
            .unwrap()
            .into_order()
            .unwrap();
        assert_eq!(order.code, "0");

        let pending = decode_response(json!({"PendingOrders": []}))
            .unwrap()
            .into_pending_orders()
            .unwrap();
        assert!(pending.is_empty());
    }

    #[test]
    fn test_both_variants_malformed() {
        let err = decode_response(json!({"Balances": [], "Instruments": []})).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn test_no_variant_malformed() {
        let err = decode_response(json!({"Candles": []})).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));

        let err = decode_response(json!([])).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn test_bad_payload_malformed() {
        let err = decode_response(json!({"Order": {"id": 1}})).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn test_wrong_projection_malformed() {
        let response = decode_response(json!({"Order": {"code": "1"}})).unwrap();
        assert!(matches!(
            response.into_balances(),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_envelope_requires_single_tag() {
        assert!(matches!(
            envelope(json!({"Ok": 1, "Err": 2})),
            Err(Error::MalformedResponse(_))
        ));
        assert!(matches!(
            envelope(json!({"Value": 1})),
            Err(Error::MalformedResponse(_))
        ));
        assert_eq!(
            envelope(json!({"Ok": true})).unwrap(),
            ResultEnvelope::Ok(json!(true))
        );
    }

    #[test]
    fn test_http_error_message() {
        let raw = json!({"Err": {"ApiClientError": {"Http": {"status": 429, "body": "rate limited"}}}});
        let err = decode(envelope(raw).unwrap()).unwrap_err();
        assert_eq!(err.to_string(), "HTTP 429 rate limited");
        match err {
            Error::ExchangeApiError { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "rate limited");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_http_status_as_string() {
        let err = api_error(&json!({"ApiClientError": {"Http": {"status": "503", "body": "down"}}}));
        assert_eq!(err.to_string(), "HTTP 503 down");
    }

    #[test]
    fn test_other_errors_unknown() {
        let err = api_error(&json!({"ApiClientError": {"Reject": {"code": 2, "message": "x"}}}));
        assert!(matches!(err, Error::UnknownApiError(_)));

        let err = api_error(&json!({"MissingIndex": null}));
        match err {
            Error::UnknownApiError(detail) => assert!(detail.contains("MissingIndex")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
