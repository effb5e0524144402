//! 공개 시장 데이터 디코더 (호가창, 체결, 캔들, 알림).

use super::{decode_each, expect_array, from_value, millis_to_datetime};
use crate::domain::{Candle, Notification, OrderBook, OrderBookLevel, Side, TradeRecord};
use crate::error::DecodeError;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

/// 호가창 스트림 이벤트.
#[derive(Debug, Deserialize)]
struct RawBook {
    coin: String,
    #[serde(default)]
    time: i64,
    levels: Vec<Vec<Value>>,
}

/// 호가 레벨.
#[derive(Debug, Deserialize)]
struct RawLevel {
    px: Decimal,
    sz: Decimal,
    #[serde(default)]
    n: u32,
}

/// 체결 스트림 이벤트.
#[derive(Debug, Deserialize)]
struct RawTrade {
    coin: String,
    side: String,
    px: Decimal,
    sz: Decimal,
    time: i64,
    #[serde(default)]
    tid: u64,
}

/// 캔들 스트림 이벤트.
#[derive(Debug, Deserialize)]
struct RawCandle {
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "T")]
    close_time: i64,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "i")]
    interval: String,
    #[serde(rename = "o")]
    open: Decimal,
    #[serde(rename = "c")]
    close: Decimal,
    #[serde(rename = "h")]
    high: Decimal,
    #[serde(rename = "l")]
    low: Decimal,
    #[serde(rename = "v")]
    volume: Decimal,
    #[serde(rename = "n", default)]
    num_trades: u64,
}

fn decode_level(value: &Value) -> Result<OrderBookLevel, DecodeError> {
    let raw: RawLevel = from_value(value)?;
    Ok(OrderBookLevel {
        price: raw.px,
        size: raw.sz,
        orders: raw.n,
    })
}

/// 호가창 payload를 디코딩합니다.
///
/// `levels`는 `[bids, asks]` 두 배열이어야 합니다. 잘못된 레벨은 건너뛰고,
/// 결과는 매수 내림차순 / 매도 오름차순으로 정렬됩니다.
pub fn decode_order_book(data: &Value) -> Result<OrderBook, DecodeError> {
    let raw: RawBook = from_value(data)?;

    let [bids, asks]: [Vec<Value>; 2] =
        raw.levels
            .try_into()
            .map_err(|_| DecodeError::UnexpectedShape {
                record: "order book",
                expected: "two level arrays",
            })?;

    let mut bids = decode_each(&bids, "order book level", decode_level);
    let mut asks = decode_each(&asks, "order book level", decode_level);
    bids.sort_by(|a, b| b.price.cmp(&a.price));
    asks.sort_by(|a, b| a.price.cmp(&b.price));

    Ok(OrderBook {
        symbol: raw.coin,
        bids,
        asks,
        timestamp: millis_to_datetime(raw.time),
    })
}

fn decode_trade(value: &Value) -> Result<TradeRecord, DecodeError> {
    let raw: RawTrade = from_value(value)?;
    let side = Side::from_wire(&raw.side).ok_or(DecodeError::InvalidValue {
        field: "side",
        value: raw.side.clone(),
    })?;

    Ok(TradeRecord {
        symbol: raw.coin,
        side,
        price: raw.px,
        size: raw.sz,
        trade_id: raw.tid,
        timestamp: millis_to_datetime(raw.time),
    })
}

/// 체결 배열 payload를 디코딩합니다.
pub fn decode_trades(data: &Value) -> Result<Vec<TradeRecord>, DecodeError> {
    let items = expect_array(data, "trades")?;
    Ok(decode_each(items, "trade", decode_trade))
}

/// 캔들 payload를 디코딩합니다.
pub fn decode_candle(data: &Value) -> Result<Candle, DecodeError> {
    let raw: RawCandle = from_value(data)?;
    Ok(Candle {
        symbol: raw.symbol,
        interval: raw.interval,
        open_time: millis_to_datetime(raw.open_time),
        close_time: millis_to_datetime(raw.close_time),
        open: raw.open,
        high: raw.high,
        low: raw.low,
        close: raw.close,
        volume: raw.volume,
        num_trades: raw.num_trades,
    })
}

/// 알림 payload를 디코딩합니다.
///
/// `{"notification": "..."}` 객체와 문자열 모두 허용합니다.
pub fn decode_notification(data: &Value) -> Result<Notification, DecodeError> {
    let message = match data {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("notification")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingField {
                record: "notification",
                field: "notification",
            })?
            .to_string(),
        _ => {
            return Err(DecodeError::UnexpectedShape {
                record: "notification",
                expected: "object or string",
            })
        }
    };

    Ok(Notification { message })
}
