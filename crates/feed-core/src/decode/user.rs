//! 사용자 데이터 디코더 (체결, 과거 주문).

use super::{decode_each, expect_array, from_value, millis_to_datetime};
use crate::domain::{OrderStatus, Side, UserFill, UserFills, UserOrder};
use crate::error::DecodeError;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUserFills {
    user: String,
    #[serde(default)]
    is_snapshot: bool,
    #[serde(default)]
    fills: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFill {
    coin: String,
    px: Decimal,
    sz: Decimal,
    side: String,
    time: i64,
    #[serde(default)]
    dir: String,
    #[serde(default)]
    closed_pnl: Decimal,
    #[serde(default)]
    fee: Decimal,
    oid: u64,
    #[serde(default)]
    tid: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawHistoricalOrder {
    order: RawOrder,
    status: String,
    status_timestamp: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOrder {
    coin: String,
    side: String,
    limit_px: Decimal,
    sz: Decimal,
    oid: u64,
    timestamp: i64,
    orig_sz: Decimal,
    #[serde(default = "default_order_type")]
    order_type: String,
    #[serde(default)]
    reduce_only: bool,
}

fn default_order_type() -> String {
    "Limit".to_string()
}

fn parse_side(side: &str) -> Result<Side, DecodeError> {
    Side::from_wire(side).ok_or_else(|| DecodeError::InvalidValue {
        field: "side",
        value: side.to_string(),
    })
}

fn decode_fill(value: &Value) -> Result<UserFill, DecodeError> {
    let raw: RawFill = from_value(value)?;
    Ok(UserFill {
        side: parse_side(&raw.side)?,
        symbol: raw.coin,
        price: raw.px,
        size: raw.sz,
        direction: raw.dir,
        closed_pnl: raw.closed_pnl,
        fee: raw.fee,
        order_id: raw.oid,
        trade_id: raw.tid,
        timestamp: millis_to_datetime(raw.time),
    })
}

/// 사용자 체결 payload를 디코딩합니다.
pub fn decode_user_fills(data: &Value) -> Result<UserFills, DecodeError> {
    let raw: RawUserFills = from_value(data)?;
    Ok(UserFills {
        user: raw.user,
        is_snapshot: raw.is_snapshot,
        fills: decode_each(&raw.fills, "user fill", decode_fill),
    })
}

fn decode_historical_order(value: &Value) -> Result<UserOrder, DecodeError> {
    let raw: RawHistoricalOrder = from_value(value)?;
    let status = OrderStatus::from_wire(&raw.status).ok_or_else(|| DecodeError::InvalidValue {
        field: "status",
        value: raw.status.clone(),
    })?;
    let order = raw.order;

    Ok(UserOrder {
        order_id: order.oid,
        side: parse_side(&order.side)?,
        symbol: order.coin,
        limit_price: order.limit_px,
        size: order.sz,
        original_size: order.orig_sz,
        order_type: order.order_type,
        reduce_only: order.reduce_only,
        status,
        placed_at: millis_to_datetime(order.timestamp),
        status_at: millis_to_datetime(raw.status_timestamp),
    })
}

/// 사용자 과거 주문 payload를 디코딩합니다.
///
/// 최신 상태 변경 순(내림차순)으로 정렬해 반환합니다.
pub fn decode_user_historical_orders(data: &Value) -> Result<Vec<UserOrder>, DecodeError> {
    let items = expect_array(data, "historical orders")?;
    let mut orders = decode_each(items, "historical order", decode_historical_order);
    orders.sort_by(|a, b| b.status_at.cmp(&a.status_at));
    Ok(orders)
}
