//! 계좌 마진 디코더.
//!
//! 마진 조회 응답 형식:
//!
//! ```text
//! {
//!   "accountValue": "1000.5",
//!   "marginUsed": "120",
//!   "withdrawable": "880.5",          // 선택, 없으면 가용 마진
//!   "buckets": [{"asset": "USDC", "deposit": "1000", "borrow": "0"}],
//!   "positions": [{"symbol": "BTC", "size": "-0.5", "entryPrice": "60000",
//!                  "markPrice": "61000", "unrealizedPnl": "-500",
//!                  "marginUsed": "3050", "leverage": "10",
//!                  "liquidationPrice": "70000"}]
//! }
//! ```
//!
//! `size`의 부호가 방향을 나타내며, 수량이 0인 포지션은 제외됩니다.

use super::{decode_each, from_value};
use crate::domain::{AccountBalance, AccountSnapshot, CollateralBalance, PositionRecord, Side};
use crate::error::DecodeError;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMargin {
    account_value: Decimal,
    margin_used: Decimal,
    #[serde(default)]
    withdrawable: Option<Decimal>,
    #[serde(default)]
    buckets: Vec<Value>,
    #[serde(default)]
    positions: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawBucket {
    asset: String,
    #[serde(default)]
    deposit: Decimal,
    #[serde(default)]
    borrow: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPosition {
    symbol: String,
    size: Decimal,
    entry_price: Decimal,
    mark_price: Decimal,
    #[serde(default)]
    unrealized_pnl: Decimal,
    #[serde(default)]
    margin_used: Decimal,
    #[serde(default = "default_leverage")]
    leverage: Decimal,
    #[serde(default)]
    liquidation_price: Option<Decimal>,
}

fn default_leverage() -> Decimal {
    Decimal::ONE
}

fn decode_bucket(value: &Value) -> Result<CollateralBalance, DecodeError> {
    let raw: RawBucket = from_value(value)?;
    Ok(CollateralBalance {
        asset: raw.asset,
        deposited: raw.deposit,
        borrowed: raw.borrow,
    })
}

fn decode_position(value: &Value) -> Result<Option<PositionRecord>, DecodeError> {
    let raw: RawPosition = from_value(value)?;
    if raw.size.is_zero() {
        return Ok(None);
    }

    let side = if raw.size.is_sign_negative() {
        Side::Sell
    } else {
        Side::Buy
    };

    Ok(Some(PositionRecord {
        symbol: raw.symbol,
        side,
        size: raw.size.abs(),
        entry_price: raw.entry_price,
        mark_price: raw.mark_price,
        unrealized_pnl: raw.unrealized_pnl,
        margin_used: raw.margin_used,
        leverage: raw.leverage,
        liquidation_price: raw.liquidation_price,
    }))
}

/// 계좌 마진 조회 결과를 잔고와 포지션으로 디코딩합니다.
pub fn decode_account_margin(data: &Value) -> Result<AccountSnapshot, DecodeError> {
    let raw: RawMargin = from_value(data)?;

    let withdrawable = match raw.withdrawable {
        Some(withdrawable) => withdrawable,
        None => raw
            .account_value
            .checked_sub(raw.margin_used)
            .ok_or_else(|| DecodeError::InvalidValue {
                field: "marginUsed",
                value: raw.margin_used.to_string(),
            })?
            .max(Decimal::ZERO),
    };

    let balance = AccountBalance {
        account_value: raw.account_value,
        margin_used: raw.margin_used,
        withdrawable,
        collateral: decode_each(&raw.buckets, "margin bucket", decode_bucket),
    };

    let positions = decode_each(&raw.positions, "position", decode_position)
        .into_iter()
        .flatten()
        .collect();

    Ok(AccountSnapshot {
        balance,
        positions,
        fetched_at: Utc::now(),
    })
}
