//! 심볼 메타데이터 디코더.

use super::{decode_each, from_value};
use crate::domain::SymbolContext;
use crate::error::DecodeError;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct RawSnapshot {
    universe: Vec<Value>,
    contexts: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMeta {
    name: String,
    #[serde(default)]
    sz_decimals: Option<u32>,
    #[serde(default)]
    max_leverage: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawContext {
    mark_px: Decimal,
    oracle_px: Decimal,
    #[serde(default)]
    mid_px: Option<Decimal>,
    #[serde(default)]
    funding: Decimal,
    #[serde(default)]
    open_interest: Decimal,
    #[serde(default)]
    day_ntl_vlm: Decimal,
    prev_day_px: Decimal,
}

#[derive(Debug, Deserialize)]
struct RawActiveContext {
    coin: String,
    ctx: RawContext,
}

fn build_context(symbol: String, meta: Option<&RawMeta>, ctx: RawContext) -> SymbolContext {
    SymbolContext {
        symbol,
        size_decimals: meta.and_then(|m| m.sz_decimals),
        max_leverage: meta.and_then(|m| m.max_leverage),
        mark_price: ctx.mark_px,
        oracle_price: ctx.oracle_px,
        mid_price: ctx.mid_px,
        funding_rate: ctx.funding,
        open_interest: ctx.open_interest,
        day_notional_volume: ctx.day_ntl_vlm,
        prev_day_price: ctx.prev_day_px,
    }
}

/// 전체 심볼 메타데이터 스냅샷을 디코딩합니다.
///
/// `universe[i]`와 `contexts[i]`가 같은 심볼을 가리킵니다. 길이가 다르면
/// 짧은 쪽에 맞춥니다.
pub fn decode_symbol_metadata_snapshot(data: &Value) -> Result<Vec<SymbolContext>, DecodeError> {
    let raw: RawSnapshot = from_value(data)?;

    if raw.universe.len() != raw.contexts.len() {
        warn!(
            universe = raw.universe.len(),
            contexts = raw.contexts.len(),
            "Symbol metadata length mismatch, truncating"
        );
    }

    let pairs: Vec<Value> = raw
        .universe
        .into_iter()
        .zip(raw.contexts)
        .map(|(meta, ctx)| Value::Array(vec![meta, ctx]))
        .collect();

    Ok(decode_each(&pairs, "symbol context", |pair| {
        let (meta, ctx): (RawMeta, RawContext) = from_value(pair)?;
        Ok(build_context(meta.name.clone(), Some(&meta), ctx))
    }))
}

/// 현재 보고 있는 심볼의 컨텍스트를 디코딩합니다.
pub fn decode_active_symbol_context(data: &Value) -> Result<SymbolContext, DecodeError> {
    let raw: RawActiveContext = from_value(data)?;
    Ok(build_context(raw.coin, None, raw.ctx))
}
