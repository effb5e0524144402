//! 심볼 메타데이터와 시장 컨텍스트.

use super::Price;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 심볼의 정적 메타데이터와 실시간 시장 컨텍스트.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolContext {
    /// 심볼
    pub symbol: String,
    /// 수량 소수점 자릿수
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_decimals: Option<u32>,
    /// 최대 레버리지
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_leverage: Option<u32>,
    /// 마크 가격
    pub mark_price: Price,
    /// 오라클 가격
    pub oracle_price: Price,
    /// 호가 중간 가격
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mid_price: Option<Price>,
    /// 펀딩비
    pub funding_rate: Decimal,
    /// 미결제약정
    pub open_interest: Decimal,
    /// 24시간 명목 거래대금
    pub day_notional_volume: Decimal,
    /// 전일 가격
    pub prev_day_price: Price,
}

impl SymbolContext {
    /// 24시간 가격 변동.
    pub fn change_24h(&self) -> Decimal {
        self.mark_price - self.prev_day_price
    }

    /// 24시간 변동률(%).
    pub fn change_24h_pct(&self) -> Decimal {
        if self.prev_day_price.is_zero() {
            return Decimal::ZERO;
        }
        self.change_24h() / self.prev_day_price * Decimal::ONE_HUNDRED
    }

    /// 미결제약정의 명목 가치.
    pub fn open_interest_notional(&self) -> Decimal {
        self.open_interest * self.mark_price
    }
}
