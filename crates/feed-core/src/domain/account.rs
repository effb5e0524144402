//! 계좌 마진 상태 레코드.
//!
//! 폴링 코디네이터가 계좌 마진 조회 결과를 디코딩해 만드는 타입입니다:
//! - `AccountBalance` - 담보 및 마진 요약
//! - `PositionRecord` - 개별 포지션
//! - `AccountSnapshot` - 한 번의 조회 결과

use super::{Price, Quantity, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 자산별 담보 잔고.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateralBalance {
    /// 자산 (예: "USDC")
    pub asset: String,
    /// 예치 금액
    pub deposited: Decimal,
    /// 차입 금액
    pub borrowed: Decimal,
}

impl CollateralBalance {
    /// 순 담보 (예치 - 차입).
    pub fn net(&self) -> Decimal {
        self.deposited.saturating_sub(self.borrowed)
    }
}

/// 계좌 잔고 요약.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    /// 계좌 가치 (담보 + 미실현 손익)
    pub account_value: Decimal,
    /// 사용 중인 마진
    pub margin_used: Decimal,
    /// 출금 가능 금액
    pub withdrawable: Decimal,
    /// 자산별 담보
    pub collateral: Vec<CollateralBalance>,
}

impl AccountBalance {
    /// 가용 마진.
    pub fn free_margin(&self) -> Decimal {
        self.account_value
            .saturating_sub(self.margin_used)
            .max(Decimal::ZERO)
    }

    /// 마진 사용률 (0.0 ~ 1.0).
    pub fn margin_ratio(&self) -> Decimal {
        if self.account_value <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.margin_used / self.account_value
    }
}

/// 계좌 포지션.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    /// 심볼
    pub symbol: String,
    /// 방향 (롱 = Buy, 숏 = Sell)
    pub side: Side,
    /// 수량 (절대값)
    pub size: Quantity,
    /// 평균 진입가
    pub entry_price: Price,
    /// 마크 가격
    pub mark_price: Price,
    /// 미실현 손익
    pub unrealized_pnl: Decimal,
    /// 포지션 마진
    pub margin_used: Decimal,
    /// 레버리지
    pub leverage: Decimal,
    /// 청산 가격
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liquidation_price: Option<Price>,
}

impl PositionRecord {
    /// 명목 가치.
    pub fn notional(&self) -> Decimal {
        self.size * self.mark_price
    }

    /// 진입가 대비 수익률(%).
    pub fn return_pct(&self) -> Decimal {
        let entry_notional = self.size * self.entry_price;
        if entry_notional.is_zero() {
            return Decimal::ZERO;
        }
        self.unrealized_pnl / entry_notional * Decimal::ONE_HUNDRED
    }
}

/// 한 번의 계좌 조회 결과.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// 잔고
    pub balance: AccountBalance,
    /// 포지션 목록
    pub positions: Vec<PositionRecord>,
    /// 디코딩 시각
    pub fetched_at: DateTime<Utc>,
}

impl AccountSnapshot {
    /// 전체 미실현 손익.
    pub fn total_unrealized_pnl(&self) -> Decimal {
        self.positions.iter().map(|p| p.unrealized_pnl).sum()
    }

    /// 심볼로 포지션 조회.
    pub fn position(&self, symbol: &str) -> Option<&PositionRecord> {
        self.positions.iter().find(|p| p.symbol == symbol)
    }
}
