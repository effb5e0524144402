//! 사용자 주문 및 체결 레코드.

use super::{Price, Quantity, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 사용자 체결.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFill {
    /// 심볼
    pub symbol: String,
    /// 방향
    pub side: Side,
    /// 체결가
    pub price: Price,
    /// 체결량
    pub size: Quantity,
    /// 포지션 방향 설명 (예: "Open Long")
    pub direction: String,
    /// 실현 손익
    pub closed_pnl: Decimal,
    /// 수수료
    pub fee: Decimal,
    /// 주문 ID
    pub order_id: u64,
    /// 체결 ID
    pub trade_id: u64,
    /// 체결 시간
    pub timestamp: DateTime<Utc>,
}

/// 사용자 체결 배치.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFills {
    /// 사용자 주소
    pub user: String,
    /// 구독 직후 전달되는 스냅샷 여부
    pub is_snapshot: bool,
    /// 체결 목록
    pub fills: Vec<UserFill>,
}

impl UserFills {
    /// 배치 전체의 실현 손익 합계.
    pub fn total_closed_pnl(&self) -> Decimal {
        self.fills.iter().map(|f| f.closed_pnl).sum()
    }

    /// 배치 전체의 수수료 합계.
    pub fn total_fees(&self) -> Decimal {
        self.fills.iter().map(|f| f.fee).sum()
    }
}

/// 주문 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// 미체결
    Open,
    /// 전량 체결
    Filled,
    /// 취소
    Canceled,
    /// 트리거됨
    Triggered,
    /// 거부
    Rejected,
    /// 마진 부족 등으로 시스템 취소
    MarginCanceled,
}

impl OrderStatus {
    /// 서버 문자열에서 상태를 파싱합니다.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "open" => Some(OrderStatus::Open),
            "filled" => Some(OrderStatus::Filled),
            "canceled" | "cancelled" => Some(OrderStatus::Canceled),
            "triggered" => Some(OrderStatus::Triggered),
            "rejected" => Some(OrderStatus::Rejected),
            "marginCanceled" | "margin_canceled" => Some(OrderStatus::MarginCanceled),
            _ => None,
        }
    }

    /// 더 이상 변하지 않는 상태인지 확인합니다.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Open | OrderStatus::Triggered)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Open => "open",
            OrderStatus::Filled => "filled",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Triggered => "triggered",
            OrderStatus::Rejected => "rejected",
            OrderStatus::MarginCanceled => "margin_canceled",
        };
        f.write_str(s)
    }
}

/// 사용자 과거 주문.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserOrder {
    /// 주문 ID
    pub order_id: u64,
    /// 심볼
    pub symbol: String,
    /// 방향
    pub side: Side,
    /// 지정가
    pub limit_price: Price,
    /// 잔여 수량
    pub size: Quantity,
    /// 최초 수량
    pub original_size: Quantity,
    /// 주문 유형 (예: "Limit", "Stop Market")
    pub order_type: String,
    /// 감소 전용 여부
    pub reduce_only: bool,
    /// 상태
    pub status: OrderStatus,
    /// 주문 시간
    pub placed_at: DateTime<Utc>,
    /// 상태 변경 시간
    pub status_at: DateTime<Utc>,
}

impl UserOrder {
    /// 체결된 수량.
    pub fn filled_size(&self) -> Quantity {
        (self.original_size - self.size).max(Decimal::ZERO)
    }
}
