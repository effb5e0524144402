//! 공개 시장 데이터 레코드.
//!
//! - `OrderBook` - 호가창 스냅샷
//! - `TradeRecord` - 호가창 체결
//! - `Candle` - OHLCV 캔들
//! - `Notification` - 서버 알림

use super::{Price, Quantity};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 주문/체결 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// 매수
    Buy,
    /// 매도
    Sell,
}

impl Side {
    /// 반대 방향을 반환합니다.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// 서버 표기(`B`/`A`, `buy`/`sell`)에서 방향을 파싱합니다.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "B" | "b" | "buy" | "Buy" | "BUY" | "bid" => Some(Side::Buy),
            "A" | "a" | "S" | "sell" | "Sell" | "SELL" | "ask" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// 호가창 가격 레벨.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    /// 가격
    pub price: Price,
    /// 수량
    pub size: Quantity,
    /// 레벨에 걸린 주문 수
    pub orders: u32,
}

/// 호가창 스냅샷.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    /// 심볼
    pub symbol: String,
    /// 매수 호가 - 가격 내림차순
    pub bids: Vec<OrderBookLevel>,
    /// 매도 호가 - 가격 오름차순
    pub asks: Vec<OrderBookLevel>,
    /// 서버 타임스탬프
    pub timestamp: DateTime<Utc>,
}

impl OrderBook {
    /// 최우선 매수 호가를 반환합니다.
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|l| l.price)
    }

    /// 최우선 매도 호가를 반환합니다.
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|l| l.price)
    }

    /// 스프레드를 반환합니다.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// 중간 가격을 반환합니다.
    pub fn mid_price(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    /// 한쪽 호가의 누적 수량.
    pub fn depth(&self, side: Side) -> Quantity {
        let levels = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        levels.iter().map(|l| l.size).sum()
    }
}

/// 호가창 체결.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// 심볼
    pub symbol: String,
    /// 테이커 방향
    pub side: Side,
    /// 체결가
    pub price: Price,
    /// 체결량
    pub size: Quantity,
    /// 체결 ID
    pub trade_id: u64,
    /// 체결 시간
    pub timestamp: DateTime<Utc>,
}

impl TradeRecord {
    /// 체결 명목 금액.
    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }
}

/// OHLCV 캔들.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// 심볼
    pub symbol: String,
    /// 캔들 간격 (예: "1m", "1h")
    pub interval: String,
    /// 시작 시간
    pub open_time: DateTime<Utc>,
    /// 종료 시간
    pub close_time: DateTime<Utc>,
    /// 시가
    pub open: Price,
    /// 고가
    pub high: Price,
    /// 저가
    pub low: Price,
    /// 종가
    pub close: Price,
    /// 거래량
    pub volume: Quantity,
    /// 체결 건수
    pub num_trades: u64,
}

impl Candle {
    /// 양봉 여부.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }
}

/// 서버 알림.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// 알림 본문
    pub message: String,
}
