//! 디코더를 감싼 타입 지정 핸들러와 구독 payload 생성기.
//!
//! ```rust,ignore
//! let config = SubscriptionConfig::from_handler(handler::order_book(|book| {
//!     println!("{} best bid {:?}", book.symbol, book.best_bid());
//! }))
//! .with_payload(payload::coin("BTC"))
//! .single();
//!
//! multiplexer.subscribe(ChannelName::OrderBook, config);
//! ```

use crate::registry::Handler;
use feed_core::decode;
use feed_core::{
    Candle, DecodeError, Notification, OrderBook, SymbolContext, TradeRecord, UserFills, UserOrder,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// 디코더와 레코드 콜백으로 핸들러를 만듭니다.
///
/// envelope 디코딩에 실패한 프레임은 경고 로그를 남기고 버립니다.
pub fn typed<T, D, F>(record: &'static str, decode: D, on_record: F) -> Handler
where
    D: Fn(&Value) -> Result<T, DecodeError> + Send + Sync + 'static,
    F: Fn(T) + Send + Sync + 'static,
{
    Arc::new(move |data: &Value| match decode(data) {
        Ok(decoded) => on_record(decoded),
        Err(e) => warn!(record, error = %e, "Dropping undecodable payload"),
    })
}

pub fn order_book<F>(on_record: F) -> Handler
where
    F: Fn(OrderBook) + Send + Sync + 'static,
{
    typed("order book", decode::decode_order_book, on_record)
}

pub fn trades<F>(on_record: F) -> Handler
where
    F: Fn(Vec<TradeRecord>) + Send + Sync + 'static,
{
    typed("trades", decode::decode_trades, on_record)
}

pub fn user_fills<F>(on_record: F) -> Handler
where
    F: Fn(UserFills) + Send + Sync + 'static,
{
    typed("user fills", decode::decode_user_fills, on_record)
}

pub fn user_historical_orders<F>(on_record: F) -> Handler
where
    F: Fn(Vec<UserOrder>) + Send + Sync + 'static,
{
    typed(
        "historical orders",
        decode::decode_user_historical_orders,
        on_record,
    )
}

pub fn symbol_metadata_snapshot<F>(on_record: F) -> Handler
where
    F: Fn(Vec<SymbolContext>) + Send + Sync + 'static,
{
    typed(
        "symbol metadata",
        decode::decode_symbol_metadata_snapshot,
        on_record,
    )
}

pub fn active_symbol_context<F>(on_record: F) -> Handler
where
    F: Fn(SymbolContext) + Send + Sync + 'static,
{
    typed(
        "active symbol context",
        decode::decode_active_symbol_context,
        on_record,
    )
}

pub fn candle<F>(on_record: F) -> Handler
where
    F: Fn(Candle) + Send + Sync + 'static,
{
    typed("candle", decode::decode_candle, on_record)
}

pub fn notification<F>(on_record: F) -> Handler
where
    F: Fn(Notification) + Send + Sync + 'static,
{
    typed("notification", decode::decode_notification, on_record)
}

/// 구독 payload 생성기.
pub mod payload {
    use feed_core::Payload;
    use serde_json::Value;

    fn single(key: &str, value: &str) -> Payload {
        let mut payload = Payload::new();
        payload.insert(key.to_string(), Value::String(value.to_string()));
        payload
    }

    /// `{"coin": symbol}`
    pub fn coin(symbol: &str) -> Payload {
        single("coin", symbol)
    }

    /// `{"user": address}`
    pub fn user(address: &str) -> Payload {
        single("user", address)
    }

    /// `{"coin": symbol, "interval": interval}`
    pub fn candle(symbol: &str, interval: &str) -> Payload {
        let mut payload = coin(symbol);
        payload.insert("interval".to_string(), Value::String(interval.to_string()));
        payload
    }
}
