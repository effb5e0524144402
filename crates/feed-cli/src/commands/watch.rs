//! 채널 구독 명령.

use anyhow::{bail, Result};
use feed_core::{AppConfig, ChannelName, Payload};
use feed_stream::handler::{self, payload};
use feed_stream::{FeedRuntime, Handler, SubscriptionConfig};
use serde::Serialize;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

const METRICS_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// 구독 옵션.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub channel: ChannelName,
    pub coin: Option<String>,
    pub user: Option<String>,
    pub interval: Option<String>,
    pub single: bool,
}

impl WatchOptions {
    /// 채널에 맞는 구독 payload를 만듭니다.
    pub fn payload(&self) -> Result<Payload> {
        let coin = || match &self.coin {
            Some(coin) => Ok(coin.as_str()),
            None => bail!("--coin is required for channel {}", self.channel),
        };
        let user = || match &self.user {
            Some(user) => Ok(user.as_str()),
            None => bail!("--user is required for channel {}", self.channel),
        };

        let payload = match self.channel {
            ChannelName::OrderBook
            | ChannelName::OrderBookTrades
            | ChannelName::ActiveSymbolContext => payload::coin(coin()?),
            ChannelName::UserFills
            | ChannelName::UserHistoricalOrders
            | ChannelName::Notification => payload::user(user()?),
            ChannelName::Candle => {
                let Some(interval) = self.interval.as_deref() else {
                    bail!("--interval is required for channel candle");
                };
                payload::candle(coin()?, interval)
            }
            ChannelName::SymbolMetadataSnapshot => Payload::new(),
        };
        Ok(payload)
    }

    fn handler(&self) -> Handler {
        match self.channel {
            ChannelName::OrderBook => handler::order_book(print_record),
            ChannelName::OrderBookTrades => handler::trades(print_record),
            ChannelName::UserFills => handler::user_fills(print_record),
            ChannelName::UserHistoricalOrders => handler::user_historical_orders(print_record),
            ChannelName::SymbolMetadataSnapshot => handler::symbol_metadata_snapshot(print_record),
            ChannelName::ActiveSymbolContext => handler::active_symbol_context(print_record),
            ChannelName::Candle => handler::candle(print_record),
            ChannelName::Notification => handler::notification(print_record),
        }
    }

    pub fn subscription(&self) -> Result<SubscriptionConfig> {
        let mut config = SubscriptionConfig::from_handler(self.handler()).with_payload(self.payload()?);
        if self.single {
            config = config.single();
        }
        Ok(config)
    }
}

fn print_record<T: Serialize>(record: T) {
    match serde_json::to_string(&record) {
        Ok(line) => println!("{}", line),
        Err(e) => warn!(error = %e, "Failed to serialize record"),
    }
}

/// 구독을 등록하고 종료 신호까지 레코드를 출력합니다.
pub async fn run(config: AppConfig, options: WatchOptions) -> Result<()> {
    let subscription = options.subscription()?;
    let runtime = FeedRuntime::from_config(config);

    let handle = runtime.multiplexer().subscribe(options.channel, subscription);
    info!(channel = %options.channel, id = %handle.id, "Subscribed");

    runtime.start().await;

    let mut ticker = tokio::time::interval(METRICS_LOG_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    let shutdown = super::shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let metrics = runtime.connection().metrics();
                info!(
                    state = %runtime.connection().state(),
                    frames = metrics.frames_received,
                    dispatched = metrics.frames_dispatched,
                    parse_errors = metrics.parse_errors,
                    reconnects = metrics.reconnects,
                    "Feed status"
                );
            }
        }
    }

    runtime.multiplexer().cancel(&handle);
    runtime.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn options(channel: ChannelName) -> WatchOptions {
        WatchOptions {
            channel,
            coin: None,
            user: None,
            interval: None,
            single: false,
        }
    }

    #[test]
    fn test_payload_per_channel() {
        let mut book = options(ChannelName::OrderBook);
        assert!(book.payload().is_err());
        book.coin = Some("BTC".to_string());
        assert_eq!(Value::Object(book.payload().unwrap()), json!({"coin": "BTC"}));

        let mut fills = options(ChannelName::UserFills);
        fills.user = Some("0xabc".to_string());
        assert_eq!(Value::Object(fills.payload().unwrap()), json!({"user": "0xabc"}));

        let snapshot = options(ChannelName::SymbolMetadataSnapshot);
        assert!(snapshot.payload().unwrap().is_empty());
    }

    #[test]
    fn test_candle_requires_interval() {
        let mut candle = options(ChannelName::Candle);
        candle.coin = Some("ETH".to_string());
        assert!(candle.payload().is_err());

        candle.interval = Some("1m".to_string());
        assert_eq!(
            Value::Object(candle.payload().unwrap()),
            json!({"coin": "ETH", "interval": "1m"})
        );
    }
}
