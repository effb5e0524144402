//! 계좌 마진 폴링 명령.

use anyhow::Result;
use feed_core::AppConfig;
use feed_stream::{AccountState, FeedRuntime};
use tracing::{info, warn};

/// 폴링 옵션.
#[derive(Debug, Clone)]
pub struct PollOptions {
    pub address: String,
    pub once: bool,
}

fn print_state(state: &AccountState) {
    if let Some(error) = &state.error {
        warn!(error = %error, "Account fetch failed");
    }
    let Some(balance) = &state.balance else {
        return;
    };

    println!(
        "account_value={} margin_used={} withdrawable={} positions={}",
        balance.account_value,
        balance.margin_used,
        balance.withdrawable,
        state.positions.len()
    );
    for position in &state.positions {
        println!(
            "  {} {:?} size={} entry={} mark={} pnl={}",
            position.symbol,
            position.side,
            position.size,
            position.entry_price,
            position.mark_price,
            position.unrealized_pnl
        );
    }
}

/// 계좌를 구독하고 상태가 바뀔 때마다 출력합니다.
pub async fn run(config: AppConfig, options: PollOptions) -> Result<()> {
    let runtime = FeedRuntime::from_config(config);

    if options.once {
        let snapshot = runtime.fetch_account(&options.address).await?;
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    let mut states = runtime.account_store().subscribe();
    runtime.watch_account(&options.address);
    info!(address = %options.address, market = runtime.poller().market(), "Polling account");

    let shutdown = super::shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                if !state.loading {
                    print_state(&state);
                }
            }
        }
    }

    runtime.poller().unsubscribe();
    runtime.shutdown().await;
    Ok(())
}
