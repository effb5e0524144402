//! 시장 데이터 피드 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # BTC 호가창 구독
//! feed watch order-book --coin BTC
//!
//! # 1분 캔들 구독
//! feed watch candle --coin ETH --interval 1m
//!
//! # 계좌 마진 폴링
//! feed poll --address 0xabc...
//!
//! # 현재 설정 출력
//! feed config
//! ```

use clap::{Parser, Subcommand};
use feed_core::{init_logging, AppConfig, ChannelName, LogConfig};
use std::path::PathBuf;

mod commands;

use commands::poll::PollOptions;
use commands::watch::WatchOptions;

#[derive(Parser)]
#[command(name = "feed")]
#[command(about = "Real-time market feed client", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 설정 파일 (기본: config/default.toml, 없으면 기본값)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 로그 레벨 (trace, debug, info, warn, error). 설정 파일보다 우선
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// 채널을 구독하고 디코딩된 레코드를 출력
    Watch {
        /// 채널 이름 (order-book, order-book-trades, user-fills, candle, ...)
        channel: ChannelName,

        /// 심볼 (예: BTC)
        #[arg(long)]
        coin: Option<String>,

        /// 사용자 주소
        #[arg(long)]
        user: Option<String>,

        /// 캔들 간격 (예: 1m, 15m, 1h)
        #[arg(long)]
        interval: Option<String>,

        /// 같은 채널의 기존 구독을 대체
        #[arg(long, default_value = "false")]
        single: bool,
    },

    /// 계좌 마진을 주기적으로 조회
    Poll {
        /// 계좌 주소
        #[arg(short, long)]
        address: String,

        /// 한 번만 조회하고 종료
        #[arg(long, default_value = "false")]
        once: bool,
    },

    /// 적용된 설정을 JSON으로 출력
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(Some(path))?,
        None => AppConfig::load_default()?,
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    init_logging(LogConfig::from_logging_config(&config.logging))
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    match cli.command {
        Commands::Watch {
            channel,
            coin,
            user,
            interval,
            single,
        } => {
            let options = WatchOptions {
                channel,
                coin,
                user,
                interval,
                single,
            };
            commands::watch::run(config, options).await?;
        }
        Commands::Poll { address, once } => {
            commands::poll::run(config, PollOptions { address, once }).await?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
