//! tracing 기반 로깅 초기화.
//!
//! `[logging]` 설정 섹션의 `level`과 `format`(pretty / json / compact)을
//! 그대로 subscriber에 반영합니다. `RUST_LOG`가 있으면 레벨보다 우선합니다.

use crate::config::LoggingConfig;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// 로그 출력 형식.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// 해석된 로깅 설정.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// 레벨 필터 (예: "info", "feed_stream=debug")
    pub level: String,
    pub format: LogFormat,
}

impl LogConfig {
    /// 설정 파일의 `[logging]` 섹션으로부터 생성합니다.
    ///
    /// 형식 문자열을 해석할 수 없으면 pretty를 사용합니다.
    pub fn from_logging_config(config: &LoggingConfig) -> Self {
        Self {
            level: config.level.clone(),
            format: config.format.parse().unwrap_or_default(),
        }
    }

    fn env_filter(&self) -> Result<EnvFilter, tracing_subscriber::filter::ParseError> {
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&self.level))
    }
}

/// 전역 subscriber를 설치합니다. 이미 설치되어 있으면 에러를 반환합니다.
///
/// ```no_run
/// use feed_core::{init_logging, AppConfig, LogConfig};
///
/// let config = AppConfig::default();
/// init_logging(LogConfig::from_logging_config(&config.logging)).unwrap();
/// ```
pub fn init_logging(config: LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Json => fmt::layer().json().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(config.env_filter()?)
        .try_init()?;

    tracing::info!(format = ?config.format, level = %config.level, "Logging initialized");
    Ok(())
}

/// 채널 컨텍스트 필드를 가진 span을 생성합니다.
///
/// 구독 핸들러 호출을 감싸 로그에 채널과 구독 ID가 붙도록 합니다.
#[macro_export]
macro_rules! channel_span {
    ($name:expr, $channel:expr) => {
        tracing::info_span!($name, channel = %$channel)
    };
    ($name:expr, $channel:expr, $id:expr) => {
        tracing::info_span!($name, channel = %$channel, subscription_id = %$id)
    };
}
