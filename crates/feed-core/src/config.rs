//! 설정 관리.
//!
//! 스트리밍 연결, 재연결 정책, 계좌 폴링, 로깅 설정을 정의합니다.
//! 설정은 TOML 파일(선택)과 `FEED__` 접두사 환경 변수에서 로드됩니다.
//!
//! ```text
//! FEED__STREAM__URL=wss://api.example.com/ws
//! FEED__POLLER__TICK_INTERVAL_MS=1000
//! FEED__STREAM__RECONNECT__MAX_ATTEMPTS=20
//! ```

use crate::error::FeedResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// 스트리밍 연결 설정
    #[serde(default)]
    pub stream: StreamConfig,
    /// 계좌 폴링 설정
    #[serde(default)]
    pub poller: PollerConfig,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 구독 해제 시 와이어 메시지 전송 정책.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsubscribePolicy {
    /// 개별 구독 해제 시 서버에 아무것도 보내지 않음
    Silent,
    /// 제거된 구독의 payload로 unsubscribe 메시지 전송
    #[default]
    LastPayload,
}

/// 스트리밍 연결 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    /// WebSocket URL
    #[serde(default = "default_stream_url")]
    pub url: String,
    /// Ping 간격 (초)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    /// 개별 구독 해제 정책
    #[serde(default)]
    pub unsubscribe_policy: UnsubscribePolicy,
    /// 재연결 정책
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

fn default_stream_url() -> String {
    "wss://api.hyperliquid.xyz/ws".to_string()
}
fn default_ping_interval() -> u64 {
    30
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: default_stream_url(),
            ping_interval_secs: default_ping_interval(),
            unsubscribe_policy: UnsubscribePolicy::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl StreamConfig {
    /// Ping 간격을 Duration으로 반환
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }
}

/// 재연결 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconnectConfig {
    /// 자동 재연결 활성화
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 첫 재연결 대기 (밀리초)
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    /// 최대 재연결 대기 (밀리초)
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// 시도마다 곱해지는 배수
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// 지연에 더해지는 무작위 비율 (0.0 ~ 1.0)
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    /// 최대 연속 시도 횟수 (없으면 무제한)
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

fn default_true() -> bool {
    true
}
fn default_initial_delay() -> u64 {
    500
}
fn default_max_delay() -> u64 {
    15_000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_jitter() -> f64 {
    0.2
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
            max_attempts: None,
        }
    }
}

/// 계좌 폴링 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollerConfig {
    /// 마진 조회 HTTP 엔드포인트
    #[serde(default = "default_info_url")]
    pub info_url: String,
    /// 조회 대상 마켓 식별자
    #[serde(default = "default_market")]
    pub market: String,
    /// 타이머 주기 (밀리초)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// 실제 조회 간 최소 간격 (밀리초)
    #[serde(default = "default_min_fetch_interval")]
    pub min_fetch_interval_ms: u64,
}

fn default_info_url() -> String {
    "https://api.hyperliquid.xyz/info".to_string()
}
fn default_market() -> String {
    "perp".to_string()
}
fn default_tick_interval() -> u64 {
    1000
}
fn default_min_fetch_interval() -> u64 {
    900
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            info_url: default_info_url(),
            market: default_market(),
            tick_interval_ms: default_tick_interval(),
            min_fetch_interval_ms: default_min_fetch_interval(),
        }
    }
}

impl PollerConfig {
    /// 타이머 주기를 Duration으로 반환
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// 최소 조회 간격을 Duration으로 반환
    pub fn min_fetch_interval(&self) -> Duration {
        Duration::from_millis(self.min_fetch_interval_ms)
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// 파일(선택)과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일이 없으면 기본값 위에 환경 변수만 적용합니다.
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> FeedResult<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path.as_ref()).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("FEED")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// 기본 경로(`config/default.toml`)가 있으면 함께 로드합니다.
    pub fn load_default() -> FeedResult<Self> {
        let path = Path::new("config/default.toml");
        if path.exists() {
            Self::load(Some(path))
        } else {
            Self::load(None::<&Path>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.poller.tick_interval(), Duration::from_millis(1000));
        assert_eq!(config.poller.min_fetch_interval(), Duration::from_millis(900));
        assert_eq!(config.stream.ping_interval(), Duration::from_secs(30));
        assert_eq!(config.stream.unsubscribe_policy, UnsubscribePolicy::LastPayload);
        assert!(config.stream.reconnect.enabled);
        assert_eq!(config.stream.reconnect.max_attempts, None);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml = r#"
            [stream]
            url = "ws://localhost:9000/ws"
            unsubscribe_policy = "silent"

            [stream.reconnect]
            max_attempts = 3

            [poller]
            tick_interval_ms = 250
        "#;

        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.stream.url, "ws://localhost:9000/ws");
        assert_eq!(config.stream.unsubscribe_policy, UnsubscribePolicy::Silent);
        assert_eq!(config.stream.reconnect.max_attempts, Some(3));
        assert_eq!(config.stream.reconnect.initial_delay_ms, 500);
        assert_eq!(config.poller.tick_interval_ms, 250);
        assert_eq!(config.poller.min_fetch_interval_ms, 900);
        assert_eq!(config.logging.level, "info");
    }
}
