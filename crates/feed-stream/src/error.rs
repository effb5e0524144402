//! 스트림 에러 타입.

use feed_core::{DecodeError, FeedError};
use thiserror::Error;

/// 스트리밍 연결과 계좌 폴링에서 발생하는 에러.
#[derive(Debug, Error)]
pub enum StreamError {
    /// WebSocket 전송 에러
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// 연결 끊김
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// 프레임 파싱 에러
    #[error("Parse error: {0}")]
    Parse(String),

    /// payload 디코딩 에러
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// 마진 조회 실패
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// HTTP 상태 코드 에러
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 활성 구독 없이 강제 갱신 요청
    #[error("No active account subscription")]
    NoActiveSubscription,

    /// 설정 에러
    #[error("Config error: {0}")]
    Config(String),
}

/// 스트림 작업을 위한 Result 타입.
pub type StreamResult<T> = Result<T, StreamError>;

impl StreamError {
    /// 재시도 가능한 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        match self {
            StreamError::WebSocket(_)
            | StreamError::Disconnected(_)
            | StreamError::Fetch(_)
            | StreamError::Timeout(_) => true,
            StreamError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// 권장 재시도 대기 시간(밀리초) 반환.
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            StreamError::Http { status: 429, .. } => Some(10_000),
            StreamError::Http { status, .. } if *status >= 500 => Some(2000),
            StreamError::WebSocket(_) => Some(2000),
            StreamError::Disconnected(_) => Some(500),
            StreamError::Fetch(_) => Some(1000),
            StreamError::Timeout(_) => Some(500),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StreamError::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            StreamError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            StreamError::Parse(err.to_string())
        } else {
            StreamError::Fetch(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                StreamError::Disconnected(err.to_string())
            }
            other => StreamError::WebSocket(other.to_string()),
        }
    }
}

impl From<FeedError> for StreamError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::Decode(e) => StreamError::Decode(e),
            other => StreamError::Config(other.to_string()),
        }
    }
}
