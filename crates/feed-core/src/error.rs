//! 피드 코어 에러 타입.
//!
//! 설정 로드와 payload 디코딩 과정에서 발생하는 에러를 정의합니다.

use thiserror::Error;

/// 코어 에러.
#[derive(Debug, Error)]
pub enum FeedError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 디코딩 에러
    #[error("디코딩 에러: {0}")]
    Decode(#[from] DecodeError),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),
}

/// 코어 작업을 위한 Result 타입.
pub type FeedResult<T> = Result<T, FeedError>;

/// 서버 payload 디코딩 에러.
///
/// 레코드 단위 실패는 디코더 내부에서 로그를 남기고 건너뛰므로,
/// 이 에러는 envelope 자체가 잘못된 경우에만 반환됩니다.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// 예상한 JSON 형태가 아님
    #[error("unexpected shape for {record}: expected {expected}")]
    UnexpectedShape {
        record: &'static str,
        expected: &'static str,
    },

    /// 필수 필드 누락
    #[error("missing field `{field}` in {record}")]
    MissingField {
        record: &'static str,
        field: &'static str,
    },

    /// 알 수 없는 enum 값
    #[error("invalid value `{value}` for {field}")]
    InvalidValue { field: &'static str, value: String },

    /// serde 역직렬화 실패
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<config::ConfigError> for FeedError {
    fn from(err: config::ConfigError) -> Self {
        FeedError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_wraps_into_feed_error() {
        let err: FeedError = DecodeError::MissingField {
            record: "order book",
            field: "levels",
        }
        .into();

        assert!(matches!(err, FeedError::Decode(_)));
        assert!(err.to_string().contains("levels"));
    }
}
