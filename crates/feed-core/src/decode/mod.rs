//! 서버 payload 디코더.
//!
//! 채널 핸들러가 동기적으로 호출하는 순수 함수들입니다. 모든 디코더는
//! `serde_json::Value`를 받아 정규화된 도메인 레코드를 반환합니다.
//!
//! # 에러 처리
//!
//! 배치 payload(호가 레벨, 체결 목록, 포지션 등)는 레코드 단위로 디코딩합니다.
//! 잘못된 레코드 하나는 경고 로그를 남기고 건너뛰며, 나머지 배치는 그대로
//! 전달됩니다. envelope 자체가 잘못된 경우에만 [`DecodeError`]를 반환합니다.

mod account;
mod book;
mod symbol;
mod user;

pub use account::decode_account_margin;
pub use book::{decode_candle, decode_notification, decode_order_book, decode_trades};
pub use symbol::{decode_active_symbol_context, decode_symbol_metadata_snapshot};
pub use user::{decode_user_fills, decode_user_historical_orders};

use crate::error::DecodeError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

/// 밀리초 타임스탬프를 UTC 시각으로 변환합니다.
pub(crate) fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

/// JSON 값을 원시 서버 구조체로 역직렬화합니다.
pub(crate) fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T, DecodeError> {
    T::deserialize(value).map_err(DecodeError::from)
}

/// 배열 envelope를 꺼냅니다.
pub(crate) fn expect_array<'a>(
    value: &'a Value,
    record: &'static str,
) -> Result<&'a [Value], DecodeError> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or(DecodeError::UnexpectedShape {
            record,
            expected: "array",
        })
}

/// 레코드를 하나씩 디코딩하고 실패한 레코드는 건너뜁니다.
pub(crate) fn decode_each<R>(
    items: &[Value],
    record: &'static str,
    decode: impl Fn(&Value) -> Result<R, DecodeError>,
) -> Vec<R> {
    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match decode(item) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(record, index, error = %e, "Skipping malformed record");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_each_skips_failures() {
        let items = vec![json!(1), json!("x"), json!(3)];
        let decoded = decode_each(&items, "number", |v| {
            v.as_i64().ok_or(DecodeError::UnexpectedShape {
                record: "number",
                expected: "integer",
            })
        });
        assert_eq!(decoded, vec![1, 3]);
    }

    #[test]
    fn test_expect_array_rejects_object() {
        assert!(expect_array(&json!({"a": 1}), "trades").is_err());
        assert_eq!(expect_array(&json!([1, 2]), "trades").unwrap().len(), 2);
    }

    #[test]
    fn test_millis_to_datetime() {
        assert_eq!(millis_to_datetime(1_700_000_000_000).timestamp(), 1_700_000_000);
    }
}
