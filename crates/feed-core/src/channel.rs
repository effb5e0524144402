//! 채널 이름 및 구독 payload 정의.
//!
//! 이 모듈은 스트리밍 연결 위의 논리 채널을 식별하는 타입을 정의합니다:
//! - `ChannelName` - 애플리케이션이 사용하는 채널 어휘
//! - `Payload` - 채널을 좁히는 필터 (예: 심볼, 사용자 주소)
//! - `PayloadKey` - payload 동등성 비교를 위한 정규화된 키

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// 구독 필터 payload.
///
/// 와이어 메시지의 `subscription` 객체에 `type`과 함께 펼쳐집니다.
pub type Payload = Map<String, Value>;

/// 애플리케이션이 사용하는 채널 어휘.
///
/// 멀티플렉서 자체는 임의의 문자열 채널을 허용하며,
/// 이 enum은 나머지 애플리케이션이 쓰는 상수 목록입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelName {
    /// 호가창
    OrderBook,
    /// 호가창 체결
    OrderBookTrades,
    /// 사용자 체결
    UserFills,
    /// 사용자 과거 주문
    UserHistoricalOrders,
    /// 전체 심볼 메타데이터 스냅샷
    SymbolMetadataSnapshot,
    /// 현재 보고 있는 심볼 컨텍스트
    ActiveSymbolContext,
    /// 알림
    Notification,
    /// 캔들
    Candle,
}

impl ChannelName {
    /// 모든 채널 반환.
    pub fn all() -> [ChannelName; 8] {
        [
            ChannelName::OrderBook,
            ChannelName::OrderBookTrades,
            ChannelName::UserFills,
            ChannelName::UserHistoricalOrders,
            ChannelName::SymbolMetadataSnapshot,
            ChannelName::ActiveSymbolContext,
            ChannelName::Notification,
            ChannelName::Candle,
        ]
    }

    /// 와이어 상의 채널 이름 반환.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelName::OrderBook => "order-book",
            ChannelName::OrderBookTrades => "order-book-trades",
            ChannelName::UserFills => "user-fills",
            ChannelName::UserHistoricalOrders => "user-historical-orders",
            ChannelName::SymbolMetadataSnapshot => "symbol-metadata-snapshot",
            ChannelName::ActiveSymbolContext => "active-symbol-context",
            ChannelName::Notification => "notification",
            ChannelName::Candle => "candle",
        }
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChannelName::all()
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("Unknown channel: {}", s))
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<ChannelName> for String {
    fn from(channel: ChannelName) -> Self {
        channel.as_str().to_string()
    }
}

/// 정규화된 payload 키.
///
/// 객체 키를 재귀적으로 정렬한 JSON 문자열입니다. 필드 삽입 순서와
/// 무관하게 같은 payload는 같은 키를 가지므로 해시맵 키로 사용합니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PayloadKey(String);

impl PayloadKey {
    /// payload에서 키를 생성합니다.
    pub fn from_payload(payload: &Payload) -> Self {
        let mut out = String::new();
        write_object(payload, &mut out);
        Self(out)
    }

    /// 키 문자열 반환.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PayloadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn write_object(map: &Payload, out: &mut String) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_string(key, out);
        out.push(':');
        write_value(&map[key.as_str()], out);
    }
    out.push('}');
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::String(s) => write_string(s, out),
        // null, bool, number은 serde_json 표현이 이미 정규형
        other => out.push_str(&other.to_string()),
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push_str(&Value::String(s.to_string()).to_string());
}

/// JSON 값을 payload로 변환합니다.
///
/// 객체가 아니면 `None`, `null`은 빈 payload입니다.
pub fn payload_from_value(value: Value) -> Option<Payload> {
    match value {
        Value::Object(map) => Some(map),
        Value::Null => Some(Payload::new()),
        _ => None,
    }
}
