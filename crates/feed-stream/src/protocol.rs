//! 스트리밍 제어 프로토콜.
//!
//! ```text
//! 송신: {"method":"subscribe","subscription":{"type":"order-book","coin":"BTC"}}
//! 송신: {"method":"unsubscribe","subscription":{"type":"order-book","coin":"BTC"}}
//! 수신: {"channel":"order-book","data":{...}}
//! ```

use crate::error::StreamResult;
use feed_core::Payload;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// 제어 메시지 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Subscribe,
    Unsubscribe,
}

/// 송신 제어 메시지.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlMessage {
    pub method: Method,
    pub channel: String,
    pub payload: Payload,
}

impl ControlMessage {
    pub fn subscribe(channel: impl Into<String>, payload: &Payload) -> Self {
        Self {
            method: Method::Subscribe,
            channel: channel.into(),
            payload: payload.clone(),
        }
    }

    pub fn unsubscribe(channel: impl Into<String>, payload: &Payload) -> Self {
        Self {
            method: Method::Unsubscribe,
            channel: channel.into(),
            payload: payload.clone(),
        }
    }

    /// 와이어 형식 JSON 값을 생성합니다.
    ///
    /// payload에 `type` 키가 있어도 채널 이름이 우선합니다.
    pub fn to_value(&self) -> Value {
        let mut subscription = self.payload.clone();
        subscription.insert("type".to_string(), Value::String(self.channel.clone()));
        json!({
            "method": self.method,
            "subscription": subscription,
        })
    }

    pub fn to_json(&self) -> StreamResult<String> {
        Ok(serde_json::to_string(&self.to_value())?)
    }
}

/// 수신 프레임.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundFrame {
    pub channel: String,
    #[serde(default)]
    pub data: Value,
}

impl InboundFrame {
    pub fn parse(text: &str) -> StreamResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
