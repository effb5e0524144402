//! 공용 테스트 도구: 메모리 내 전송 계층, 기록용 마진 조회 원천과 상태 저장소.

#![allow(dead_code)]

use async_trait::async_trait;
use feed_core::AccountSnapshot;
use feed_stream::connection::{FrameSink, FrameStream, Message};
use feed_stream::{AccountSink, MarginSource, StreamError, StreamResult, Transport};
use futures::channel::mpsc as fmpsc;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

/// 생성된 태스크가 모두 유휴 상태가 될 때까지 진행 (시간 정지 상태).
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// ============================================================================
// 메모리 내 전송 계층
// ============================================================================

/// 메모리 내 연결 하나의 서버 측.
pub struct MockSession {
    outbound: fmpsc::UnboundedReceiver<Message>,
    inbound: fmpsc::UnboundedSender<StreamResult<Message>>,
}

impl MockSession {
    /// 클라이언트가 보낸 다음 제어 메시지 (ping/pong 제외).
    pub async fn next_control(&mut self) -> Value {
        loop {
            match self.outbound.next().await.expect("client sink closed") {
                Message::Text(text) => return serde_json::from_str(&text).expect("control json"),
                _ => continue,
            }
        }
    }

    /// 클라이언트가 이미 보낸 제어 메시지 목록.
    pub fn drain_controls(&mut self) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(Some(message)) = self.outbound.try_next() {
            if let Message::Text(text) = message {
                out.push(serde_json::from_str(&text).expect("control json"));
            }
        }
        out
    }

    pub fn push(&self, frame: Value) {
        self.inbound
            .unbounded_send(Ok(Message::Text(frame.to_string())))
            .expect("client stream dropped");
    }

    pub fn push_raw(&self, text: &str) {
        self.inbound
            .unbounded_send(Ok(Message::Text(text.to_string())))
            .expect("client stream dropped");
    }

    pub fn push_message(&self, message: Message) {
        self.inbound
            .unbounded_send(Ok(message))
            .expect("client stream dropped");
    }

    /// 클라이언트가 보낸 다음 원시 프레임.
    pub async fn next_frame(&mut self) -> Option<Message> {
        self.outbound.next().await
    }

    /// 서버가 사라진 것처럼 스트림 종료.
    pub fn close(&self) {
        self.inbound.close_channel();
    }
}

/// 새 연결마다 [`MockSession`]을 테스트로 넘겨주는 전송 계층.
pub struct MockTransport {
    sessions: mpsc::UnboundedSender<MockSession>,
    failures: AtomicUsize,
    connects: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockSession>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            sessions: tx,
            failures: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
        });
        (transport, rx)
    }

    /// 다음 `count`번의 연결 시도를 거부.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn connect_attempts(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _url: &str) -> StreamResult<(FrameSink, FrameStream)> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(StreamError::WebSocket("connection refused".into()));
        }

        let (client_tx, server_rx) = fmpsc::unbounded::<Message>();
        let (server_tx, client_rx) = fmpsc::unbounded::<StreamResult<Message>>();

        self.sessions
            .send(MockSession {
                outbound: server_rx,
                inbound: server_tx,
            })
            .map_err(|_| StreamError::Disconnected("test dropped session receiver".into()))?;

        let sink: FrameSink =
            Box::pin(client_tx.sink_map_err(|e| StreamError::WebSocket(e.to_string())));
        let stream: FrameStream = Box::pin(client_rx);
        Ok((sink, stream))
    }
}

pub fn subscribe_msg(channel: &str, payload: Value) -> Value {
    control("subscribe", channel, payload)
}

pub fn unsubscribe_msg(channel: &str, payload: Value) -> Value {
    control("unsubscribe", channel, payload)
}

fn control(method: &str, channel: &str, payload: Value) -> Value {
    let mut subscription = payload.as_object().cloned().unwrap_or_default();
    subscription.insert("type".into(), Value::String(channel.into()));
    json!({"method": method, "subscription": subscription})
}

// ============================================================================
// 마진 조회 원천과 상태 저장소
// ============================================================================

pub fn margin_json(account_value: &str) -> Value {
    json!({
        "accountValue": account_value,
        "marginUsed": "10",
        "positions": [
            {"symbol": "BTC", "size": "0.1", "entryPrice": "60000", "markPrice": "61000",
             "unrealizedPnl": "100", "marginUsed": "610", "leverage": "10"}
        ]
    })
}

/// 예약된 응답을 돌려주고 요청 주소를 기록하는 마진 조회 원천.
pub struct ScriptedSource {
    calls: Mutex<Vec<String>>,
    responses: Mutex<VecDeque<StreamResult<Value>>>,
    fallback: Value,
}

impl ScriptedSource {
    pub fn new(fallback: Value) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            fallback,
        })
    }

    pub fn push_response(&self, response: StreamResult<Value>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl MarginSource for ScriptedSource {
    async fn fetch_margin(&self, address: &str, _market: &str) -> StreamResult<Value> {
        self.calls.lock().unwrap().push(address.to_string());
        let scripted = self.responses.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// 첫 호출 이후에는 해제될 때까지 대기하는 마진 조회 원천.
pub struct GatedSource {
    calls: AtomicUsize,
    gate: Semaphore,
}

impl GatedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            gate: Semaphore::new(0),
        })
    }

    pub fn release(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl MarginSource for GatedSource {
    async fn fetch_margin(&self, _address: &str, _market: &str) -> StreamResult<Value> {
        if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
            self.gate
                .acquire()
                .await
                .map_err(|e| StreamError::Fetch(e.to_string()))?
                .forget();
        }
        Ok(margin_json("500"))
    }
}

/// 첫 호출에서 패닉하고 이후에는 정상 응답하는 마진 조회 원천.
pub struct PanicOnceSource {
    calls: AtomicUsize,
}

impl PanicOnceSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarginSource for PanicOnceSource {
    async fn fetch_margin(&self, _address: &str, _market: &str) -> StreamResult<Value> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("margin source exploded");
        }
        Ok(margin_json("77"))
    }
}

/// 상태 저장소 호출 순서를 기록하는 sink.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl AccountSink for RecordingSink {
    fn set_loading(&self, loading: bool) {
        self.events.lock().unwrap().push(format!("loading:{loading}"));
    }

    fn apply_snapshot(&self, snapshot: &AccountSnapshot) {
        self.events
            .lock()
            .unwrap()
            .push(format!("snapshot:{}", snapshot.balance.account_value));
    }

    fn record_error(&self, message: String) {
        self.events.lock().unwrap().push(format!("error:{message}"));
    }

    fn clear(&self) {
        self.events.lock().unwrap().push("clear".to_string());
    }
}
