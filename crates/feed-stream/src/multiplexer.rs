//! 구독 다중화기.
//!
//! 하나의 스트리밍 연결 위에서 여러 논리 구독을 관리합니다.
//!
//! # 동작
//!
//! - `subscribe`: 레지스트리에 등록하고 subscribe 제어 메시지 전송
//! - `unsubscribe`: 식별자로 제거, 해제 정책에 따라 unsubscribe 전송
//! - `unsubscribe_all_by_channel`: 채널의 모든 구독 제거 및 unsubscribe 전송
//! - `dispatch`: 수신 프레임을 채널의 모든 핸들러에 등록 순서대로 전달
//!
//! 연결이 열려 있지 않을 때의 송신은 버려집니다. 연결이 열리면
//! [`attach`](SubscriptionMultiplexer::attach)가 레지스트리 전체를 다시 구독합니다.
//!
//! 레지스트리와 송신 링크는 하나의 잠금 아래에 있고, 핸들러는 잠금을
//! 해제한 뒤 호출됩니다. 핸들러 안에서 `subscribe`/`unsubscribe`를 호출해도
//! 진행 중인 분배에는 영향을 주지 않습니다.

use crate::protocol::ControlMessage;
use crate::registry::{ChannelRegistry, Entry, SubscriptionConfig, SubscriptionId};
use feed_core::{Payload, PayloadKey, UnsubscribePolicy};
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

/// `subscribe` 호출 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// 새 구독이 추가됨
    Added,
    /// single 구독이 기존 구독을 대체함
    Replaced { evicted: Vec<SubscriptionId> },
    /// 같은 payload가 이미 등록되어 있어 등록하지 않음
    Duplicate { existing: SubscriptionId },
}

/// 구독 핸들.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub channel: String,
    pub id: SubscriptionId,
    pub outcome: SubscribeOutcome,
}

impl Subscription {
    /// 핸들러가 실제로 등록되었는지 여부.
    pub fn is_registered(&self) -> bool {
        !matches!(self.outcome, SubscribeOutcome::Duplicate { .. })
    }
}

/// 채널별 등록 현황.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSnapshot {
    pub channel: String,
    pub payloads: Vec<Payload>,
}

/// 현재 연결 세션의 송신 링크.
struct Link {
    session: u64,
    tx: mpsc::UnboundedSender<ControlMessage>,
}

struct Shared {
    registry: ChannelRegistry,
    link: Option<Link>,
}

impl Shared {
    fn send(&self, message: ControlMessage) {
        match &self.link {
            Some(link) => {
                if link.tx.send(message).is_err() {
                    debug!(session = link.session, "Outbound link closed, message dropped");
                }
            }
            None => {
                debug!(
                    channel = %message.channel,
                    method = ?message.method,
                    "Connection not open, message dropped"
                );
            }
        }
    }
}

struct Inner {
    shared: Mutex<Shared>,
    next_id: AtomicU64,
    unsubscribe_policy: UnsubscribePolicy,
}

/// 구독 다중화기.
///
/// 복제 비용이 낮으며 모든 복제본이 같은 레지스트리를 공유합니다.
#[derive(Clone)]
pub struct SubscriptionMultiplexer {
    inner: Arc<Inner>,
}

impl Default for SubscriptionMultiplexer {
    fn default() -> Self {
        Self::new(UnsubscribePolicy::default())
    }
}

impl SubscriptionMultiplexer {
    pub fn new(unsubscribe_policy: UnsubscribePolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared {
                    registry: ChannelRegistry::new(),
                    link: None,
                }),
                next_id: AtomicU64::new(1),
                unsubscribe_policy,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        // 핸들러는 잠금 밖에서 실행되므로 poison 상태여도 레지스트리는 일관됨
        self.inner
            .shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn unsubscribe_policy(&self) -> UnsubscribePolicy {
        self.inner.unsubscribe_policy
    }

    // ========================================================================
    // 구독 관리
    // ========================================================================

    /// 채널을 구독합니다.
    ///
    /// 채널 이름은 검증하지 않습니다. subscribe 제어 메시지는 중복 구독인
    /// 경우에도 항상 전송됩니다.
    pub fn subscribe(&self, channel: impl Into<String>, config: SubscriptionConfig) -> Subscription {
        let channel = channel.into();
        let id = self.next_id();
        let single = config.single;
        let entry = Entry::new(id, config);
        let subscribe = ControlMessage::subscribe(channel.as_str(), &entry.payload);

        let mut shared = self.lock();

        let outcome = if single {
            let evicted = shared.registry.replace(&channel, entry);
            for old in &evicted {
                shared.send(ControlMessage::unsubscribe(channel.as_str(), &old.payload));
            }
            SubscribeOutcome::Replaced {
                evicted: evicted.iter().map(|e| e.id).collect(),
            }
        } else if let Some(existing) = shared.registry.find(&channel, &entry.key) {
            SubscribeOutcome::Duplicate { existing }
        } else {
            shared.registry.push(&channel, entry);
            SubscribeOutcome::Added
        };

        shared.send(subscribe);
        drop(shared);

        debug!(channel = %channel, subscription_id = %id, outcome = ?outcome, "Subscribed");

        Subscription {
            channel,
            id,
            outcome,
        }
    }

    /// 식별자로 구독을 제거합니다.
    ///
    /// 제거되었으면 true를 반환합니다. 등록되지 않은 식별자는 무시됩니다.
    pub fn unsubscribe(&self, channel: &str, id: SubscriptionId) -> bool {
        let mut shared = self.lock();
        let Some(removed) = shared.registry.remove(channel, id) else {
            trace!(channel, subscription_id = %id, "Unsubscribe for unknown subscription");
            return false;
        };

        if self.inner.unsubscribe_policy == UnsubscribePolicy::LastPayload {
            shared.send(ControlMessage::unsubscribe(channel, &removed.payload));
        }
        drop(shared);

        debug!(channel, subscription_id = %id, "Unsubscribed");
        true
    }

    /// [`Subscription`] 핸들로 구독을 제거합니다.
    pub fn cancel(&self, subscription: &Subscription) -> bool {
        self.unsubscribe(&subscription.channel, subscription.id)
    }

    /// 채널의 모든 구독을 제거하고 제거된 개수를 반환합니다.
    pub fn unsubscribe_all_by_channel(&self, channel: &str) -> usize {
        let mut shared = self.lock();
        let removed = shared.registry.remove_channel(channel);
        for entry in &removed {
            shared.send(ControlMessage::unsubscribe(channel, &entry.payload));
        }
        drop(shared);

        if !removed.is_empty() {
            debug!(channel, count = removed.len(), "Unsubscribed channel");
        }
        removed.len()
    }

    // ========================================================================
    // 수신 분배
    // ========================================================================

    /// 수신 데이터를 채널의 모든 핸들러에 전달합니다.
    ///
    /// 호출된 핸들러 수를 반환합니다. 패닉한 핸들러는 로그만 남기고
    /// 다음 핸들러를 계속 호출합니다.
    pub fn dispatch(&self, channel: &str, data: &Value) -> usize {
        let handlers = self.lock().registry.handlers(channel);
        let Some(handlers) = handlers else {
            trace!(channel, "Dropping frame for unknown channel");
            return 0;
        };

        let mut invoked = 0;
        for (id, handler) in handlers {
            let _span = feed_core::channel_span!("dispatch", channel, id).entered();
            match catch_unwind(AssertUnwindSafe(|| handler(data))) {
                Ok(()) => invoked += 1,
                Err(_) => {
                    error!(channel, subscription_id = %id, "Subscription handler panicked");
                }
            }
        }
        invoked
    }

    // ========================================================================
    // 연결 링크
    // ========================================================================

    /// 새로 열린 연결의 송신 링크를 연결하고 레지스트리 전체를 다시 구독합니다.
    ///
    /// 링크 연결과 복원 메시지 적재가 같은 잠금 안에서 이루어지므로
    /// 동시에 호출된 `subscribe`의 메시지는 복원 메시지 뒤에 놓입니다.
    /// 전송한 subscribe 메시지 수를 반환합니다.
    pub fn attach(&self, session: u64, tx: mpsc::UnboundedSender<ControlMessage>) -> usize {
        let mut shared = self.lock();
        shared.link = Some(Link { session, tx });

        let replay: Vec<ControlMessage> = shared
            .registry
            .iter()
            .map(|(channel, entry)| ControlMessage::subscribe(channel, &entry.payload))
            .collect();
        let count = replay.len();
        for message in replay {
            shared.send(message);
        }
        drop(shared);

        info!(session, replayed = count, "Subscriptions restored");
        count
    }

    /// 세션의 송신 링크를 해제합니다. 다른 세션의 링크는 건드리지 않습니다.
    pub fn detach(&self, session: u64) {
        let mut shared = self.lock();
        if shared.link.as_ref().is_some_and(|l| l.session == session) {
            shared.link = None;
            debug!(session, "Outbound link detached");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.lock().link.is_some()
    }

    // ========================================================================
    // 조회
    // ========================================================================

    /// 등록된 채널 목록 (최초 등록 순서).
    pub fn channels(&self) -> Vec<String> {
        self.lock().registry.channels()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.lock().registry.len(channel)
    }

    pub fn total_subscriptions(&self) -> usize {
        self.lock().registry.total()
    }

    /// 같은 payload로 채널이 구독되어 있는지 확인합니다.
    pub fn is_subscribed(&self, channel: &str, payload: &Payload) -> bool {
        let key = PayloadKey::from_payload(payload);
        self.lock().registry.find(channel, &key).is_some()
    }

    pub fn snapshot(&self) -> Vec<ChannelSnapshot> {
        let shared = self.lock();
        let mut snapshots: Vec<ChannelSnapshot> = Vec::new();
        for (channel, entry) in shared.registry.iter() {
            match snapshots.last_mut() {
                Some(last) if last.channel == channel => last.payloads.push(entry.payload.clone()),
                _ => snapshots.push(ChannelSnapshot {
                    channel: channel.to_string(),
                    payloads: vec![entry.payload.clone()],
                }),
            }
        }
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Method;
    use feed_core::payload_from_value;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn payload(value: Value) -> Payload {
        payload_from_value(value).unwrap_or_default()
    }

    fn attached(policy: UnsubscribePolicy) -> (SubscriptionMultiplexer, mpsc::UnboundedReceiver<ControlMessage>) {
        let mux = SubscriptionMultiplexer::new(policy);
        let (tx, rx) = mpsc::unbounded_channel();
        mux.attach(1, tx);
        (mux, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ControlMessage>) -> Vec<ControlMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn test_writes_dropped_while_detached() {
        let mux = SubscriptionMultiplexer::default();
        let sub = mux.subscribe("trades", SubscriptionConfig::new(|_| {}));
        assert_eq!(sub.outcome, SubscribeOutcome::Added);
        assert!(!mux.is_attached());
        assert_eq!(mux.subscriber_count("trades"), 1);
    }

    #[test]
    fn test_unsubscribe_policy_silent() {
        let (mux, mut rx) = attached(UnsubscribePolicy::Silent);
        let sub = mux.subscribe(
            "user-fills",
            SubscriptionConfig::new(|_| {}).with_payload(payload(json!({"user": "0x1"}))),
        );
        drain(&mut rx);

        assert!(mux.cancel(&sub));
        assert!(drain(&mut rx).is_empty());
        assert!(mux.channels().is_empty());
    }

    #[test]
    fn test_unsubscribe_policy_last_payload() {
        let (mux, mut rx) = attached(UnsubscribePolicy::LastPayload);
        let sub = mux.subscribe(
            "user-fills",
            SubscriptionConfig::new(|_| {}).with_payload(payload(json!({"user": "0x1"}))),
        );
        drain(&mut rx);

        assert!(mux.unsubscribe("user-fills", sub.id));
        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, Method::Unsubscribe);
        assert_eq!(sent[0].payload, payload(json!({"user": "0x1"})));

        // 두 번째 해제는 무시
        assert!(!mux.unsubscribe("user-fills", sub.id));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_duplicate_handle_is_not_registered() {
        let mux = SubscriptionMultiplexer::default();
        let first = mux.subscribe("order-book", SubscriptionConfig::new(|_| {}));
        let second = mux.subscribe("order-book", SubscriptionConfig::new(|_| {}));

        assert_eq!(
            second.outcome,
            SubscribeOutcome::Duplicate { existing: first.id }
        );
        assert!(!second.is_registered());
        assert!(!mux.cancel(&second));
        assert_eq!(mux.subscriber_count("order-book"), 1);
    }

    #[test]
    fn test_panicking_handler_does_not_stop_fan_out() {
        let mux = SubscriptionMultiplexer::default();
        let calls = Arc::new(AtomicUsize::new(0));

        mux.subscribe(
            "notification",
            SubscriptionConfig::new(|_| panic!("boom")).with_payload(payload(json!({"n": 1}))),
        );
        let counter = Arc::clone(&calls);
        mux.subscribe(
            "notification",
            SubscriptionConfig::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .with_payload(payload(json!({"n": 2}))),
        );

        assert_eq!(mux.dispatch("notification", &json!("hi")), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(mux.subscriber_count("notification"), 2);

        // 이후 호출도 정상 동작
        assert_eq!(mux.dispatch("notification", &json!("again")), 1);
    }

    #[test]
    fn test_is_subscribed_and_snapshot() {
        let mux = SubscriptionMultiplexer::default();
        mux.subscribe(
            "candle",
            SubscriptionConfig::new(|_| {})
                .with_payload(payload(json!({"coin": "BTC", "interval": "1m"}))),
        );
        mux.subscribe(
            "candle",
            SubscriptionConfig::new(|_| {})
                .with_payload(payload(json!({"coin": "ETH", "interval": "1m"}))),
        );
        mux.subscribe("notification", SubscriptionConfig::new(|_| {}));

        assert!(mux.is_subscribed("candle", &payload(json!({"interval": "1m", "coin": "BTC"}))));
        assert!(!mux.is_subscribed("candle", &payload(json!({"coin": "SOL"}))));

        let snapshot = mux.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].channel, "candle");
        assert_eq!(snapshot[0].payloads.len(), 2);
        assert_eq!(snapshot[1].channel, "notification");
        assert_eq!(mux.total_subscriptions(), 3);
    }

    #[test]
    fn test_detach_ignores_other_session() {
        let mux = SubscriptionMultiplexer::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        mux.attach(2, tx);

        mux.detach(1);
        assert!(mux.is_attached());
        mux.detach(2);
        assert!(!mux.is_attached());
    }
}
