//! 채널 레지스트리.
//!
//! 채널 이름마다 구독 설정 목록을 등록 순서대로 보관합니다.
//!
//! # 불변 조건
//!
//! - 레지스트리에 있는 채널은 항상 하나 이상의 구독을 가집니다.
//!   마지막 구독이 제거되면 채널 키도 삭제됩니다.
//! - 한 채널 안에서 같은 payload 키를 가진 구독은 둘 이상 존재하지 않습니다.

use feed_core::{Payload, PayloadKey};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 채널 데이터 콜백.
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// 등록된 구독의 고유 식별자.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// 채널 구독 설정.
///
/// ```rust,ignore
/// let config = SubscriptionConfig::new(|data| println!("{data}"))
///     .with_payload(payload::coin("BTC"))
///     .single();
/// ```
#[derive(Clone)]
pub struct SubscriptionConfig {
    /// 채널 필터 (예: 심볼, 사용자 주소)
    pub payload: Payload,
    pub handler: Handler,
    /// true면 같은 채널의 기존 구독을 모두 대체
    pub single: bool,
}

impl SubscriptionConfig {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Self::from_handler(Arc::new(handler))
    }

    pub fn from_handler(handler: Handler) -> Self {
        Self {
            payload: Payload::new(),
            handler,
            single: false,
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }
}

impl fmt::Debug for SubscriptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionConfig")
            .field("payload", &self.payload)
            .field("single", &self.single)
            .finish_non_exhaustive()
    }
}

/// 레지스트리에 저장된 구독.
#[derive(Clone)]
pub(crate) struct Entry {
    pub id: SubscriptionId,
    pub key: PayloadKey,
    pub payload: Payload,
    pub handler: Handler,
}

impl Entry {
    pub fn new(id: SubscriptionId, config: SubscriptionConfig) -> Self {
        Self {
            id,
            key: PayloadKey::from_payload(&config.payload),
            payload: config.payload,
            handler: config.handler,
        }
    }
}

#[derive(Default)]
struct ChannelEntries {
    entries: Vec<Entry>,
    by_key: HashMap<PayloadKey, SubscriptionId>,
}

impl ChannelEntries {
    fn push(&mut self, entry: Entry) {
        self.by_key.insert(entry.key.clone(), entry.id);
        self.entries.push(entry);
    }

    fn remove(&mut self, id: SubscriptionId) -> Option<Entry> {
        let index = self.entries.iter().position(|e| e.id == id)?;
        let entry = self.entries.remove(index);
        self.by_key.remove(&entry.key);
        Some(entry)
    }
}

/// 채널 이름 → 구독 목록.
#[derive(Default)]
pub(crate) struct ChannelRegistry {
    channels: HashMap<String, ChannelEntries>,
    /// 채널 최초 등록 순서 (재연결 복원 순서)
    order: Vec<String>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 같은 payload 키로 등록된 구독을 찾습니다.
    pub fn find(&self, channel: &str, key: &PayloadKey) -> Option<SubscriptionId> {
        self.channels
            .get(channel)
            .and_then(|c| c.by_key.get(key).copied())
    }

    pub fn push(&mut self, channel: &str, entry: Entry) {
        if !self.channels.contains_key(channel) {
            self.order.push(channel.to_string());
        }
        self.channels
            .entry(channel.to_string())
            .or_default()
            .push(entry);
    }

    /// 채널의 구독을 `entry` 하나로 교체하고 기존 구독을 반환합니다.
    pub fn replace(&mut self, channel: &str, entry: Entry) -> Vec<Entry> {
        let evicted = match self.channels.get_mut(channel) {
            Some(existing) => std::mem::take(existing).entries,
            None => Vec::new(),
        };
        self.push(channel, entry);
        evicted
    }

    pub fn remove(&mut self, channel: &str, id: SubscriptionId) -> Option<Entry> {
        let entries = self.channels.get_mut(channel)?;
        let removed = entries.remove(id)?;
        if entries.entries.is_empty() {
            self.drop_channel(channel);
        }
        Some(removed)
    }

    pub fn remove_channel(&mut self, channel: &str) -> Vec<Entry> {
        self.drop_channel(channel)
            .map(|c| c.entries)
            .unwrap_or_default()
    }

    fn drop_channel(&mut self, channel: &str) -> Option<ChannelEntries> {
        let removed = self.channels.remove(channel)?;
        self.order.retain(|c| c != channel);
        Some(removed)
    }

    /// 채널 핸들러 스냅샷 (등록 순서).
    pub fn handlers(&self, channel: &str) -> Option<Vec<(SubscriptionId, Handler)>> {
        self.channels.get(channel).map(|c| {
            c.entries
                .iter()
                .map(|e| (e.id, Arc::clone(&e.handler)))
                .collect()
        })
    }

    /// (채널, 구독) 쌍을 채널 등록 순서대로 순회합니다.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.order.iter().flat_map(move |channel| {
            self.channels
                .get(channel)
                .into_iter()
                .flat_map(|c| c.entries.iter())
                .map(move |e| (channel.as_str(), e))
        })
    }

    pub fn channels(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, |c| c.entries.len())
    }

    pub fn total(&self) -> usize {
        self.channels.values().map(|c| c.entries.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_core::payload_from_value;
    use serde_json::json;

    fn entry(id: u64, payload: Value) -> Entry {
        let config = SubscriptionConfig::new(|_| {})
            .with_payload(payload_from_value(payload).unwrap_or_default());
        Entry::new(SubscriptionId::new(id), config)
    }

    #[test]
    fn test_empty_channel_is_removed() {
        let mut registry = ChannelRegistry::new();
        registry.push("trades", entry(1, json!({"coin": "BTC"})));
        registry.push("trades", entry(2, json!({"coin": "ETH"})));

        assert!(registry.remove("trades", SubscriptionId::new(1)).is_some());
        assert_eq!(registry.channels(), vec!["trades".to_string()]);

        assert!(registry.remove("trades", SubscriptionId::new(2)).is_some());
        assert!(registry.channels().is_empty());
        assert!(registry.handlers("trades").is_none());
    }

    #[test]
    fn test_find_by_canonical_key() {
        let mut registry = ChannelRegistry::new();
        registry.push("candle", entry(1, json!({"coin": "BTC", "interval": "1m"})));

        let key = PayloadKey::from_payload(
            &payload_from_value(json!({"interval": "1m", "coin": "BTC"})).unwrap(),
        );
        assert_eq!(registry.find("candle", &key), Some(SubscriptionId::new(1)));
        assert_eq!(registry.find("trades", &key), None);
    }

    #[test]
    fn test_replace_returns_evicted() {
        let mut registry = ChannelRegistry::new();
        registry.push("order-book", entry(1, json!({"coin": "BTC"})));
        registry.push("order-book", entry(2, json!({"coin": "ETH"})));

        let evicted = registry.replace("order-book", entry(3, json!({"coin": "SOL"})));
        assert_eq!(evicted.len(), 2);
        assert_eq!(registry.len("order-book"), 1);

        let stale_key =
            PayloadKey::from_payload(&payload_from_value(json!({"coin": "BTC"})).unwrap());
        assert_eq!(registry.find("order-book", &stale_key), None);
    }

    #[test]
    fn test_iter_follows_channel_registration_order() {
        let mut registry = ChannelRegistry::new();
        registry.push("b", entry(1, json!({})));
        registry.push("a", entry(2, json!({})));
        registry.push("b", entry(3, json!({"x": 1})));

        let order: Vec<(String, u64)> = registry
            .iter()
            .map(|(c, e)| (c.to_string(), e.id.as_u64()))
            .collect();
        assert_eq!(
            order,
            vec![("b".into(), 1), ("b".into(), 3), ("a".into(), 2)]
        );
        assert_eq!(registry.total(), 3);
    }
}
