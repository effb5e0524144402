//! 계좌 마진 폴링 조정자.
//!
//! 여러 소비자가 하나의 주기 조회를 공유합니다.
//!
//! ```text
//! Idle ──subscribe (0→1)──▶ Polling ──unsubscribe (1→0)──▶ Idle
//!                            │  ▲
//!                            └──┘ 주소 변경: 중지 + 상태 초기화 + 재시작
//! ```
//!
//! - 타이머 태스크는 항상 최대 하나입니다.
//! - 시작 시 즉시 한 번 조회한 뒤 `tick_interval`마다 조회합니다.
//! - 마지막 조회 완료 후 `min_fetch_interval`이 지나지 않았으면 건너뜁니다.
//!   재시도 대기가 틱 간격보다 긴 에러(429, 5xx) 뒤에는 그 시간만큼 쉽니다.
//! - 조회 중 패닉은 에러로 기록되고 타이머는 계속 동작합니다.
//! - 중지될 때마다 세대 번호가 증가하며, 이전 세대의 조회 결과는 버려집니다.

use crate::error::{StreamError, StreamResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_core::decode::decode_account_margin;
use feed_core::{AccountBalance, AccountSnapshot, PollerConfig, PositionRecord};
use futures::FutureExt;
use serde_json::{json, Value};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

// ============================================================================
// 외부 협력자
// ============================================================================

/// 계좌 마진 조회 원천.
#[async_trait]
pub trait MarginSource: Send + Sync {
    /// 주소와 마켓 식별자로 원시 마진 구조를 조회합니다.
    async fn fetch_margin(&self, address: &str, market: &str) -> StreamResult<Value>;
}

/// HTTP POST 기반 마진 조회.
///
/// 요청 본문: `{"type":"accountMargin","user":<address>,"market":<market>}`
#[derive(Debug, Clone)]
pub struct HttpMarginSource {
    client: reqwest::Client,
    info_url: String,
}

impl HttpMarginSource {
    pub fn new(info_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), info_url)
    }

    pub fn with_client(client: reqwest::Client, info_url: impl Into<String>) -> Self {
        Self {
            client,
            info_url: info_url.into(),
        }
    }

    pub fn info_url(&self) -> &str {
        &self.info_url
    }
}

#[async_trait]
impl MarginSource for HttpMarginSource {
    async fn fetch_margin(&self, address: &str, market: &str) -> StreamResult<Value> {
        let body = json!({
            "type": "accountMargin",
            "user": address,
            "market": market,
        });

        let response = self.client.post(&self.info_url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StreamError::Http {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<Value>().await?)
    }
}

/// 계좌 상태 저장소 (UI 상태 컨테이너).
///
/// 폴러 내부 잠금을 잡은 채로 호출되므로 구현은 폴러를 다시 호출하면 안 됩니다.
pub trait AccountSink: Send + Sync {
    fn set_loading(&self, loading: bool);
    fn apply_snapshot(&self, snapshot: &AccountSnapshot);
    fn record_error(&self, message: String);
    fn clear(&self);
}

/// 계좌 상태.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountState {
    pub balance: Option<AccountBalance>,
    pub positions: Vec<PositionRecord>,
    pub error: Option<String>,
    pub loading: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

/// `watch` 채널 기반 기본 상태 저장소.
#[derive(Debug)]
pub struct AccountStore {
    tx: watch::Sender<AccountState>,
}

impl Default for AccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(AccountState::default());
        Self { tx }
    }

    pub fn current(&self) -> AccountState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AccountState> {
        self.tx.subscribe()
    }
}

impl AccountSink for AccountStore {
    fn set_loading(&self, loading: bool) {
        self.tx.send_modify(|state| state.loading = loading);
    }

    fn apply_snapshot(&self, snapshot: &AccountSnapshot) {
        self.tx.send_modify(|state| {
            state.balance = Some(snapshot.balance.clone());
            state.positions = snapshot.positions.clone();
            state.error = None;
            state.loading = false;
            state.updated_at = Some(snapshot.fetched_at);
        });
    }

    fn record_error(&self, message: String) {
        self.tx.send_modify(|state| {
            state.error = Some(message);
            state.loading = false;
        });
    }

    fn clear(&self) {
        self.tx.send_replace(AccountState::default());
    }
}

// ============================================================================
// 폴링 조정자
// ============================================================================

#[derive(Clone)]
struct PollTarget {
    source: Arc<dyn MarginSource>,
    address: String,
}

#[derive(Default)]
struct PollerState {
    subscriber_count: usize,
    target: Option<PollTarget>,
    last_fetch: Option<Instant>,
    /// 직전 실패가 요구한 추가 대기
    retry_after: Option<Duration>,
    in_flight: bool,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

enum FetchOutcome {
    Skipped,
    Discarded,
    Applied(AccountSnapshot),
    Failed(StreamError),
}

struct PollerInner {
    sink: Arc<dyn AccountSink>,
    market: String,
    tick_interval: Duration,
    min_fetch_interval: Duration,
    state: Mutex<PollerState>,
}

/// 참조 카운트 기반 계좌 폴러.
#[derive(Clone)]
pub struct AccountPoller {
    inner: Arc<PollerInner>,
}

impl AccountPoller {
    pub fn new(
        sink: Arc<dyn AccountSink>,
        market: impl Into<String>,
        tick_interval: Duration,
        min_fetch_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                sink,
                market: market.into(),
                tick_interval: tick_interval.max(Duration::from_millis(1)),
                min_fetch_interval,
                state: Mutex::new(PollerState::default()),
            }),
        }
    }

    pub fn from_config(sink: Arc<dyn AccountSink>, config: &PollerConfig) -> Self {
        Self::new(
            sink,
            config.market.clone(),
            config.tick_interval(),
            config.min_fetch_interval(),
        )
    }

    /// 구독자를 추가합니다.
    ///
    /// 주소가 현재 대상과 다르면 기존 폴링을 중지하고(상태 초기화) 새 주소로
    /// 다시 시작합니다.
    pub fn subscribe(&self, source: Arc<dyn MarginSource>, address: impl Into<String>) {
        let address = address.into();
        let mut state = self.inner.lock();
        state.subscriber_count += 1;

        let address_changed = state
            .target
            .as_ref()
            .is_some_and(|t| t.address != address);
        if address_changed {
            info!(address = %address, "Account address changed, restarting poller");
            self.inner.stop_locked(&mut state);
        }

        state.target = Some(PollTarget {
            source,
            address: address.clone(),
        });

        if state.timer.is_none() {
            self.inner.start_locked(&mut state);
        }

        debug!(address = %address, subscribers = state.subscriber_count, "Account poller subscribed");
    }

    /// 구독자를 제거합니다. 마지막 구독자가 떠나면 폴링을 중지하고 상태를 비웁니다.
    pub fn unsubscribe(&self) {
        let mut state = self.inner.lock();
        if state.subscriber_count == 0 {
            return;
        }
        state.subscriber_count -= 1;

        if state.subscriber_count == 0 {
            info!("Last account subscriber left, stopping poller");
            self.inner.stop_locked(&mut state);
        }
    }

    /// 조회 간격 제한을 무시하고 즉시 조회합니다.
    ///
    /// 활성 구독이 없으면 [`StreamError::NoActiveSubscription`]을 반환합니다.
    /// 조회 실패는 상태에 기록한 뒤 호출자에게도 반환합니다.
    pub async fn force_refresh(&self) -> StreamResult<AccountSnapshot> {
        let generation = {
            let mut state = self.inner.lock();
            if state.target.is_none() {
                return Err(StreamError::NoActiveSubscription);
            }
            state.last_fetch = None;
            state.generation
        };

        match self.inner.fetch_data(generation, true).await {
            FetchOutcome::Applied(snapshot) => Ok(snapshot),
            FetchOutcome::Failed(error) => Err(error),
            FetchOutcome::Skipped | FetchOutcome::Discarded => {
                Err(StreamError::NoActiveSubscription)
            }
        }
    }

    /// 모든 구독을 해제하고 폴링을 중지합니다.
    pub fn shutdown(&self) {
        let mut state = self.inner.lock();
        state.subscriber_count = 0;
        self.inner.stop_locked(&mut state);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscriber_count
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().timer.is_some()
    }

    pub fn target_address(&self) -> Option<String> {
        self.inner.lock().target.as_ref().map(|t| t.address.clone())
    }

    pub fn market(&self) -> &str {
        &self.inner.market
    }
}

impl PollerInner {
    fn lock(&self) -> MutexGuard<'_, PollerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_locked(self: &Arc<Self>, state: &mut PollerState) {
        let inner = Arc::clone(self);
        let generation = state.generation;
        self.sink.set_loading(true);

        state.timer = Some(tokio::spawn(async move {
            inner.run_tick(generation).await;

            let mut ticker = interval_at(Instant::now() + inner.tick_interval, inner.tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                inner.run_tick(generation).await;
            }
        }));
    }

    /// 타이머를 중지하고 공유 상태를 초기화합니다.
    fn stop_locked(&self, state: &mut PollerState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;
        state.target = None;
        state.last_fetch = None;
        state.retry_after = None;
        state.in_flight = false;
        self.sink.clear();
    }

    /// 타이머 한 번의 조회. 패닉은 조회 실패로 기록합니다.
    async fn run_tick(&self, generation: u64) {
        let fetch = AssertUnwindSafe(self.fetch_data(generation, false)).catch_unwind();
        if fetch.await.is_ok() {
            return;
        }

        let mut state = self.lock();
        if state.generation != generation {
            return;
        }
        state.in_flight = false;
        state.last_fetch = Some(Instant::now());
        error!("Account fetch panicked");
        self.sink.record_error("account fetch panicked".to_string());
    }

    async fn fetch_data(&self, generation: u64, force: bool) -> FetchOutcome {
        let target = {
            let mut state = self.lock();
            if state.generation != generation {
                return FetchOutcome::Discarded;
            }
            if !force {
                if state.in_flight {
                    debug!("Account fetch already in flight, skipping tick");
                    return FetchOutcome::Skipped;
                }
                if let Some(last) = state.last_fetch {
                    let wait = state
                        .retry_after
                        .map_or(self.min_fetch_interval, |d| d.max(self.min_fetch_interval));
                    if last.elapsed() < wait {
                        debug!("Account fetch throttled");
                        return FetchOutcome::Skipped;
                    }
                }
                state.in_flight = true;
            }
            match state.target.clone() {
                Some(target) => target,
                None => {
                    state.in_flight = false;
                    return FetchOutcome::Skipped;
                }
            }
        };

        let result = target
            .source
            .fetch_margin(&target.address, &self.market)
            .await
            .and_then(|raw| decode_account_margin(&raw).map_err(StreamError::from));

        let mut state = self.lock();
        if state.generation != generation {
            debug!(address = %target.address, "Discarding account fetch result after stop");
            return FetchOutcome::Discarded;
        }
        if !force {
            state.in_flight = false;
        }
        state.last_fetch = Some(Instant::now());

        match result {
            Ok(snapshot) => {
                state.retry_after = None;
                self.sink.apply_snapshot(&snapshot);
                debug!(
                    address = %target.address,
                    positions = snapshot.positions.len(),
                    "Account snapshot updated"
                );
                FetchOutcome::Applied(snapshot)
            }
            Err(error) => {
                state.retry_after = error
                    .retry_delay_ms()
                    .map(Duration::from_millis)
                    .filter(|delay| *delay > self.tick_interval);
                if error.is_retryable() {
                    warn!(
                        address = %target.address,
                        error = %error,
                        retry_after_ms = state.retry_after.map(|d| d.as_millis() as u64),
                        "Account fetch failed"
                    );
                } else {
                    error!(address = %target.address, error = %error, "Account fetch failed, not retryable");
                }
                self.sink.record_error(error.to_string());
                FetchOutcome::Failed(error)
            }
        }
    }
}
