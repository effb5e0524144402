//! 스트리밍 연결 수명 주기 관리.
//!
//! 프로세스당 하나의 스트리밍 연결을 소유합니다.
//!
//! - `connect`는 이전 연결 태스크를 먼저 종료하고 새 태스크를 시작합니다.
//! - 연결이 열릴 때마다 [`SubscriptionMultiplexer::attach`]로 레지스트리 전체를
//!   다시 구독합니다.
//! - 세션이 끝나면 [`ReconnectPolicy`]에 따라 지수 백오프로 재연결합니다.
//!
//! 전송 계층은 [`Transport`] 트레이트로 분리되어 있으며 기본 구현은
//! `tokio-tungstenite`입니다.

use crate::error::{StreamError, StreamResult};
use crate::multiplexer::SubscriptionMultiplexer;
use crate::protocol::InboundFrame;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_core::{ReconnectConfig, StreamConfig};
use futures::{Sink, SinkExt, Stream, StreamExt};
use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use tokio_tungstenite::tungstenite::Message;

/// 연결 태스크 종료 대기 시간.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// 전송 계층
// ============================================================================

/// 송신 프레임 sink.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = StreamError> + Send>>;

/// 수신 프레임 stream.
pub type FrameStream = Pin<Box<dyn Stream<Item = StreamResult<Message>> + Send>>;

/// 스트리밍 전송 계층.
#[async_trait]
pub trait Transport: Send + Sync {
    /// URL에 연결하고 송신/수신 반쪽을 반환합니다.
    async fn connect(&self, url: &str) -> StreamResult<(FrameSink, FrameStream)>;
}

/// `tokio-tungstenite` WebSocket 전송.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn connect(&self, url: &str) -> StreamResult<(FrameSink, FrameStream)> {
        let (ws_stream, _) = connect_async(url).await?;
        let (write, read) = ws_stream.split();

        let sink: FrameSink = Box::pin(write.sink_map_err(StreamError::from));
        let stream: FrameStream = Box::pin(read.map(|frame| frame.map_err(StreamError::from)));
        Ok((sink, stream))
    }
}

// ============================================================================
// 연결 상태
// ============================================================================

/// 연결 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// 재연결 정책
// ============================================================================

/// 재연결 정책.
///
/// `attempt`번째 재시도 대기는 `initial_delay * multiplier^(attempt-1)`을
/// `max_delay`로 제한한 뒤 최대 `jitter` 비율만큼 무작위로 늘린 값입니다.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: f64,
    /// 연속 실패 허용 횟수 (None이면 무제한)
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}

impl ReconnectPolicy {
    /// 설정값으로 생성합니다.
    ///
    /// 유한하지 않은 `multiplier`는 1.0, `jitter`는 0.0으로 바꾸고
    /// `jitter`는 0.0 ~ 1.0 범위로 제한합니다.
    pub fn from_config(config: &ReconnectConfig) -> Self {
        let multiplier = if config.multiplier.is_finite() {
            config.multiplier.max(1.0)
        } else {
            warn!(multiplier = config.multiplier, "Invalid reconnect multiplier, using 1.0");
            1.0
        };
        let jitter = if config.jitter.is_finite() {
            config.jitter.clamp(0.0, 1.0)
        } else {
            warn!(jitter = config.jitter, "Invalid reconnect jitter, disabling jitter");
            0.0
        };

        Self {
            enabled: config.enabled,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms.max(config.initial_delay_ms)),
            multiplier,
            jitter,
            max_attempts: config.max_attempts,
        }
    }

    /// 자동 재연결 없음. 명시적인 `connect` 호출로만 다시 연결합니다.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    /// `attempt`번째 재시도가 허용되는지 확인합니다 (1부터 시작).
    pub fn allows(&self, attempt: u32) -> bool {
        self.enabled && self.max_attempts.map_or(true, |max| attempt <= max)
    }

    /// 지터를 제외한 대기 시간.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let max = self.max_delay.as_secs_f64();
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);

        if secs.is_finite() {
            Duration::from_secs_f64(secs.min(max))
        } else {
            self.max_delay
        }
    }

    /// 지터를 포함한 대기 시간.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if !self.jitter.is_finite() || self.jitter <= 0.0 {
            return base;
        }
        let jitter = self.jitter.min(1.0);
        let factor = 1.0 + rand::thread_rng().gen::<f64>() * jitter;
        base.mul_f64(factor)
    }
}

// ============================================================================
// 메트릭
// ============================================================================

/// 연결 메트릭 카운터.
#[derive(Debug, Default)]
pub struct ConnectionMetrics {
    frames_received: AtomicU64,
    frames_dispatched: AtomicU64,
    parse_errors: AtomicU64,
    reconnects: AtomicU64,
    last_message_ms: AtomicI64,
}

/// 메트릭 스냅샷.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub frames_dispatched: u64,
    pub parse_errors: u64,
    pub reconnects: u64,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl ConnectionMetrics {
    fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.last_message_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    fn record_dispatch(&self) {
        self.frames_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let last = self.last_message_ms.load(Ordering::Relaxed);
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dispatched: self.frames_dispatched.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            last_message_at: (last > 0)
                .then(|| DateTime::from_timestamp_millis(last))
                .flatten(),
        }
    }
}

// ============================================================================
// 연결 관리자
// ============================================================================

enum SessionEnd {
    Cancelled,
    Closed { opened: bool },
    Failed { opened: bool, error: StreamError },
}

struct ConnectionTask {
    url: String,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

struct ManagerInner {
    multiplexer: SubscriptionMultiplexer,
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    ping_interval: Duration,
    state_tx: watch::Sender<ConnectionState>,
    metrics: ConnectionMetrics,
    sessions: AtomicU64,
    task: Mutex<Option<ConnectionTask>>,
}

/// 연결 수명 주기 관리자.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    pub fn new(
        multiplexer: SubscriptionMultiplexer,
        transport: Arc<dyn Transport>,
        policy: ReconnectPolicy,
        ping_interval: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Closed);
        Self {
            inner: Arc::new(ManagerInner {
                multiplexer,
                transport,
                policy,
                ping_interval,
                state_tx,
                metrics: ConnectionMetrics::default(),
                sessions: AtomicU64::new(0),
                task: Mutex::new(None),
            }),
        }
    }

    /// 스트림 설정으로 tungstenite 기반 관리자를 생성합니다.
    pub fn from_config(multiplexer: SubscriptionMultiplexer, config: &StreamConfig) -> Self {
        Self::new(
            multiplexer,
            Arc::new(TungsteniteTransport),
            ReconnectPolicy::from_config(&config.reconnect),
            config.ping_interval(),
        )
    }

    /// 연결을 시작합니다.
    ///
    /// 기존 연결 태스크가 있으면 먼저 종료합니다. 연결은 백그라운드
    /// 태스크에서 진행되며 상태는 [`state_receiver`](Self::state_receiver)로
    /// 관찰할 수 있습니다.
    pub async fn connect(&self, url: impl Into<String>) {
        let url = url.into();
        if let Some(previous) = self.take_task() {
            debug!(url = %previous.url, "Closing previous connection");
            shutdown_task(previous).await;
            self.inner.detach_current();
        }

        self.inner.set_state(ConnectionState::Connecting);
        let cancel = CancellationToken::new();
        let join = tokio::spawn(run_connection(
            Arc::clone(&self.inner),
            url.clone(),
            cancel.clone(),
        ));

        let stale = self.lock_task().replace(ConnectionTask { url, cancel, join });
        if let Some(stale) = stale {
            stale.cancel.cancel();
            stale.join.abort();
        }
    }

    /// 연결을 종료합니다. 자동 재연결은 일어나지 않습니다.
    pub async fn disconnect(&self) {
        let Some(task) = self.take_task() else {
            return;
        };

        info!(url = %task.url, "Disconnecting stream");
        self.inner.set_state(ConnectionState::Closing);
        shutdown_task(task).await;
        self.inner.detach_current();
        self.inner.set_state(ConnectionState::Closed);
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<ConnectionTask>> {
        self.inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn take_task(&self) -> Option<ConnectionTask> {
        self.lock_task().take()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn url(&self) -> Option<String> {
        self.lock_task().as_ref().map(|t| t.url.clone())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn multiplexer(&self) -> &SubscriptionMultiplexer {
        &self.inner.multiplexer
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.inner.policy
    }
}

async fn shutdown_task(mut task: ConnectionTask) {
    task.cancel.cancel();
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task.join)
        .await
        .is_err()
    {
        warn!(url = %task.url, "Connection task did not stop in time, aborting");
        task.join.abort();
    }
}

impl ManagerInner {
    fn set_state(&self, state: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            debug!(state = %state, "Connection state changed");
        }
    }

    fn detach_current(&self) {
        self.multiplexer.detach(self.sessions.load(Ordering::SeqCst));
    }

    fn handle_text(&self, text: &str) {
        self.metrics.record_frame();
        match InboundFrame::parse(text) {
            Ok(frame) => {
                if self.multiplexer.dispatch(&frame.channel, &frame.data) > 0 {
                    self.metrics.record_dispatch();
                }
            }
            Err(e) => {
                self.metrics.record_parse_error();
                warn!(error = %e, "Skipping unparseable frame");
            }
        }
    }

    async fn run_session(&self, url: &str, session: u64, cancel: &CancellationToken) -> SessionEnd {
        let connected = tokio::select! {
            _ = cancel.cancelled() => return SessionEnd::Cancelled,
            result = self.transport.connect(url) => result,
        };
        let (mut sink, mut stream) = match connected {
            Ok(pair) => pair,
            Err(error) => {
                return SessionEnd::Failed {
                    opened: false,
                    error,
                }
            }
        };

        let (tx, mut outbound) = mpsc::unbounded_channel();
        self.multiplexer.attach(session, tx);
        self.set_state(ConnectionState::Open);
        info!(url, session, "Stream connected");

        let mut ping = interval_at(Instant::now() + self.ping_interval, self.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Err(e) = sink.send(Message::Close(None)).await {
                        debug!(error = %e, "Close frame not sent");
                    }
                    return SessionEnd::Cancelled;
                }

                Some(message) = outbound.recv() => {
                    let text = match message.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            error!(channel = %message.channel, error = %e, "Failed to encode control message");
                            continue;
                        }
                    };
                    if let Err(error) = sink.send(Message::Text(text)).await {
                        return SessionEnd::Failed { opened: true, error };
                    }
                }

                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text),
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(error) = sink.send(Message::Pong(data)).await {
                            return SessionEnd::Failed { opened: true, error };
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(session, frame = ?frame, "Server closed stream");
                        return SessionEnd::Closed { opened: true };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => return SessionEnd::Failed { opened: true, error },
                    None => return SessionEnd::Closed { opened: true },
                },

                _ = ping.tick() => {
                    if let Err(error) = sink.send(Message::Ping(Vec::new())).await {
                        return SessionEnd::Failed { opened: true, error };
                    }
                }
            }
        }
    }
}

/// 연결 태스크 본체: 세션 실행 후 재연결 정책에 따라 반복합니다.
async fn run_connection(inner: Arc<ManagerInner>, url: String, cancel: CancellationToken) {
    let mut attempt: u32 = 0;

    loop {
        let session = inner.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        inner.set_state(ConnectionState::Connecting);

        let end = inner.run_session(&url, session, &cancel).await;
        inner.multiplexer.detach(session);

        let opened = match end {
            SessionEnd::Cancelled => {
                debug!(session, "Connection task cancelled");
                return;
            }
            SessionEnd::Closed { opened } => {
                info!(session, "Stream closed");
                opened
            }
            SessionEnd::Failed { opened, error } => {
                warn!(session, error = %error, "Stream session failed");
                opened
            }
        };
        inner.set_state(ConnectionState::Closed);

        if opened {
            attempt = 0;
        }
        attempt += 1;

        if !inner.policy.allows(attempt) {
            if inner.policy.enabled {
                error!(attempts = attempt - 1, "Reconnect attempts exhausted");
            } else {
                info!("Automatic reconnect disabled, waiting for explicit connect");
            }
            return;
        }

        let delay = inner.policy.delay_for(attempt);
        warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
        inner.metrics.record_reconnect();
    }
}
