//! # Feed Stream
//!
//! 단일 스트리밍 연결 위에서 여러 논리 구독을 다중화하고,
//! 계좌 마진 조회를 여러 소비자가 공유하도록 조정합니다.
//!
//! - [`SubscriptionMultiplexer`]: 채널 레지스트리, 구독/해제, 수신 메시지 분배
//! - [`ConnectionManager`]: 연결 수명 주기, 재연결 정책, 구독 복원
//! - [`AccountPoller`]: 참조 카운트 기반 주기 조회와 조회 간격 제한
//! - [`FeedRuntime`]: 위 구성 요소를 한 번만 생성하는 조립 지점

pub mod connection;
pub mod error;
pub mod handler;
pub mod multiplexer;
pub mod poller;
pub mod protocol;
pub mod registry;
pub mod runtime;

pub use connection::{
    ConnectionManager, ConnectionMetrics, ConnectionState, MetricsSnapshot, ReconnectPolicy,
    Transport, TungsteniteTransport,
};
pub use error::{StreamError, StreamResult};
pub use multiplexer::{ChannelSnapshot, Subscription, SubscriptionMultiplexer, SubscribeOutcome};
pub use poller::{
    AccountPoller, AccountSink, AccountState, AccountStore, HttpMarginSource, MarginSource,
};
pub use protocol::{ControlMessage, InboundFrame, Method};
pub use registry::{Handler, SubscriptionConfig, SubscriptionId};
pub use runtime::FeedRuntime;
