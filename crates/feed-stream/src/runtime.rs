//! 조립 지점.
//!
//! 다중화기, 연결 관리자, 계좌 폴러, 계좌 상태 저장소를 프로세스당 한 번
//! 생성하고 복제본을 나눠 줍니다.

use crate::connection::{ConnectionManager, ReconnectPolicy, Transport, TungsteniteTransport};
use crate::error::StreamResult;
use crate::multiplexer::SubscriptionMultiplexer;
use crate::poller::{AccountPoller, AccountStore, HttpMarginSource, MarginSource};
use feed_core::decode::decode_account_margin;
use feed_core::{AccountSnapshot, AppConfig};
use std::sync::Arc;
use tracing::info;

/// 피드 런타임.
pub struct FeedRuntime {
    config: AppConfig,
    multiplexer: SubscriptionMultiplexer,
    connection: ConnectionManager,
    poller: AccountPoller,
    account_store: Arc<AccountStore>,
    margin_source: Arc<dyn MarginSource>,
}

impl FeedRuntime {
    /// WebSocket 전송과 HTTP 마진 조회를 사용하는 런타임을 생성합니다.
    pub fn from_config(config: AppConfig) -> Self {
        let margin_source = Arc::new(HttpMarginSource::new(config.poller.info_url.clone()));
        Self::with_parts(config, Arc::new(TungsteniteTransport), margin_source)
    }

    /// 전송 계층과 마진 조회 원천을 지정해 생성합니다.
    pub fn with_parts(
        config: AppConfig,
        transport: Arc<dyn Transport>,
        margin_source: Arc<dyn MarginSource>,
    ) -> Self {
        let multiplexer = SubscriptionMultiplexer::new(config.stream.unsubscribe_policy);
        let connection = ConnectionManager::new(
            multiplexer.clone(),
            transport,
            ReconnectPolicy::from_config(&config.stream.reconnect),
            config.stream.ping_interval(),
        );
        let account_store = Arc::new(AccountStore::new());
        let poller = AccountPoller::from_config(account_store.clone(), &config.poller);

        Self {
            config,
            multiplexer,
            connection,
            poller,
            account_store,
            margin_source,
        }
    }

    /// 설정된 URL로 스트림 연결을 시작합니다.
    pub async fn start(&self) {
        info!(url = %self.config.stream.url, "Starting feed runtime");
        self.connection.connect(self.config.stream.url.clone()).await;
    }

    /// 계좌 폴링에 구독자를 추가합니다.
    pub fn watch_account(&self, address: impl Into<String>) {
        self.poller
            .subscribe(Arc::clone(&self.margin_source), address);
    }

    /// 폴링을 시작하지 않고 계좌 마진을 한 번 조회합니다.
    pub async fn fetch_account(&self, address: &str) -> StreamResult<AccountSnapshot> {
        let raw = self
            .margin_source
            .fetch_margin(address, self.poller.market())
            .await?;
        Ok(decode_account_margin(&raw)?)
    }

    /// 스트림 연결과 계좌 폴링을 모두 종료합니다.
    pub async fn shutdown(&self) {
        self.connection.disconnect().await;
        self.poller.shutdown();
        info!("Feed runtime stopped");
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn multiplexer(&self) -> &SubscriptionMultiplexer {
        &self.multiplexer
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn poller(&self) -> &AccountPoller {
        &self.poller
    }

    pub fn account_store(&self) -> &Arc<AccountStore> {
        &self.account_store
    }

    pub fn margin_source(&self) -> Arc<dyn MarginSource> {
        Arc::clone(&self.margin_source)
    }
}
