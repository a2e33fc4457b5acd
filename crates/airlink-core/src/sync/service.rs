//! Both topic adapters behind one handle

use std::sync::Arc;

use tracing::info;

use super::adapter::SyncAdapter;
use super::outcome::SyncOutcome;
use super::remote::RemoteSource;
use super::topic::{Flights, News, Topic};
use crate::config::AirlinkConfig;
use crate::storage::LocalStore;
use crate::types::{Flight, NewsItem};
use crate::verify::SignatureVerifier;

/// Outcomes of a full pass over every topic.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub flights: SyncOutcome<Flight>,
    pub news: SyncOutcome<NewsItem>,
}

impl SyncReport {
    /// True when every topic produced a payload, fresh or stale.
    pub fn all_succeeded(&self) -> bool {
        self.flights.is_success() && self.news.is_success()
    }
}

/// Flights and news adapters sharing one remote, store and verifier.
pub struct SyncService<R: RemoteSource> {
    flights: SyncAdapter<Flights, R>,
    news: SyncAdapter<News, R>,
}

impl<R: RemoteSource> SyncService<R> {
    pub fn new(
        remote: Arc<R>,
        store: LocalStore,
        verifier: SignatureVerifier,
        config: &AirlinkConfig,
    ) -> Self {
        let ttl = config.cache.ttl();
        let timeout = config.remote.timeout();
        Self {
            flights: SyncAdapter::new(
                remote.clone(),
                store.clone(),
                verifier.clone(),
                Flights::path(&config.remote),
                ttl,
                timeout,
            ),
            news: SyncAdapter::new(
                remote,
                store,
                verifier,
                News::path(&config.remote),
                ttl,
                timeout,
            ),
        }
    }

    pub fn flights(&self) -> &SyncAdapter<Flights, R> {
        &self.flights
    }

    pub fn news(&self) -> &SyncAdapter<News, R> {
        &self.news
    }

    pub async fn sync_flights(&self) -> SyncOutcome<Flight> {
        self.flights.sync().await
    }

    pub async fn sync_news(&self) -> SyncOutcome<NewsItem> {
        self.news.sync().await
    }

    /// Sync both topics concurrently.
    pub async fn sync_all(&self) -> SyncReport {
        let (flights, news) = tokio::join!(self.flights.sync(), self.news.sync());
        info!(
            flights = flights.is_success(),
            news = news.is_success(),
            "Sync pass finished"
        );
        SyncReport { flights, news }
    }

    pub fn invalidate_all(&self) {
        self.flights.invalidate();
        self.news.invalidate();
    }
}
