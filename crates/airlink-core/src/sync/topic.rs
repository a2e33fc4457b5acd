//! The two synced topics and how each maps onto the local store

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::RemoteConfig;
use crate::error::AirlinkResult;
use crate::storage::LocalStore;
use crate::types::{Flight, FlightRecord, NewsItem};

/// A record set fetched, verified and stored as one unit.
pub trait Topic: Send + Sync + 'static {
    /// Shape the authority signs
    type Record: Serialize + DeserializeOwned + Send;
    /// Shape handed to callers and kept in the store
    type Item: Clone + Send + Sync + 'static;

    const NAME: &'static str;

    /// Endpoint path under the remote base URL
    fn path(remote: &RemoteConfig) -> &str;

    fn to_items(records: Vec<Self::Record>) -> Vec<Self::Item>;

    /// Replace the stored set, returning it as stored.
    fn persist(store: &LocalStore, items: &[Self::Item]) -> AirlinkResult<Vec<Self::Item>>;

    fn load_local(store: &LocalStore) -> AirlinkResult<Vec<Self::Item>>;
}

/// Flight status board
#[derive(Debug, Clone, Copy)]
pub struct Flights;

impl Topic for Flights {
    type Record = FlightRecord;
    type Item = Flight;

    const NAME: &'static str = "flights";

    fn path(remote: &RemoteConfig) -> &str {
        &remote.flights_path
    }

    fn to_items(records: Vec<FlightRecord>) -> Vec<Flight> {
        records.into_iter().map(Flight::from).collect()
    }

    fn persist(store: &LocalStore, items: &[Flight]) -> AirlinkResult<Vec<Flight>> {
        store.replace_flights(items)
    }

    fn load_local(store: &LocalStore) -> AirlinkResult<Vec<Flight>> {
        store.list_flights()
    }
}

/// Per-flight news feed
#[derive(Debug, Clone, Copy)]
pub struct News;

impl Topic for News {
    type Record = NewsItem;
    type Item = NewsItem;

    const NAME: &'static str = "news";

    fn path(remote: &RemoteConfig) -> &str {
        &remote.news_path
    }

    fn to_items(records: Vec<NewsItem>) -> Vec<NewsItem> {
        records
    }

    fn persist(store: &LocalStore, items: &[NewsItem]) -> AirlinkResult<Vec<NewsItem>> {
        store.replace_news(items)
    }

    fn load_local(store: &LocalStore) -> AirlinkResult<Vec<NewsItem>> {
        store.list_news()
    }
}
