//! Cache, fetch, verify, persist, or fall back

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::envelope::{EnvelopeError, SignedBatch};
use super::outcome::{DataSource, FallbackCause, SyncFailure, SyncOutcome};
use super::remote::RemoteSource;
use super::topic::Topic;
use crate::storage::LocalStore;
use crate::verify::SignatureVerifier;

/// Where a topic's adapter currently is.
///
/// A terminal state (`Verified`, `Rejected`, `NetworkFailed`) is kept until
/// the next fetch starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Fetching,
    Verified,
    Rejected,
    NetworkFailed,
}

impl From<FallbackCause> for SyncState {
    fn from(cause: FallbackCause) -> Self {
        match cause {
            FallbackCause::Rejected => SyncState::Rejected,
            FallbackCause::NetworkFailed => SyncState::NetworkFailed,
        }
    }
}

struct CacheEntry<T> {
    items: Vec<T>,
    verified_at: Instant,
}

/// Outcome of the last completed fetch, numbered so callers that waited on
/// the in-flight guard can tell a fresh result from a stale one.
struct LastFetch<T> {
    generation: u64,
    outcome: Option<SyncOutcome<T>>,
}

/// Resets `Fetching` to `Idle` if the fetch future is dropped mid-flight.
struct FetchingGuard<'a> {
    state: &'a Mutex<SyncState>,
}

impl Drop for FetchingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if *state == SyncState::Fetching {
            *state = SyncState::Idle;
        }
    }
}

/// One topic's sync pipeline.
///
/// ```text
/// sync() ─► cache fresh? ──yes──► Success(Cache)
///               │ no
///               ▼
///         single-flight ─► fetch ─► parse ─► verify ──ok──► persist ─► Success(Remote)
///                            │        │        │
///                            └────────┴────────┴──► local store ─► Success(LocalFallback)
///                                                        │ empty
///                                                        ▼
///                                               Failure(NoLocalData)
/// ```
pub struct SyncAdapter<T: Topic, R: RemoteSource> {
    remote: Arc<R>,
    store: LocalStore,
    verifier: SignatureVerifier,
    path: String,
    ttl: Duration,
    fetch_timeout: Duration,
    cache: Mutex<Option<CacheEntry<T::Item>>>,
    state: Mutex<SyncState>,
    last: Mutex<LastFetch<T::Item>>,
    in_flight: tokio::sync::Mutex<()>,
    _topic: PhantomData<fn() -> T>,
}

impl<T: Topic, R: RemoteSource> SyncAdapter<T, R> {
    pub fn new(
        remote: Arc<R>,
        store: LocalStore,
        verifier: SignatureVerifier,
        path: impl Into<String>,
        ttl: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            remote,
            store,
            verifier,
            path: path.into(),
            ttl,
            fetch_timeout,
            cache: Mutex::new(None),
            state: Mutex::new(SyncState::Idle),
            last: Mutex::new(LastFetch {
                generation: 0,
                outcome: None,
            }),
            in_flight: tokio::sync::Mutex::new(()),
            _topic: PhantomData,
        }
    }

    pub fn state(&self) -> SyncState {
        *self.state.lock()
    }

    /// Drop the cached payload so the next call goes to the network.
    pub fn invalidate(&self) {
        if self.cache.lock().take().is_some() {
            debug!(topic = T::NAME, "Cache invalidated");
        }
    }

    fn cached(&self) -> Option<Vec<T::Item>> {
        let cache = self.cache.lock();
        cache
            .as_ref()
            .filter(|entry| entry.verified_at.elapsed() < self.ttl)
            .map(|entry| entry.items.clone())
    }

    /// Return the topic's data, refreshing from the remote when the cache is
    /// stale.
    ///
    /// Concurrent callers share one fetch: whoever arrives while a fetch is
    /// running waits for it and gets its outcome. Dropping the returned
    /// future mid-fetch leaves the cache and the store untouched.
    pub async fn sync(&self) -> SyncOutcome<T::Item> {
        if let Some(items) = self.cached() {
            debug!(topic = T::NAME, count = items.len(), "Serving from cache");
            return SyncOutcome::Success {
                payload: items,
                source: DataSource::Cache,
            };
        }

        let seen = self.last.lock().generation;
        let _flight = self.in_flight.lock().await;

        {
            let last = self.last.lock();
            if last.generation != seen {
                if let Some(outcome) = &last.outcome {
                    debug!(topic = T::NAME, "Joined in-flight fetch");
                    return outcome.clone();
                }
            }
        }
        if let Some(items) = self.cached() {
            return SyncOutcome::Success {
                payload: items,
                source: DataSource::Cache,
            };
        }

        let outcome = self.refresh().await;

        let mut last = self.last.lock();
        last.generation += 1;
        last.outcome = Some(outcome.clone());
        outcome
    }

    async fn refresh(&self) -> SyncOutcome<T::Item> {
        *self.state.lock() = SyncState::Fetching;
        let _guard = FetchingGuard { state: &self.state };

        let body = match tokio::time::timeout(self.fetch_timeout, self.remote.fetch(&self.path))
            .await
        {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                warn!(topic = T::NAME, error = %e, "Fetch failed");
                return self.fall_back(FallbackCause::NetworkFailed);
            }
            Err(_) => {
                warn!(topic = T::NAME, timeout = ?self.fetch_timeout, "Fetch timed out");
                return self.fall_back(FallbackCause::NetworkFailed);
            }
        };

        let batch = match SignedBatch::<T::Record>::parse(&body) {
            Ok(batch) => batch,
            Err(e @ EnvelopeError::Malformed(_)) => {
                warn!(topic = T::NAME, error = %e, "Unparseable response");
                return self.fall_back(FallbackCause::NetworkFailed);
            }
            Err(e) => {
                warn!(topic = T::NAME, error = %e, "Unsigned response");
                return self.fall_back(FallbackCause::Rejected);
            }
        };

        if !self.verifier.verify(&batch.records, &batch.signature) {
            warn!(topic = T::NAME, records = batch.records.len(), "Signature rejected");
            return self.fall_back(FallbackCause::Rejected);
        }

        let items = T::to_items(batch.records);
        match T::persist(&self.store, &items) {
            Ok(stored) => {
                *self.cache.lock() = Some(CacheEntry {
                    items: stored.clone(),
                    verified_at: Instant::now(),
                });
                *self.state.lock() = SyncState::Verified;
                info!(topic = T::NAME, count = stored.len(), "Verified and stored");
                SyncOutcome::Success {
                    payload: stored,
                    source: DataSource::Remote,
                }
            }
            Err(e) => {
                error!(topic = T::NAME, error = %e, "Failed to persist verified batch");
                *self.state.lock() = SyncState::Idle;
                SyncOutcome::Failure(SyncFailure::Store(e.to_string()))
            }
        }
    }

    /// Serve whatever the store holds. Never writes.
    fn fall_back(&self, cause: FallbackCause) -> SyncOutcome<T::Item> {
        *self.state.lock() = cause.into();
        match T::load_local(&self.store) {
            Ok(items) if !items.is_empty() => {
                info!(topic = T::NAME, %cause, count = items.len(), "Serving local data");
                SyncOutcome::Success {
                    payload: items,
                    source: DataSource::LocalFallback,
                }
            }
            Ok(_) => {
                warn!(topic = T::NAME, %cause, "No local data to fall back on");
                SyncOutcome::Failure(SyncFailure::NoLocalData(cause))
            }
            Err(e) => {
                error!(topic = T::NAME, error = %e, "Local store unreadable");
                SyncOutcome::Failure(SyncFailure::Store(e.to_string()))
            }
        }
    }
}
