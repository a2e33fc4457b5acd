//! Batched, throttled writes to the user profile
//!
//! Profile changes are queued per field and written in one transaction once
//! enough fields are pending or enough time has passed since the previous
//! write. Point increments are stored as deltas and added to the stored
//! value inside the transaction, so concurrent increments never overwrite
//! each other.
//!
//! ```text
//! add_points(5) ─┐
//! add_points(5) ─┼─► pending { Points: +10, SharingMode: true } ──► flush ──► redb
//! sharing(true) ─┘        (mutex, last write wins per field)     (1 txn, throttled)
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::BatchConfig;
use crate::error::AirlinkResult;
use crate::storage::LocalStore;
use crate::throttle::Throttle;
use crate::types::{now_millis, ProfileField, ProfileMutation, UserProfile};

const FLUSH_KEY: &str = "profile_flush";
const POINTS_COOLDOWN_KEY: &str = "points_cooldown";
const STATS_KEY: &str = "update_stats";
const CLEANUP_KEY: &str = "cleanup";

const POINTS_COOLDOWN: Duration = Duration::from_secs(60);
const STATS_INTERVAL: Duration = Duration::from_secs(15 * 60);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
const STALE_SYNC_AGE_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// The durable side of the writer.
pub trait ProfileStore: Send + Sync {
    /// Apply `mutations` atomically, adding point deltas to the stored total.
    fn apply_profile_batch(
        &self,
        mutations: &[ProfileMutation],
        now_ms: i64,
    ) -> AirlinkResult<UserProfile>;

    fn touch_last_sync(&self, now_ms: i64) -> AirlinkResult<Option<UserProfile>>;

    fn refresh_stale_sync(&self, threshold_ms: i64, now_ms: i64) -> AirlinkResult<bool>;
}

impl ProfileStore for LocalStore {
    fn apply_profile_batch(
        &self,
        mutations: &[ProfileMutation],
        now_ms: i64,
    ) -> AirlinkResult<UserProfile> {
        LocalStore::apply_profile_batch(self, mutations, now_ms)
    }

    fn touch_last_sync(&self, now_ms: i64) -> AirlinkResult<Option<UserProfile>> {
        LocalStore::touch_last_sync(self, now_ms)
    }

    fn refresh_stale_sync(&self, threshold_ms: i64, now_ms: i64) -> AirlinkResult<bool> {
        LocalStore::refresh_stale_sync(self, threshold_ms, now_ms)
    }
}

#[derive(Default)]
struct Pending {
    mutations: HashMap<ProfileField, ProfileMutation>,
    last_flush: Option<Instant>,
}

impl Pending {
    fn queue(&mut self, mutation: ProfileMutation) {
        let merged = match self.mutations.remove(&mutation.field()) {
            Some(earlier) => earlier.merge(mutation),
            None => mutation,
        };
        self.mutations.insert(merged.field(), merged);
    }

    /// Put back a drained mutation that failed to persist.
    ///
    /// Point deltas add to whatever was queued since; a flag is restored only
    /// if nothing newer was queued for it.
    fn requeue(&mut self, drained: ProfileMutation) {
        match self.mutations.get(&drained.field()).copied() {
            None => {
                self.mutations.insert(drained.field(), drained);
            }
            Some(newer @ ProfileMutation::AddPoints(_)) => {
                self.mutations.insert(drained.field(), drained.merge(newer));
            }
            Some(_) => {}
        }
    }
}

/// Coalesces profile mutations and writes them in batches.
pub struct ProfileWriter<S: ProfileStore = LocalStore> {
    store: S,
    throttle: Arc<Throttle>,
    config: BatchConfig,
    pending: Mutex<Pending>,
}

impl<S: ProfileStore> ProfileWriter<S> {
    pub fn new(store: S, throttle: Arc<Throttle>, config: BatchConfig) -> Self {
        Self {
            store,
            throttle,
            config,
            pending: Mutex::new(Pending::default()),
        }
    }

    /// Record a mutation without writing it.
    pub fn queue(&self, mutation: ProfileMutation) {
        self.pending.lock().queue(mutation);
    }

    /// Number of fields waiting to be written
    pub fn pending_len(&self) -> usize {
        self.pending.lock().mutations.len()
    }

    fn flush_due(&self) -> bool {
        let pending = self.pending.lock();
        if pending.mutations.is_empty() {
            return false;
        }
        pending.mutations.len() >= self.config.max_pending
            || match pending.last_flush {
                None => true,
                Some(at) => at.elapsed() > self.config.max_age(),
            }
    }

    /// Flush if the size or age threshold is crossed.
    ///
    /// The check itself is throttled, so a burst of callers results in at
    /// most one flush per throttle window. Returns the written profile when
    /// this call flushed.
    pub async fn flush_if_needed(&self) -> AirlinkResult<Option<UserProfile>> {
        if !self.flush_due() {
            return Ok(None);
        }
        self.throttle
            .run(FLUSH_KEY, self.config.flush_throttle(), || self.flush_now())
            .await
            .transpose()
            .map(Option::flatten)
    }

    /// Drain every pending mutation and write them in one transaction.
    ///
    /// On failure the drained mutations are queued again and the error is
    /// returned.
    pub async fn flush_now(&self) -> AirlinkResult<Option<UserProfile>> {
        let drained: Vec<ProfileMutation> = {
            let mut pending = self.pending.lock();
            pending.mutations.drain().map(|(_, m)| m).collect()
        };
        if drained.is_empty() {
            return Ok(None);
        }

        let result = self.store.apply_profile_batch(&drained, now_millis());

        let mut pending = self.pending.lock();
        pending.last_flush = Some(Instant::now());
        match result {
            Ok(profile) => {
                debug!(fields = drained.len(), points = profile.points, "Profile batch written");
                Ok(Some(profile))
            }
            Err(e) => {
                warn!(error = %e, fields = drained.len(), "Profile flush failed, re-queueing");
                for mutation in drained {
                    pending.requeue(mutation);
                }
                Err(e)
            }
        }
    }

    pub async fn add_points(&self, points: i64) -> AirlinkResult<Option<UserProfile>> {
        self.queue(ProfileMutation::AddPoints(points));
        self.flush_if_needed().await
    }

    pub async fn set_sharing_mode(&self, on: bool) -> AirlinkResult<Option<UserProfile>> {
        self.queue(ProfileMutation::SetSharingMode(on));
        self.flush_if_needed().await
    }

    pub async fn set_more_battery(&self, on: bool) -> AirlinkResult<Option<UserProfile>> {
        self.queue(ProfileMutation::SetMoreBattery(on));
        self.flush_if_needed().await
    }

    /// Award points at most once per minute. Returns whether they were queued.
    pub async fn add_points_with_cooldown(&self, points: i64) -> AirlinkResult<bool> {
        match self
            .throttle
            .run(POINTS_COOLDOWN_KEY, POINTS_COOLDOWN, || self.add_points(points))
            .await
        {
            Some(result) => result.map(|_| true),
            None => {
                debug!(points, "Points award on cooldown");
                Ok(false)
            }
        }
    }

    /// Stamp `last_sync`, at most every 15 minutes. Returns whether it ran.
    pub async fn update_user_stats(&self) -> AirlinkResult<bool> {
        match self
            .throttle
            .run(STATS_KEY, STATS_INTERVAL, || async {
                self.store.touch_last_sync(now_millis())
            })
            .await
        {
            Some(result) => result.map(|_| true),
            None => Ok(false),
        }
    }

    /// Refresh sync stamps older than 30 days, at most once a day.
    /// Returns whether it ran.
    pub async fn cleanup_old_data(&self) -> AirlinkResult<bool> {
        match self
            .throttle
            .run(CLEANUP_KEY, CLEANUP_INTERVAL, || async {
                let now = now_millis();
                self.store.refresh_stale_sync(now - STALE_SYNC_AGE_MS, now)
            })
            .await
        {
            Some(result) => {
                if result? {
                    info!("Refreshed stale sync timestamp");
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AirlinkError;
    use crate::storage::test_support::create_test_store;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn writer(store: LocalStore) -> ProfileWriter {
        ProfileWriter::new(store, Arc::new(Throttle::new()), BatchConfig::default())
    }

    /// Store that fails while `failing` is set
    struct FlakyStore {
        inner: LocalStore,
        failing: AtomicBool,
    }

    impl ProfileStore for FlakyStore {
        fn apply_profile_batch(
            &self,
            mutations: &[ProfileMutation],
            now_ms: i64,
        ) -> AirlinkResult<UserProfile> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(AirlinkError::Storage("disk full".to_string()));
            }
            self.inner.apply_profile_batch(mutations, now_ms)
        }

        fn touch_last_sync(&self, now_ms: i64) -> AirlinkResult<Option<UserProfile>> {
            self.inner.touch_last_sync(now_ms)
        }

        fn refresh_stale_sync(&self, threshold_ms: i64, now_ms: i64) -> AirlinkResult<bool> {
            self.inner.refresh_stale_sync(threshold_ms, now_ms)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_increments_sum() {
        let (store, _temp) = create_test_store();
        let writer = writer(store.clone());

        let (a, b, c) = tokio::join!(
            writer.add_points(5),
            writer.add_points(5),
            writer.add_points(5)
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();
        writer.flush_now().await.unwrap();

        assert_eq!(store.load_user().unwrap().unwrap().points, 15);
        assert_eq!(writer.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_mutation_flushes_immediately() {
        let (store, _temp) = create_test_store();
        let writer = writer(store.clone());

        let written = writer.set_sharing_mode(true).await.unwrap();
        assert!(written.unwrap().is_sharing_mode);
        assert!(store.load_user().unwrap().unwrap().last_sync.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_size_or_age_threshold() {
        let (store, _temp) = create_test_store();
        let writer = writer(store.clone());
        writer.add_points(1).await.unwrap();

        // Within the age window with one field pending: stays queued
        assert!(writer.set_more_battery(true).await.unwrap().is_none());
        assert_eq!(writer.pending_len(), 1);

        tokio::time::advance(Duration::from_millis(5001)).await;
        let written = writer.add_points(2).await.unwrap().unwrap();
        assert_eq!(written.points, 3);
        assert!(written.more_battery_guy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_threshold_respects_flush_throttle() {
        let (store, _temp) = create_test_store();
        let writer = writer(store.clone());
        writer.add_points(1).await.unwrap();

        tokio::time::advance(Duration::from_millis(200)).await;
        writer.queue(ProfileMutation::AddPoints(1));
        writer.queue(ProfileMutation::SetSharingMode(true));
        // Three fields pending, but the last flush was 200ms ago
        assert!(writer.set_more_battery(true).await.unwrap().is_none());

        tokio::time::advance(Duration::from_millis(1000)).await;
        let written = writer.flush_if_needed().await.unwrap().unwrap();
        assert_eq!(written.points, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_flush_requeues() {
        let (inner, _temp) = create_test_store();
        let store = FlakyStore {
            inner: inner.clone(),
            failing: AtomicBool::new(true),
        };
        let writer = ProfileWriter::new(store, Arc::new(Throttle::new()), BatchConfig::default());

        writer.queue(ProfileMutation::AddPoints(5));
        writer.queue(ProfileMutation::SetSharingMode(true));
        assert!(writer.flush_now().await.is_err());

        // Queued while the failed batch was out
        writer.queue(ProfileMutation::AddPoints(3));
        writer.queue(ProfileMutation::SetSharingMode(false));
        assert!(writer.flush_now().await.is_err());

        writer.store.failing.store(false, Ordering::SeqCst);
        let profile = writer.flush_now().await.unwrap().unwrap();
        assert_eq!(profile.points, 8);
        assert!(!profile.is_sharing_mode);
    }

    #[test]
    fn test_requeue_keeps_newer_flag() {
        let mut pending = Pending::default();
        pending.queue(ProfileMutation::SetMoreBattery(false));
        pending.queue(ProfileMutation::AddPoints(2));

        pending.requeue(ProfileMutation::SetMoreBattery(true));
        pending.requeue(ProfileMutation::AddPoints(5));

        assert_eq!(
            pending.mutations[&ProfileField::MoreBattery],
            ProfileMutation::SetMoreBattery(false)
        );
        assert_eq!(
            pending.mutations[&ProfileField::Points],
            ProfileMutation::AddPoints(7)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_points_cooldown() {
        let (store, _temp) = create_test_store();
        let writer = writer(store.clone());

        assert!(writer.add_points_with_cooldown(10).await.unwrap());
        assert!(!writer.add_points_with_cooldown(10).await.unwrap());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(writer.add_points_with_cooldown(10).await.unwrap());
        writer.flush_now().await.unwrap();

        assert_eq!(store.load_user().unwrap().unwrap().points, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_and_cleanup_are_throttled() {
        let (store, _temp) = create_test_store();
        store.ensure_user().unwrap();
        let writer = writer(store.clone());

        assert!(writer.update_user_stats().await.unwrap());
        assert!(!writer.update_user_stats().await.unwrap());
        assert!(store.load_user().unwrap().unwrap().last_sync.is_some());

        assert!(writer.cleanup_old_data().await.unwrap());
        assert!(!writer.cleanup_old_data().await.unwrap());
    }
}
