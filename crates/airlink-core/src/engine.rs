//! Airlink - the primary entry point
//!
//! `Airlink` wires the local store, the sync service, the profile writer
//! and the shared throttle together for one data directory.
//!
//! # Example
//!
//! ```ignore
//! use airlink_core::{Airlink, AirlinkConfig};
//!
//! let airlink = Airlink::open("~/.airlink/data", AirlinkConfig::default())?;
//!
//! let report = airlink.sync().sync_all().await;
//! if let Some(flights) = report.flights.payload() {
//!     for flight in flights {
//!         println!("{} {}", flight.flight_number, flight.status);
//!     }
//! }
//!
//! airlink.writer().set_sharing_mode(true).await?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::config::AirlinkConfig;
use crate::error::AirlinkResult;
use crate::link::{Discovery, LinkAdapter, PeerLinkManager};
use crate::relay::Snapshot;
use crate::storage::LocalStore;
use crate::sync::{HttpRemote, RemoteSource, SyncService};
use crate::throttle::Throttle;
use crate::types::UserProfile;
use crate::verify::SignatureVerifier;
use crate::writer::ProfileWriter;

const DB_FILE: &str = "airlink.redb";

/// Summary shown by `airlink info`
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub data_dir: PathBuf,
    pub flight_count: u64,
    pub news_count: usize,
    pub profile: Option<UserProfile>,
    pub authority_fingerprint: Option<String>,
}

pub struct Airlink<R: RemoteSource = HttpRemote> {
    store: LocalStore,
    throttle: Arc<Throttle>,
    sync: SyncService<R>,
    writer: ProfileWriter,
    verifier: SignatureVerifier,
    config: AirlinkConfig,
    data_dir: PathBuf,
}

impl Airlink<HttpRemote> {
    /// Open with the HTTP remote described by `config`.
    pub fn open(data_dir: impl AsRef<Path>, config: AirlinkConfig) -> AirlinkResult<Self> {
        let remote = Arc::new(HttpRemote::from_config(&config.remote)?);
        Self::with_remote(data_dir, config, remote)
    }
}

impl<R: RemoteSource> Airlink<R> {
    /// Open with a caller-supplied remote.
    ///
    /// Creates the data directory and the user row if needed.
    pub fn with_remote(
        data_dir: impl AsRef<Path>,
        config: AirlinkConfig,
        remote: Arc<R>,
    ) -> AirlinkResult<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        info!(?data_dir, "Opening Airlink");

        std::fs::create_dir_all(&data_dir)?;
        let store = LocalStore::new(data_dir.join(DB_FILE))?;
        store.ensure_user()?;

        let verifier = SignatureVerifier::new(&config.authority.public_key);
        let throttle = Arc::new(Throttle::new());
        let sync = SyncService::new(remote, store.clone(), verifier.clone(), &config);
        let writer = ProfileWriter::new(store.clone(), throttle.clone(), config.batch.clone());

        Ok(Self {
            store,
            throttle,
            sync,
            writer,
            verifier,
            config,
            data_dir,
        })
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn sync(&self) -> &SyncService<R> {
        &self.sync
    }

    pub fn writer(&self) -> &ProfileWriter {
        &self.writer
    }

    pub fn throttle(&self) -> &Arc<Throttle> {
        &self.throttle
    }

    pub fn config(&self) -> &AirlinkConfig {
        &self.config
    }

    /// A peer link manager using `discovery` and the configured link settings.
    pub fn link_manager(&self, discovery: Arc<dyn Discovery>) -> PeerLinkManager {
        PeerLinkManager::new(LinkAdapter::new(discovery), self.config.link.clone())
    }

    /// Current local data, as relayed to peers.
    pub fn snapshot(&self) -> AirlinkResult<Snapshot> {
        Ok(Snapshot {
            flights: self.store.list_flights()?,
            news: self.store.list_news()?,
        })
    }

    pub fn info(&self) -> AirlinkResult<NodeInfo> {
        Ok(NodeInfo {
            data_dir: self.data_dir.clone(),
            flight_count: self.store.flight_count()?,
            news_count: self.store.list_news()?.len(),
            profile: self.store.load_user()?,
            authority_fingerprint: self.verifier.fingerprint().map(str::to_string),
        })
    }

    /// Write any queued profile changes before shutting down.
    pub async fn shutdown(&self) -> AirlinkResult<()> {
        self.writer.flush_now().await?;
        info!("Airlink shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AirlinkError;
    use tempfile::TempDir;

    struct Offline;

    impl RemoteSource for Offline {
        async fn fetch(&self, _path: &str) -> AirlinkResult<Vec<u8>> {
            Err(AirlinkError::Network("offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_open_creates_user_and_reports_info() {
        let temp = TempDir::new().unwrap();
        let airlink =
            Airlink::with_remote(temp.path(), AirlinkConfig::default(), Arc::new(Offline)).unwrap();

        let info = airlink.info().unwrap();
        assert_eq!(info.flight_count, 0);
        assert_eq!(info.profile, Some(UserProfile::default()));
        assert!(info.authority_fingerprint.is_some());
        assert!(temp.path().join(DB_FILE).exists());
    }

    #[tokio::test]
    async fn test_offline_sync_with_empty_store_fails() {
        let temp = TempDir::new().unwrap();
        let airlink =
            Airlink::with_remote(temp.path(), AirlinkConfig::default(), Arc::new(Offline)).unwrap();

        let report = airlink.sync().sync_all().await;
        assert!(!report.all_succeeded());
    }

    #[tokio::test]
    async fn test_shutdown_flushes_pending_profile_changes() {
        let temp = TempDir::new().unwrap();
        let airlink =
            Airlink::with_remote(temp.path(), AirlinkConfig::default(), Arc::new(Offline)).unwrap();

        airlink.writer().add_points(3).await.unwrap();
        airlink.writer().queue(crate::types::ProfileMutation::AddPoints(4));
        airlink.shutdown().await.unwrap();

        assert_eq!(airlink.store().load_user().unwrap().unwrap().points, 7);
    }
}
