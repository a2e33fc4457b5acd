//! Singleton user profile row

use redb::{ReadableTable, TableDefinition};
use tracing::debug;

use super::{decode, encode, LocalStore};
use crate::error::AirlinkError;
use crate::types::{ProfileMutation, UserProfile};

pub(super) const USER_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("user");

/// Fixed key of the only user row
const USER_KEY: &str = "device_user";

impl LocalStore {
    /// Create the user row with defaults if it does not exist yet.
    pub fn ensure_user(&self) -> Result<UserProfile, AirlinkError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        let profile = {
            let mut table = write_txn.open_table(USER_TABLE)?;
            let existing: Option<UserProfile> = match table.get(USER_KEY)? {
                Some(v) => Some(decode(v.value())?),
                None => None,
            };
            match existing {
                Some(profile) => profile,
                None => {
                    let profile = UserProfile::default();
                    let data = encode(&profile)?;
                    table.insert(USER_KEY, data.as_slice())?;
                    debug!("Created user profile row");
                    profile
                }
            }
        };
        write_txn.commit()?;
        Ok(profile)
    }

    /// Load the user row, if created.
    pub fn load_user(&self) -> Result<Option<UserProfile>, AirlinkError> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(USER_TABLE)?;

        match table.get(USER_KEY)? {
            Some(v) => Ok(Some(decode(v.value())?)),
            None => Ok(None),
        }
    }

    /// Apply a drained batch of profile mutations in one transaction.
    ///
    /// Point deltas are added to the value read inside the transaction, so
    /// increments committed by an earlier batch are never lost. `last_sync`
    /// is stamped with `now_ms`. A missing row is created first.
    pub fn apply_profile_batch(
        &self,
        mutations: &[ProfileMutation],
        now_ms: i64,
    ) -> Result<UserProfile, AirlinkError> {
        self.update_user(true, |profile| {
            for mutation in mutations {
                mutation.apply_to(profile);
            }
            profile.last_sync = Some(now_ms);
            true
        })
        .map(|p| p.unwrap_or_default())
    }

    /// Stamp `last_sync` with `now_ms`. Does nothing without a user row.
    pub fn touch_last_sync(&self, now_ms: i64) -> Result<Option<UserProfile>, AirlinkError> {
        self.update_user(false, |profile| {
            profile.last_sync = Some(now_ms);
            true
        })
    }

    /// Rewrite a `last_sync` older than `threshold_ms` to `now_ms`.
    ///
    /// Returns whether the row changed. A row that never synced is left alone.
    pub fn refresh_stale_sync(&self, threshold_ms: i64, now_ms: i64) -> Result<bool, AirlinkError> {
        let mut changed = false;
        self.update_user(false, |profile| match profile.last_sync {
            Some(ts) if ts < threshold_ms => {
                profile.last_sync = Some(now_ms);
                changed = true;
                true
            }
            _ => false,
        })?;
        Ok(changed)
    }

    /// Read-modify-write the user row inside one write transaction.
    ///
    /// `update` returns whether it changed the row; unchanged rows are not
    /// rewritten.
    fn update_user<F>(&self, create: bool, update: F) -> Result<Option<UserProfile>, AirlinkError>
    where
        F: FnOnce(&mut UserProfile) -> bool,
    {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        let result = {
            let mut table = write_txn.open_table(USER_TABLE)?;
            let existing: Option<UserProfile> = match table.get(USER_KEY)? {
                Some(v) => Some(decode(v.value())?),
                None => None,
            };
            let current = match existing {
                Some(profile) => Some(profile),
                None if create => Some(UserProfile::default()),
                None => None,
            };
            match current {
                Some(mut profile) => {
                    if update(&mut profile) {
                        let data = encode(&profile)?;
                        table.insert(USER_KEY, data.as_slice())?;
                    }
                    Some(profile)
                }
                None => None,
            }
        };
        write_txn.commit()?;
        Ok(result)
    }
}
