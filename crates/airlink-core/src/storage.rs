//! Persistent storage using redb.
//!
//! This module provides ACID-compliant storage for:
//! - Flights (keyed by flight number)
//! - News items (keyed by news id)
//! - The singleton user profile row
//!
//! Every write path runs inside one redb write transaction, so a failed
//! write never partially applies. Readers use read transactions and see the
//! last committed state.

use crate::error::AirlinkError;
use parking_lot::RwLock;
use redb::Database;
use std::path::Path;
use std::sync::Arc;

mod flights;
mod news;
mod user;

use flights::FLIGHTS_TABLE;
use news::NEWS_TABLE;
use user::USER_TABLE;

/// Local store backed by a single redb database file.
///
/// Cloning is cheap and shares the same database handle; construct one per
/// process and pass clones to the components that need it.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<RwLock<Database>>,
}

impl LocalStore {
    /// Open or create the store at the given path.
    ///
    /// This will:
    /// - Create the parent directory if it doesn't exist
    /// - Initialize the database file
    /// - Create all required tables
    pub fn new(path: impl AsRef<Path>) -> Result<Self, AirlinkError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(FLIGHTS_TABLE)?;
            let _ = write_txn.open_table(NEWS_TABLE)?;
            let _ = write_txn.open_table(USER_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, AirlinkError> {
    serde_json::to_vec(value).map_err(|e| AirlinkError::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, AirlinkError> {
    serde_json::from_slice(bytes).map_err(|e| AirlinkError::Serialization(e.to_string()))
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_can_be_created() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.redb");
        assert!(LocalStore::new(&db_path).is_ok());
    }

    #[test]
    fn test_store_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested/path/to/test.redb");
        assert!(LocalStore::new(&db_path).is_ok());
        assert!(db_path.exists());
    }
}
