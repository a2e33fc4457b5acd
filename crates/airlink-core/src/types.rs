//! Core types for Airlink
//!
//! Records come in two shapes: the wire form exactly as the authority signs
//! it, and the stored form persisted in the local store.

use serde::{Deserialize, Deserializer};

mod flight;
mod news;
mod profile;

pub use flight::{Flight, FlightRecord};
pub use news::NewsItem;
pub use profile::{ProfileField, ProfileMutation, UserProfile};

/// Deserialize a string field where the authority may send `null` or omit it.
///
/// Both canonicalize to `""`, the same value the signer used.
pub(crate) fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Current wall-clock time as Unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
