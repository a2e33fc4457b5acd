//! Flight records

use serde::{Deserialize, Serialize};

use super::null_as_empty;

/// Placeholder for fields the authority left blank.
const UNKNOWN: &str = "Unknown";

/// A flight as signed and served by the authority.
///
/// Field order is part of the signed format: serializing this struct with
/// `serde_json` yields exactly the bytes the authority signed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightRecord {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub flight_number: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub origin_full: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub origin_short: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub departure_time: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub destination_full: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub destination_short: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub landing_time: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub date: String,
}

/// A flight as kept in the local store.
///
/// `favorite` is device-local state and never comes from the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flight {
    pub flight_number: String,
    pub arrive_time: String,
    pub depart_time: String,
    pub from_short: String,
    pub to_short: String,
    pub status: String,
    pub update_time: String,
    #[serde(default)]
    pub favorite: bool,
}

impl Flight {
    /// Mark this flight as a favorite
    pub fn with_favorite(mut self, favorite: bool) -> Self {
        self.favorite = favorite;
        self
    }
}

fn or_unknown(value: String) -> String {
    if value.is_empty() {
        UNKNOWN.to_string()
    } else {
        value
    }
}

impl From<FlightRecord> for Flight {
    fn from(record: FlightRecord) -> Self {
        Self {
            flight_number: record.flight_number,
            arrive_time: or_unknown(record.landing_time),
            depart_time: or_unknown(record.departure_time),
            from_short: record.origin_short,
            to_short: record.destination_short,
            status: or_unknown(record.status),
            update_time: or_unknown(record.date),
            favorite: false,
        }
    }
}
