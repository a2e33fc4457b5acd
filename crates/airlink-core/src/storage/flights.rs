//! Flight table operations

use std::collections::{BTreeMap, HashSet};

use redb::{ReadableTable, ReadableTableMetadata, TableDefinition};

use super::{decode, encode, LocalStore};
use crate::error::AirlinkError;
use crate::types::Flight;

pub(super) const FLIGHTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("flights");

/// Newest `update_time` first, flight number as tie-break.
fn sort_flights(flights: &mut [Flight]) {
    flights.sort_by(|a, b| {
        b.update_time
            .cmp(&a.update_time)
            .then_with(|| a.flight_number.cmp(&b.flight_number))
    });
}

impl LocalStore {
    /// Replace the whole flight table with `flights`.
    ///
    /// Runs as a single transaction: either every row is swapped or none is.
    /// Flights that were favorites before the replace stay favorites.
    /// Returns the rows as stored, in listing order.
    pub fn replace_flights(&self, flights: &[Flight]) -> Result<Vec<Flight>, AirlinkError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        let stored = {
            let mut table = write_txn.open_table(FLIGHTS_TABLE)?;

            let mut favorites = HashSet::new();
            let mut old_keys = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                let flight: Flight = decode(value.value())?;
                if flight.favorite {
                    favorites.insert(flight.flight_number);
                }
                old_keys.push(key.value().to_string());
            }
            for key in &old_keys {
                table.remove(key.as_str())?;
            }

            // Later duplicates win, same as sequential inserts would
            let mut by_number = BTreeMap::new();
            for flight in flights {
                let favorite = favorites.contains(&flight.flight_number);
                by_number.insert(
                    flight.flight_number.clone(),
                    flight.clone().with_favorite(favorite),
                );
            }
            for (number, flight) in &by_number {
                let data = encode(flight)?;
                table.insert(number.as_str(), data.as_slice())?;
            }

            by_number.into_values().collect::<Vec<_>>()
        };
        write_txn.commit()?;

        let mut stored = stored;
        sort_flights(&mut stored);
        Ok(stored)
    }

    /// All flights, newest `update_time` first.
    pub fn list_flights(&self) -> Result<Vec<Flight>, AirlinkError> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(FLIGHTS_TABLE)?;

        let mut flights = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            flights.push(decode(value.value())?);
        }
        sort_flights(&mut flights);
        Ok(flights)
    }

    /// Load one flight by number.
    pub fn load_flight(&self, flight_number: &str) -> Result<Option<Flight>, AirlinkError> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(FLIGHTS_TABLE)?;

        match table.get(flight_number)? {
            Some(v) => Ok(Some(decode(v.value())?)),
            None => Ok(None),
        }
    }

    /// Set the favorite flag. Returns `false` if the flight is not stored.
    pub fn set_favorite(&self, flight_number: &str, favorite: bool) -> Result<bool, AirlinkError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        let found = {
            let mut table = write_txn.open_table(FLIGHTS_TABLE)?;
            let existing: Option<Flight> = match table.get(flight_number)? {
                Some(v) => Some(decode(v.value())?),
                None => None,
            };
            match existing {
                Some(flight) => {
                    let data = encode(&flight.with_favorite(favorite))?;
                    table.insert(flight_number, data.as_slice())?;
                    true
                }
                None => false,
            }
        };
        write_txn.commit()?;
        Ok(found)
    }

    /// Favorite flights only, in listing order.
    pub fn list_favorite_flights(&self) -> Result<Vec<Flight>, AirlinkError> {
        Ok(self
            .list_flights()?
            .into_iter()
            .filter(|f| f.favorite)
            .collect())
    }

    /// Number of stored flights.
    pub fn flight_count(&self) -> Result<u64, AirlinkError> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(FLIGHTS_TABLE)?;
        Ok(table.len()?)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::create_test_store;
    use super::*;

    fn flight(number: &str, status: &str, date: &str) -> Flight {
        Flight {
            flight_number: number.to_string(),
            arrive_time: "11:45".to_string(),
            depart_time: "10:30".to_string(),
            from_short: "BCN".to_string(),
            to_short: "MAD".to_string(),
            status: status.to_string(),
            update_time: date.to_string(),
            favorite: false,
        }
    }

    #[test]
    fn test_replace_and_list() {
        let (store, _temp) = create_test_store();
        store
            .replace_flights(&[
                flight("VY1", "On Time", "2025-05-09"),
                flight("VY2", "Delayed", "2025-05-10"),
            ])
            .unwrap();

        let flights = store.list_flights().unwrap();
        assert_eq!(flights.len(), 2);
        assert_eq!(flights[0].flight_number, "VY2");
        assert_eq!(flights[1].flight_number, "VY1");
        assert_eq!(store.flight_count().unwrap(), 2);
    }

    #[test]
    fn test_replace_drops_missing_flights() {
        let (store, _temp) = create_test_store();
        store
            .replace_flights(&[
                flight("VY1", "On Time", "2025-05-09"),
                flight("VY2", "On Time", "2025-05-09"),
            ])
            .unwrap();
        store
            .replace_flights(&[flight("VY2", "Cancelled", "2025-05-10")])
            .unwrap();

        assert!(store.load_flight("VY1").unwrap().is_none());
        assert_eq!(store.load_flight("VY2").unwrap().unwrap().status, "Cancelled");
    }

    #[test]
    fn test_replace_keeps_favorites() {
        let (store, _temp) = create_test_store();
        store
            .replace_flights(&[flight("VY1", "On Time", "2025-05-09")])
            .unwrap();
        assert!(store.set_favorite("VY1", true).unwrap());

        let stored = store
            .replace_flights(&[flight("VY1", "Delayed", "2025-05-10")])
            .unwrap();

        assert!(stored[0].favorite);
        assert_eq!(store.list_favorite_flights().unwrap().len(), 1);
    }

    #[test]
    fn test_replace_with_duplicates_keeps_last() {
        let (store, _temp) = create_test_store();
        let stored = store
            .replace_flights(&[
                flight("VY1", "On Time", "2025-05-09"),
                flight("VY1", "Boarding", "2025-05-09"),
            ])
            .unwrap();

        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, "Boarding");
    }

    #[test]
    fn test_set_favorite_unknown_flight() {
        let (store, _temp) = create_test_store();
        assert!(!store.set_favorite("VY404", true).unwrap());
    }

    #[test]
    fn test_empty_store() {
        let (store, _temp) = create_test_store();
        assert!(store.list_flights().unwrap().is_empty());
        assert_eq!(store.flight_count().unwrap(), 0);
    }
}
