//! News table operations

use redb::{ReadableTable, TableDefinition};

use super::{decode, encode, LocalStore};
use crate::error::AirlinkError;
use crate::types::NewsItem;

pub(super) const NEWS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("news");

fn sort_news(items: &mut [NewsItem]) {
    items.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
}

impl LocalStore {
    /// Replace every stored news item in one transaction.
    pub fn replace_news(&self, items: &[NewsItem]) -> Result<Vec<NewsItem>, AirlinkError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(NEWS_TABLE)?;
            let mut old_keys = Vec::new();
            for entry in table.iter()? {
                let (key, _) = entry?;
                old_keys.push(key.value().to_string());
            }
            for key in &old_keys {
                table.remove(key.as_str())?;
            }
            for item in items {
                let data = encode(item)?;
                table.insert(item.id.as_str(), data.as_slice())?;
            }
        }
        write_txn.commit()?;
        drop(db);

        self.list_news()
    }

    /// All news, newest first.
    pub fn list_news(&self) -> Result<Vec<NewsItem>, AirlinkError> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(NEWS_TABLE)?;

        let mut items = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            items.push(decode(value.value())?);
        }
        sort_news(&mut items);
        Ok(items)
    }

    /// News attached to one flight.
    pub fn news_for_flight(&self, flight_number: &str) -> Result<Vec<NewsItem>, AirlinkError> {
        Ok(self
            .list_news()?
            .into_iter()
            .filter(|n| n.flight_number == flight_number)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::create_test_store;
    use super::*;

    fn item(id: &str, flight: &str, date: &str) -> NewsItem {
        NewsItem {
            id: id.to_string(),
            flight_number: flight.to_string(),
            title: format!("Update {id}"),
            content: "Check the departures board".to_string(),
            date: date.to_string(),
        }
    }

    #[test]
    fn test_replace_news_swaps_all_rows() {
        let (store, _temp) = create_test_store();
        store
            .replace_news(&[item("n1", "VY1", "2025-05-09"), item("n2", "VY2", "2025-05-09")])
            .unwrap();
        let stored = store.replace_news(&[item("n3", "VY1", "2025-05-10")]).unwrap();

        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, "n3");
    }

    #[test]
    fn test_news_ordering_and_filter() {
        let (store, _temp) = create_test_store();
        store
            .replace_news(&[
                item("n1", "VY1", "2025-05-08"),
                item("n2", "VY2", "2025-05-10"),
                item("n3", "VY1", "2025-05-09"),
            ])
            .unwrap();

        let all = store.list_news().unwrap();
        let ids: Vec<_> = all.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["n2", "n3", "n1"]);

        let vy1 = store.news_for_flight("VY1").unwrap();
        assert_eq!(vy1.len(), 2);
        assert!(vy1.iter().all(|n| n.flight_number == "VY1"));
    }
}
