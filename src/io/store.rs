//! Vehicle transaction store port and in-memory adapter
//!
//! Each operator's back end is one `TransactionStore`. The gateway only reads
//! entry times and writes the caller's phone; the store owns everything else.
//!
//! Precondition: a plate has at most one active transaction, and the most
//! recently created row is the current stay. Stale rows must be purged upstream.

use crate::domain::types::{Plate, TransactionId, VehicleTransaction};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("transaction {0} not found")]
    UnknownTransaction(TransactionId),
    #[error("unsupported store url: {0}")]
    UnsupportedUrl(String),
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Most recently created transaction for a plate
    async fn latest_transaction(&self, plate: &Plate) -> Result<Option<VehicleTransaction>, StoreError>;

    /// Record the phone that asked about this transaction
    async fn link_phone(&self, id: TransactionId, phone: &str) -> Result<(), StoreError>;

    /// Whether the store has any transaction for the plate
    async fn exists(&self, plate: &Plate) -> Result<bool, StoreError>;

    /// Plates linked to a phone, most recently created transaction first, distinct by plate.
    ///
    /// The order must be reproducible: an IVR caller picks by position on a later request.
    async fn linked_vehicles(&self, phone: &str, limit: usize) -> Result<Vec<Plate>, StoreError>;
}

/// Open the store named by a `[stores]` URL: `memory` or `sqlite://...`
pub async fn open_store(url: &str) -> Result<Arc<dyn TransactionStore>, StoreError> {
    if url == "memory" {
        return Ok(Arc::new(InMemoryStore::new()));
    }
    if url.starts_with("sqlite:") {
        let store = crate::io::sqlite::SqliteStore::connect(url).await?;
        return Ok(Arc::new(store));
    }
    Err(StoreError::UnsupportedUrl(url.to_string()))
}

#[derive(Debug, Clone)]
struct Row {
    id: TransactionId,
    plate: Plate,
    entry_time: NaiveDateTime,
    mobile_number: Option<String>,
}

/// A thread-safe in-memory transaction store.
///
/// IDs increase with insertion order, so a higher ID is a more recently created row.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    rows: Arc<RwLock<Vec<Row>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a vehicle entry and return its transaction ID
    pub fn insert(&self, plate: Plate, entry_time: NaiveDateTime) -> TransactionId {
        let mut rows = self.rows.write();
        let id = TransactionId(rows.len() as i64 + 1);
        rows.push(Row { id, plate, entry_time, mobile_number: None });
        id
    }

    /// Record a vehicle entry already linked to a phone
    pub fn insert_linked(&self, plate: Plate, entry_time: NaiveDateTime, phone: &str) -> TransactionId {
        let id = self.insert(plate, entry_time);
        if let Some(row) = self.rows.write().iter_mut().find(|r| r.id == id) {
            row.mobile_number = Some(phone.to_string());
        }
        id
    }

    /// Phone currently linked to a transaction
    pub fn mobile_number(&self, id: TransactionId) -> Option<String> {
        self.rows.read().iter().find(|r| r.id == id).and_then(|r| r.mobile_number.clone())
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn latest_transaction(&self, plate: &Plate) -> Result<Option<VehicleTransaction>, StoreError> {
        let rows = self.rows.read();
        Ok(rows
            .iter()
            .filter(|r| &r.plate == plate)
            .max_by_key(|r| (r.entry_time, r.id.0))
            .map(|r| VehicleTransaction { id: r.id, plate: r.plate.clone(), entry_time: r.entry_time }))
    }

    async fn link_phone(&self, id: TransactionId, phone: &str) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        let row = rows.iter_mut().find(|r| r.id == id).ok_or(StoreError::UnknownTransaction(id))?;
        row.mobile_number = Some(phone.to_string());
        Ok(())
    }

    async fn exists(&self, plate: &Plate) -> Result<bool, StoreError> {
        Ok(self.rows.read().iter().any(|r| &r.plate == plate))
    }

    async fn linked_vehicles(&self, phone: &str, limit: usize) -> Result<Vec<Plate>, StoreError> {
        let rows = self.rows.read();
        let mut newest: HashMap<&Plate, i64> = HashMap::new();
        for row in rows.iter().filter(|r| r.mobile_number.as_deref() == Some(phone)) {
            let id = newest.entry(&row.plate).or_insert(row.id.0);
            *id = (*id).max(row.id.0);
        }

        let mut plates: Vec<(&Plate, i64)> = newest.into_iter().collect();
        plates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
        Ok(plates.into_iter().take(limit).map(|(plate, _)| plate.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap().and_hms_opt(hour, minute, 0).unwrap()
    }

    fn plate(s: &str) -> Plate {
        Plate::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_latest_transaction_picks_newest_entry() {
        let store = InMemoryStore::new();
        store.insert(plate("KCA123X"), at(8, 0));
        let newest = store.insert(plate("KCA123X"), at(11, 30));
        store.insert(plate("KBZ001A"), at(12, 0));

        let tx = store.latest_transaction(&plate("KCA123X")).await.unwrap().unwrap();
        assert_eq!(tx.id, newest);
        assert_eq!(tx.entry_time, at(11, 30));
        assert!(store.latest_transaction(&plate("KDD999Z")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_link_phone() {
        let store = InMemoryStore::new();
        let id = store.insert(plate("KCA123X"), at(9, 0));
        store.link_phone(id, "254700000001").await.unwrap();
        assert_eq!(store.mobile_number(id).as_deref(), Some("254700000001"));

        let missing = store.link_phone(TransactionId(99), "254700000001").await;
        assert!(matches!(missing, Err(StoreError::UnknownTransaction(TransactionId(99)))));
    }

    #[tokio::test]
    async fn test_exists() {
        let store = InMemoryStore::new();
        store.insert(plate("KCA123X"), at(9, 0));
        assert!(store.exists(&plate("KCA123X")).await.unwrap());
        assert!(!store.exists(&plate("KCA124X")).await.unwrap());
    }

    #[tokio::test]
    async fn test_linked_vehicles_order_is_stable() {
        let store = InMemoryStore::new();
        let phone = "254700000001";
        store.insert_linked(plate("KAA111A"), at(7, 0), phone);
        store.insert_linked(plate("KBB222B"), at(8, 0), phone);
        store.insert_linked(plate("KAA111A"), at(9, 0), phone);
        store.insert_linked(plate("KCC333C"), at(10, 0), "254799999999");

        let first = store.linked_vehicles(phone, 9).await.unwrap();
        assert_eq!(first, vec![plate("KAA111A"), plate("KBB222B")]);

        let again = store.linked_vehicles(phone, 9).await.unwrap();
        assert_eq!(first, again);

        let limited = store.linked_vehicles(phone, 1).await.unwrap();
        assert_eq!(limited, vec![plate("KAA111A")]);
    }

    #[tokio::test]
    async fn test_open_store_by_url() {
        let memory = open_store("memory").await.unwrap();
        assert!(!memory.exists(&plate("KCA123X")).await.unwrap());

        let sqlite = open_store("sqlite::memory:").await.unwrap();
        assert!(sqlite.linked_vehicles("254700000001", 9).await.unwrap().is_empty());

        let err = open_store("postgres://localhost/parking").await.err().unwrap();
        assert!(matches!(err, StoreError::UnsupportedUrl(_)));
    }
}
