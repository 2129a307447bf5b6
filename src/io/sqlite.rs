//! SQLite implementation of [`TransactionStore`].
//!
//! Uses [`sqlx`] with the `sqlite` feature. `sqlx::migrate!` embeds
//! `./migrations` at compile time relative to the crate root; the database
//! location comes from the `[stores]` section of the config at runtime.
//!
//! Runtime-checked `sqlx::query` is used so no `DATABASE_URL` is needed to build.

use crate::domain::types::{Plate, TransactionId, VehicleTransaction};
use crate::io::store::{StoreError, TransactionStore};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

/// SQLite-backed transaction store
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `url` and run pending migrations.
    ///
    /// `url` is a sqlx SQLite URL, e.g. `"sqlite://operator_a.db"` or
    /// `"sqlite::memory:"` for tests. In-memory databases are per connection,
    /// so the pool is pinned to a single connection for them.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let max_connections = if url.contains(":memory:") { 1 } else { 8 };
        let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!(url = %url, "sqlite_store_connected");
        Ok(Self { pool })
    }

    /// Record a vehicle entry. Used for seeding and tests; production rows come from the operator.
    pub async fn insert(&self, plate: &Plate, entry_time: NaiveDateTime) -> Result<TransactionId, StoreError> {
        let result = sqlx::query("INSERT INTO transactions (vehicle_number, time_in) VALUES (?1, ?2)")
            .bind(plate.as_str())
            .bind(entry_time)
            .execute(&self.pool)
            .await?;
        Ok(TransactionId(result.last_insert_rowid()))
    }

    /// Phone currently linked to a transaction
    pub async fn mobile_number(&self, id: TransactionId) -> Result<Option<String>, StoreError> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT mobile_number FROM transactions WHERE id = ?1")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(mobile,)| mobile))
    }
}

#[async_trait]
impl TransactionStore for SqliteStore {
    async fn latest_transaction(&self, plate: &Plate) -> Result<Option<VehicleTransaction>, StoreError> {
        let row: Option<(i64, NaiveDateTime)> = sqlx::query_as(
            "SELECT id, time_in FROM transactions \
             WHERE vehicle_number = ?1 ORDER BY time_in DESC, id DESC LIMIT 1",
        )
        .bind(plate.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, entry_time)| VehicleTransaction {
            id: TransactionId(id),
            plate: plate.clone(),
            entry_time,
        }))
    }

    async fn link_phone(&self, id: TransactionId, phone: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE transactions SET mobile_number = ?1 WHERE id = ?2")
            .bind(phone)
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::UnknownTransaction(id));
        }
        Ok(())
    }

    async fn exists(&self, plate: &Plate) -> Result<bool, StoreError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM transactions WHERE vehicle_number = ?1 LIMIT 1")
                .bind(plate.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    async fn linked_vehicles(&self, phone: &str, limit: usize) -> Result<Vec<Plate>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT vehicle_number FROM transactions \
             WHERE mobile_number = ?1 AND vehicle_number IS NOT NULL \
             GROUP BY vehicle_number ORDER BY MAX(id) DESC, vehicle_number ASC LIMIT ?2",
        )
        .bind(phone)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(|(plate,)| Plate::parse(&plate)).collect())
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

    async fn memory_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_latest_transaction_and_link() {
        let store = memory_store().await;
        store.insert(&plate("KCA123X"), at(8, 0)).await.unwrap();
        let newest = store.insert(&plate("KCA123X"), at(10, 15)).await.unwrap();

        let tx = store.latest_transaction(&plate("KCA123X")).await.unwrap().unwrap();
        assert_eq!(tx.id, newest);
        assert_eq!(tx.entry_time, at(10, 15));

        store.link_phone(newest, "254700000001").await.unwrap();
        assert_eq!(store.mobile_number(newest).await.unwrap().as_deref(), Some("254700000001"));

        let missing = store.link_phone(TransactionId(4242), "254700000001").await;
        assert!(matches!(missing, Err(StoreError::UnknownTransaction(_))));
    }

    #[tokio::test]
    async fn test_exists_and_linked_vehicles() {
        let store = memory_store().await;
        let phone = "254700000001";
        let a = store.insert(&plate("KAA111A"), at(7, 0)).await.unwrap();
        let b = store.insert(&plate("KBB222B"), at(8, 0)).await.unwrap();
        let a2 = store.insert(&plate("KAA111A"), at(9, 0)).await.unwrap();
        for id in [a, b, a2] {
            store.link_phone(id, phone).await.unwrap();
        }

        assert!(store.exists(&plate("KBB222B")).await.unwrap());
        assert!(!store.exists(&plate("KZZ000Z")).await.unwrap());

        let vehicles = store.linked_vehicles(phone, 9).await.unwrap();
        assert_eq!(vehicles, vec![plate("KAA111A"), plate("KBB222B")]);
        assert!(store.linked_vehicles("254711111111", 9).await.unwrap().is_empty());
    }
}
