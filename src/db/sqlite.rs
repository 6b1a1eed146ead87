use crate::db::models::DbConfigEntry;
use crate::db::schema::SQLITE_INIT;
use crate::error::ShowcaseError;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::collections::BTreeMap;
use std::str::FromStr;

pub type SqlitePool = Pool<Sqlite>;

#[derive(Clone)]
pub struct SiteStorage {
    pool: SqlitePool,
}

impl SiteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database and apply the schema.
    pub async fn connect(database_url: &str) -> Result<Self, ShowcaseError> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(connect_opts).await?;
        let storage = Self::new(pool);
        storage.init_schema().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), ShowcaseError> {
        // sqlx::query runs one statement at a time
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Insert each pair whose key is absent. Existing values are left alone.
    /// Returns how many keys were written.
    pub async fn seed_defaults(&self, defaults: &[(&str, &str)]) -> Result<u64, ShowcaseError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for (key, value) in defaults {
            let res = sqlx::query(
                "INSERT OR IGNORE INTO config (key, value, updated_at) VALUES (?, ?, ?)",
            )
            .bind(*key)
            .bind(*value)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            written += res.rows_affected();
        }
        tx.commit().await?;
        Ok(written)
    }

    pub async fn counter(&self) -> Result<i64, ShowcaseError> {
        let rec: Option<(i64,)> = sqlx::query_as("SELECT value FROM counter WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(rec.map(|r| r.0).unwrap_or(0))
    }

    /// Atomically add one to the counter and return the new value.
    /// Saturates at `i64::MAX`; SQLite would otherwise turn the row into a REAL.
    pub async fn increment_counter(&self) -> Result<i64, ShowcaseError> {
        let rec: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO counter (id, value) VALUES (1, 1)
            ON CONFLICT(id) DO UPDATE SET value = MIN(value, ?) + 1
            RETURNING value
            "#,
        )
        .bind(i64::MAX - 1)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec.0)
    }

    /// Move the counter up to `value`. A lower value leaves it unchanged.
    pub async fn raise_counter(&self, value: i64) -> Result<i64, ShowcaseError> {
        let rec: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO counter (id, value) VALUES (1, ?)
            ON CONFLICT(id) DO UPDATE SET value = MAX(value, excluded.value)
            RETURNING value
            "#,
        )
        .bind(value.max(0))
        .fetch_one(&self.pool)
        .await?;
        Ok(rec.0)
    }

    pub async fn config_entries(&self) -> Result<Vec<DbConfigEntry>, ShowcaseError> {
        let rows = sqlx::query("SELECT key, value, updated_at FROM config ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_model).collect()
    }

    pub async fn config_map(&self) -> Result<BTreeMap<String, String>, ShowcaseError> {
        Ok(self
            .config_entries()
            .await?
            .into_iter()
            .map(|e| (e.key, e.value))
            .collect())
    }

    pub async fn config_value(&self, key: &str) -> Result<Option<String>, ShowcaseError> {
        let rec: Option<(String,)> = sqlx::query_as("SELECT value FROM config WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(rec.map(|r| r.0))
    }

    pub async fn set_config_value(&self, key: &str, value: &str) -> Result<(), ShowcaseError> {
        sqlx::query(
            r#"
            INSERT INTO config (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Upsert every pair in a single transaction.
    pub async fn set_config_values(
        &self,
        values: &BTreeMap<String, String>,
    ) -> Result<(), ShowcaseError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        for (key, value) in values {
            sqlx::query(
                r#"
                INSERT INTO config (key, value, updated_at) VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(key)
            .bind(value)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_config_value(&self, key: &str) -> Result<bool, ShowcaseError> {
        let res = sqlx::query("DELETE FROM config WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    fn row_to_model(row: SqliteRow) -> Result<DbConfigEntry, ShowcaseError> {
        let key: String = row.try_get("key")?;
        let value: String = row.try_get("value")?;
        let updated_at_str: String = row.try_get("updated_at")?;
        let updated_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&updated_at_str)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
            .with_timezone(&Utc);
        Ok(DbConfigEntry {
            key,
            value,
            updated_at,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    pub(crate) async fn temp_storage(tag: &str) -> (SiteStorage, std::path::PathBuf) {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before UNIX_EPOCH")
            .as_nanos();
        let mut path = std::env::temp_dir();
        path.push(format!(
            "showcase-{tag}-{}-{}.sqlite",
            std::process::id(),
            nanos
        ));
        let storage = SiteStorage::connect(&format!("sqlite:{}", path.display()))
            .await
            .expect("failed to open temp database");
        (storage, path)
    }

    #[tokio::test]
    async fn counter_starts_at_zero_and_increments() {
        let (storage, path) = temp_storage("counter").await;
        assert_eq!(storage.counter().await.unwrap(), 0);
        assert_eq!(storage.increment_counter().await.unwrap(), 1);
        assert_eq!(storage.increment_counter().await.unwrap(), 2);
        assert_eq!(storage.counter().await.unwrap(), 2);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn raise_counter_never_decreases() {
        let (storage, path) = temp_storage("raise").await;
        assert_eq!(storage.raise_counter(40).await.unwrap(), 40);
        assert_eq!(storage.raise_counter(7).await.unwrap(), 40);
        assert_eq!(storage.raise_counter(-3).await.unwrap(), 40);
        assert_eq!(storage.increment_counter().await.unwrap(), 41);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn increment_saturates_at_max() {
        let (storage, path) = temp_storage("saturate").await;
        assert_eq!(storage.raise_counter(i64::MAX - 1).await.unwrap(), i64::MAX - 1);
        assert_eq!(storage.increment_counter().await.unwrap(), i64::MAX);
        assert_eq!(storage.increment_counter().await.unwrap(), i64::MAX);
        assert_eq!(storage.counter().await.unwrap(), i64::MAX);
        assert_eq!(storage.raise_counter(5).await.unwrap(), i64::MAX);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let (storage, path) = temp_storage("concurrent").await;
        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let s = storage.clone();
                tokio::spawn(async move { s.increment_counter().await.unwrap() })
            })
            .collect();
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(storage.counter().await.unwrap(), 20);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn seed_defaults_keeps_existing_values() {
        let (storage, path) = temp_storage("seed").await;
        storage.set_config_value("COMPANY_NAME", "Acme").await.unwrap();
        let written = storage
            .seed_defaults(&[("COMPANY_NAME", "Default Co"), ("CONTACT_NAME", "Support")])
            .await
            .unwrap();
        assert_eq!(written, 1);
        let map = storage.config_map().await.unwrap();
        assert_eq!(map.get("COMPANY_NAME").map(String::as_str), Some("Acme"));
        assert_eq!(map.get("CONTACT_NAME").map(String::as_str), Some("Support"));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn config_read_after_write() {
        let (storage, path) = temp_storage("config").await;
        assert_eq!(storage.config_value("API_KEY").await.unwrap(), None);
        storage.set_config_value("API_KEY", "sk-1").await.unwrap();
        storage.set_config_value("API_KEY", "sk-2").await.unwrap();
        assert_eq!(
            storage.config_value("API_KEY").await.unwrap().as_deref(),
            Some("sk-2")
        );

        let batch = BTreeMap::from([
            ("CONTACT_NAME".to_string(), "Ada".to_string()),
            ("CONTACT_TITLE".to_string(), "CTO".to_string()),
        ]);
        storage.set_config_values(&batch).await.unwrap();
        let entries = storage.config_entries().await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].key, "API_KEY");

        assert!(storage.delete_config_value("CONTACT_TITLE").await.unwrap());
        assert!(!storage.delete_config_value("CONTACT_TITLE").await.unwrap());
        let _ = std::fs::remove_file(path);
    }
}
