//! Repository layer for the local ledger.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by table:
//! - `positions.rs` - Ledger Entry operations and paired open/close writes
//! - `history.rs` - History Entry operations
//!
//! Properties, cumulative holdings and notification chats live here.

mod history;
mod positions;

use crate::domain::{Decimal, TimeMs, TokenInfo};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, warn};

/// Property key holding the time of the last heartbeat report.
pub const HEARTBEAT_PROPERTY: &str = "lastHeartbeatAlert";

/// Property key holding the Telegram `getUpdates` cursor.
pub const TELEGRAM_OFFSET_PROPERTY: &str = "telegramUpdateOffset";

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

/// Parse a stored decimal column, logging and defaulting to zero on corruption.
pub(crate) fn parse_stored_decimal(column: &str, key: &str, raw: &str) -> Decimal {
    Decimal::from_str(raw).unwrap_or_else(|e| {
        warn!(
            column = column,
            key = key,
            value = %raw,
            error = %e,
            "Failed to parse stored decimal, using default"
        );
        Decimal::default()
    })
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Property operations
    // =========================================================================

    /// Read a process property.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_property(&self, key: &str) -> Result<Option<String>, sqlx::Error> {
        let row = sqlx::query("SELECT value FROM properties WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    /// Insert or overwrite a process property.
    ///
    /// # Errors
    /// Returns an error if the upsert fails.
    pub async fn upsert_property(
        &self,
        key: &str,
        value: &str,
        now: TimeMs,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO properties (key, value, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now.as_ms())
        .bind(now.as_ms())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Cumulative holdings
    // =========================================================================

    /// Profit already earmarked for the operator in `token`, zero if never credited.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_token_holdings(&self, token: &TokenInfo) -> Result<Decimal, sqlx::Error> {
        let key = token.holdings_key();
        Ok(self
            .get_property(&key)
            .await?
            .map(|raw| parse_stored_decimal("value", &key, &raw))
            .unwrap_or_default())
    }

    /// Add `delta` to the cumulative holdings of `token` and return the new total.
    ///
    /// The read-modify-write runs in one transaction.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn increment_token_holdings(
        &self,
        token: &TokenInfo,
        delta: Decimal,
        now: TimeMs,
    ) -> Result<Decimal, sqlx::Error> {
        let key = token.holdings_key();
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query("SELECT value FROM properties WHERE key = ?")
            .bind(&key)
            .fetch_optional(&mut *tx)
            .await?
            .map(|r| parse_stored_decimal("value", &key, &r.get::<String, _>("value")))
            .unwrap_or_default();

        let total = current + delta;

        sqlx::query(
            r#"
            INSERT INTO properties (key, value, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&key)
        .bind(total.to_canonical_string())
        .bind(now.as_ms())
        .bind(now.as_ms())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(token = %token.symbol, delta = %delta, total = %total, "Holdings incremented");
        Ok(total)
    }

    // =========================================================================
    // Notification chats
    // =========================================================================

    /// Subscribe a chat to notifications. Returns false if already subscribed.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn add_notification_chat(
        &self,
        chat_id: i64,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO notification_chats (chat_id, created_at)
            VALUES (?, ?)
            ON CONFLICT(chat_id) DO NOTHING
            "#,
        )
        .bind(chat_id)
        .bind(now.as_ms())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_notification_chats(&self) -> Result<Vec<i64>, sqlx::Error> {
        let rows = sqlx::query("SELECT chat_id FROM notification_chats ORDER BY chat_id ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(|r| r.get::<i64, _>("chat_id")).collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use tempfile::TempDir;

    pub(crate) async fn setup_test_db() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn test_property_upsert_overwrites() {
        let (repo, _temp) = setup_test_db().await;

        assert_eq!(repo.get_property(HEARTBEAT_PROPERTY).await.unwrap(), None);

        repo.upsert_property(HEARTBEAT_PROPERTY, "1000", TimeMs::new(1))
            .await
            .unwrap();
        repo.upsert_property(HEARTBEAT_PROPERTY, "2000", TimeMs::new(2))
            .await
            .unwrap();

        assert_eq!(
            repo.get_property(HEARTBEAT_PROPERTY).await.unwrap(),
            Some("2000".to_string())
        );
    }

    #[tokio::test]
    async fn test_token_holdings_accumulate_per_mint() {
        let (repo, _temp) = setup_test_db().await;
        let sol = TokenInfo::sol();
        let usdc = TokenInfo::new("usdc-mint", 6, "USDC");

        assert_eq!(repo.get_token_holdings(&sol).await.unwrap(), Decimal::zero());

        repo.increment_token_holdings(&sol, d("1.5"), TimeMs::new(1))
            .await
            .unwrap();
        let total = repo
            .increment_token_holdings(&sol, d("0.25"), TimeMs::new(2))
            .await
            .unwrap();

        assert_eq!(total, d("1.75"));
        assert_eq!(repo.get_token_holdings(&sol).await.unwrap(), d("1.75"));
        assert_eq!(repo.get_token_holdings(&usdc).await.unwrap(), Decimal::zero());
        assert_eq!(
            repo.get_property(&sol.holdings_key()).await.unwrap(),
            Some("1.75".to_string())
        );
    }

    #[tokio::test]
    async fn test_corrupt_holdings_default_to_zero() {
        let (repo, _temp) = setup_test_db().await;
        let sol = TokenInfo::sol();

        repo.upsert_property(&sol.holdings_key(), "not-a-number", TimeMs::new(1))
            .await
            .unwrap();

        assert_eq!(repo.get_token_holdings(&sol).await.unwrap(), Decimal::zero());
    }

    #[tokio::test]
    async fn test_notification_chats_are_unique() {
        let (repo, _temp) = setup_test_db().await;

        assert!(repo.add_notification_chat(42, TimeMs::new(1)).await.unwrap());
        assert!(!repo.add_notification_chat(42, TimeMs::new(2)).await.unwrap());
        assert!(repo.add_notification_chat(-7, TimeMs::new(3)).await.unwrap());

        assert_eq!(repo.list_notification_chats().await.unwrap(), vec![-7, 42]);
    }
}
