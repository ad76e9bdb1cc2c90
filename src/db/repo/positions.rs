//! Ledger Entry operations for the repository.

use crate::domain::{
    Address, HistoryUpdate, LedgerEntry, NewHistoryEntry, NewLedgerEntry, PositionUpdate, TimeMs,
    TokenAmounts,
};
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{QueryBuilder, Row};

use super::{parse_stored_decimal, Repository};

const LEDGER_COLUMNS: &str = r#"
    address, out_of_range_since, remaining_spent_token_a, remaining_spent_token_b,
    previous_price, previous_received_fees_token_a, previous_received_fees_token_b,
    previous_received_fees_total_usdc, last_rewards_collected,
    redeposit_attempts_remaining, created_at, updated_at
"#;

fn ledger_entry_from_row(row: &SqliteRow) -> LedgerEntry {
    let address: String = row.get("address");
    let decimal = |column: &str| parse_stored_decimal(column, &address, &row.get::<String, _>(column));

    LedgerEntry {
        out_of_range_since: row
            .get::<Option<i64>, _>("out_of_range_since")
            .map(TimeMs::new),
        remaining_spent: TokenAmounts::new(
            decimal("remaining_spent_token_a"),
            decimal("remaining_spent_token_b"),
        ),
        previous_price: decimal("previous_price"),
        previous_received_fees: TokenAmounts::new(
            decimal("previous_received_fees_token_a"),
            decimal("previous_received_fees_token_b"),
        ),
        previous_received_fees_total_usdc: decimal("previous_received_fees_total_usdc"),
        last_rewards_collected: row
            .get::<Option<i64>, _>("last_rewards_collected")
            .map(TimeMs::new),
        redeposit_attempts_remaining: row.get("redeposit_attempts_remaining"),
        created_at: TimeMs::new(row.get("created_at")),
        updated_at: TimeMs::new(row.get("updated_at")),
        address: Address::new(address.clone()),
    }
}

impl Repository {
    /// Find the Ledger Entry for a position.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_position(
        &self,
        address: &Address,
    ) -> Result<Option<LedgerEntry>, sqlx::Error> {
        let sql = format!("SELECT {LEDGER_COLUMNS} FROM ledger_positions WHERE address = ?");
        let row = sqlx::query(&sql)
            .bind(address.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(ledger_entry_from_row))
    }

    /// All Ledger Entries, oldest first.
    pub async fn list_positions(&self) -> Result<Vec<LedgerEntry>, sqlx::Error> {
        let sql = format!(
            "SELECT {LEDGER_COLUMNS} FROM ledger_positions ORDER BY created_at ASC, address ASC"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(ledger_entry_from_row).collect())
    }

    /// Ledger Entries with a forced redeposit still pending.
    pub async fn list_pending_redeposits(&self) -> Result<Vec<LedgerEntry>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {LEDGER_COLUMNS} FROM ledger_positions
            WHERE redeposit_attempts_remaining > 0
            ORDER BY created_at ASC, address ASC
            "#
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(ledger_entry_from_row).collect())
    }

    /// Insert a Ledger Entry on its own.
    ///
    /// # Errors
    /// Returns an error if the insert fails (including a duplicate address).
    pub async fn create_position(
        &self,
        entry: &NewLedgerEntry,
        now: TimeMs,
    ) -> Result<(), sqlx::Error> {
        insert_ledger_entry(entry, now).execute(&self.pool).await?;
        Ok(())
    }

    /// Write the named fields of a Ledger Entry and refresh `updated_at`.
    ///
    /// Returns false when no row matched.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn update_position(
        &self,
        address: &Address,
        update: &PositionUpdate,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE ledger_positions SET updated_at = ");
        qb.push_bind(now.as_ms());

        if let Some(since) = update.out_of_range_since {
            qb.push(", out_of_range_since = ")
                .push_bind(since.map(|t| t.as_ms()));
        }
        if let Some(value) = update.remaining_spent_token_a {
            qb.push(", remaining_spent_token_a = ")
                .push_bind(value.to_canonical_string());
        }
        if let Some(value) = update.remaining_spent_token_b {
            qb.push(", remaining_spent_token_b = ")
                .push_bind(value.to_canonical_string());
        }
        if let Some(value) = update.previous_price {
            qb.push(", previous_price = ")
                .push_bind(value.to_canonical_string());
        }
        if let Some(value) = update.previous_received_fees_token_a {
            qb.push(", previous_received_fees_token_a = ")
                .push_bind(value.to_canonical_string());
        }
        if let Some(value) = update.previous_received_fees_token_b {
            qb.push(", previous_received_fees_token_b = ")
                .push_bind(value.to_canonical_string());
        }
        if let Some(value) = update.previous_received_fees_total_usdc {
            qb.push(", previous_received_fees_total_usdc = ")
                .push_bind(value.to_canonical_string());
        }
        if let Some(collected) = update.last_rewards_collected {
            qb.push(", last_rewards_collected = ")
                .push_bind(collected.map(|t| t.as_ms()));
        }
        if let Some(attempts) = update.redeposit_attempts_remaining {
            qb.push(", redeposit_attempts_remaining = ")
                .push_bind(attempts.max(0));
        }

        qb.push(" WHERE address = ")
            .push_bind(address.as_str().to_string());

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove a Ledger Entry. Returns false when no row matched.
    pub async fn delete_position(&self, address: &Address) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM ledger_positions WHERE address = ?")
            .bind(address.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Paired writes (Ledger + History in one transaction)
    // =========================================================================

    /// Start tracking a position: insert its Ledger Entry together with the
    /// History Entry that opens a new interval. Returns the history id.
    ///
    /// # Errors
    /// Returns an error if either insert fails; nothing is written in that case.
    pub async fn create_tracked_position(
        &self,
        entry: &NewLedgerEntry,
        history: &NewHistoryEntry,
        now: TimeMs,
    ) -> Result<i64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        insert_ledger_entry(entry, now).execute(&mut *tx).await?;
        let history_id = super::history::insert_history_entry(history, now)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        tx.commit().await?;
        Ok(history_id)
    }

    /// Stop tracking a position: close its latest History Entry with `closing`
    /// (which should set `closed`) and delete the Ledger Entry.
    ///
    /// Returns whether a Ledger Entry was removed.
    ///
    /// # Errors
    /// Returns an error if any statement fails; nothing is written in that case.
    pub async fn close_tracked_position(
        &self,
        address: &Address,
        closing: &HistoryUpdate,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let latest: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM position_history
            WHERE address = ?
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(address.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(id) = latest {
            let mut qb = super::history::history_update_query(id, closing, now);
            qb.build().execute(&mut *tx).await?;
        }

        let deleted = sqlx::query("DELETE FROM ledger_positions WHERE address = ?")
            .bind(address.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        tx.commit().await?;
        Ok(deleted)
    }
}

fn insert_ledger_entry(
    entry: &NewLedgerEntry,
    now: TimeMs,
) -> sqlx::query::Query<'static, Sqlite, sqlx::sqlite::SqliteArguments<'static>> {
    sqlx::query(
        r#"
        INSERT INTO ledger_positions
        (address, out_of_range_since, remaining_spent_token_a, remaining_spent_token_b,
         previous_price, previous_received_fees_token_a, previous_received_fees_token_b,
         previous_received_fees_total_usdc, last_rewards_collected,
         redeposit_attempts_remaining, created_at, updated_at)
        VALUES (?, NULL, ?, ?, ?, ?, ?, ?, NULL, 0, ?, ?)
        "#,
    )
    .bind(entry.address.as_str().to_string())
    .bind(entry.remaining_spent.a.floor_zero().to_canonical_string())
    .bind(entry.remaining_spent.b.floor_zero().to_canonical_string())
    .bind(entry.previous_price.to_canonical_string())
    .bind(entry.previous_received_fees.a.to_canonical_string())
    .bind(entry.previous_received_fees.b.to_canonical_string())
    .bind(entry.previous_received_fees_total_usdc.to_canonical_string())
    .bind(now.as_ms())
    .bind(now.as_ms())
}
