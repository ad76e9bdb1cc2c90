//! History Entry operations for the repository.

use crate::domain::{Address, HistoryEntry, HistoryUpdate, NewHistoryEntry, TimeMs, TokenAmounts};
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{QueryBuilder, Row};

use super::{parse_stored_decimal, Repository};

const HISTORY_COLUMNS: &str = r#"
    id, address, entered_price_usdc, total_spent_token_a, total_spent_token_b,
    total_spent_usdc, received_fees_token_a, received_fees_token_b,
    closed, closed_price_usdc, created_at, updated_at
"#;

fn history_entry_from_row(row: &SqliteRow) -> HistoryEntry {
    let id: i64 = row.get("id");
    let key = id.to_string();
    let decimal = |column: &str| parse_stored_decimal(column, &key, &row.get::<String, _>(column));

    HistoryEntry {
        id,
        address: Address::new(row.get::<String, _>("address")),
        entered_price_usdc: decimal("entered_price_usdc"),
        total_spent: TokenAmounts::new(decimal("total_spent_token_a"), decimal("total_spent_token_b")),
        total_spent_usdc: decimal("total_spent_usdc"),
        received_fees: TokenAmounts::new(
            decimal("received_fees_token_a"),
            decimal("received_fees_token_b"),
        ),
        closed: row.get::<Option<i64>, _>("closed").map(TimeMs::new),
        closed_price_usdc: row
            .get::<Option<String>, _>("closed_price_usdc")
            .map(|raw| parse_stored_decimal("closed_price_usdc", &key, &raw)),
        created_at: TimeMs::new(row.get("created_at")),
        updated_at: TimeMs::new(row.get("updated_at")),
    }
}

pub(super) fn insert_history_entry(
    entry: &NewHistoryEntry,
    now: TimeMs,
) -> sqlx::query::Query<'static, Sqlite, SqliteArguments<'static>> {
    sqlx::query(
        r#"
        INSERT INTO position_history
        (address, entered_price_usdc, total_spent_token_a, total_spent_token_b,
         total_spent_usdc, received_fees_token_a, received_fees_token_b,
         closed, closed_price_usdc, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, '0', '0', NULL, NULL, ?, ?)
        "#,
    )
    .bind(entry.address.as_str().to_string())
    .bind(entry.entered_price_usdc.to_canonical_string())
    .bind(entry.total_spent.a.to_canonical_string())
    .bind(entry.total_spent.b.to_canonical_string())
    .bind(entry.total_spent_usdc.to_canonical_string())
    .bind(now.as_ms())
    .bind(now.as_ms())
}

pub(super) fn history_update_query(
    id: i64,
    update: &HistoryUpdate,
    now: TimeMs,
) -> QueryBuilder<'static, Sqlite> {
    let mut qb = QueryBuilder::<Sqlite>::new("UPDATE position_history SET updated_at = ");
    qb.push_bind(now.as_ms());

    let decimals = [
        ("total_spent_token_a", update.total_spent_token_a),
        ("total_spent_token_b", update.total_spent_token_b),
        ("total_spent_usdc", update.total_spent_usdc),
        ("received_fees_token_a", update.received_fees_token_a),
        ("received_fees_token_b", update.received_fees_token_b),
    ];
    for (column, value) in decimals {
        if let Some(value) = value {
            qb.push(format!(", {column} = "))
                .push_bind(value.to_canonical_string());
        }
    }
    if let Some(closed) = update.closed {
        qb.push(", closed = ").push_bind(closed.map(|t| t.as_ms()));
    }
    if let Some(price) = update.closed_price_usdc {
        qb.push(", closed_price_usdc = ")
            .push_bind(price.map(|p| p.to_canonical_string()));
    }

    qb.push(" WHERE id = ").push_bind(id);
    qb
}

impl Repository {
    /// The current History Entry of a position: newest by creation, then id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_latest_history(
        &self,
        address: &Address,
    ) -> Result<Option<HistoryEntry>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {HISTORY_COLUMNS} FROM position_history
            WHERE address = ?
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#
        );
        let row = sqlx::query(&sql)
            .bind(address.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(history_entry_from_row))
    }

    /// Append a History Entry and return its id.
    pub async fn create_history(
        &self,
        entry: &NewHistoryEntry,
        now: TimeMs,
    ) -> Result<i64, sqlx::Error> {
        let result = insert_history_entry(entry, now).execute(&self.pool).await?;
        Ok(result.last_insert_rowid())
    }

    /// Write the named fields of a History Entry and refresh `updated_at`.
    ///
    /// Returns false when no row matched.
    pub async fn update_history(
        &self,
        id: i64,
        update: &HistoryUpdate,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let mut qb = history_update_query(id, update, now);
        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// History of one position (or of all positions), newest first.
    pub async fn list_history(
        &self,
        address: Option<&Address>,
    ) -> Result<Vec<HistoryEntry>, sqlx::Error> {
        let rows = match address {
            Some(address) => {
                let sql = format!(
                    "SELECT {HISTORY_COLUMNS} FROM position_history WHERE address = ? ORDER BY created_at DESC, id DESC"
                );
                sqlx::query(&sql)
                    .bind(address.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {HISTORY_COLUMNS} FROM position_history ORDER BY created_at DESC, id DESC"
                );
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
        };

        Ok(rows.iter().map(history_entry_from_row).collect())
    }
}
