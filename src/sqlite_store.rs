//! SQLite-backed [`RosterStore`] implementation.
//!
//! Every write runs inside a single transaction, so a failed batch leaves
//! the previous snapshot intact.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use roster_core::store::{CountyRow, RosterPage, RosterQuery, RosterStore};
use roster_core::{NormalizedRecord, SinkError};

/// SQLite implementation of the [`RosterStore`] trait.
///
/// Wraps a [`SqlitePool`]; the schema is created by
/// [`crate::migrate::apply`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn write_err(e: sqlx::Error) -> SinkError {
    SinkError::WriteFailed(e.to_string())
}

fn read_err(e: sqlx::Error) -> SinkError {
    SinkError::ReadFailed(e.to_string())
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

#[async_trait]
impl RosterStore for SqliteStore {
    async fn upsert(&self, records: &[NormalizedRecord]) -> Result<usize, SinkError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(write_err)?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO inmates (id, county, last_name, first_name, middle_name, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    county = excluded.county,
                    last_name = excluded.last_name,
                    first_name = excluded.first_name,
                    middle_name = excluded.middle_name,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&record.id)
            .bind(&record.county)
            .bind(&record.last_name)
            .bind(&record.first_name)
            .bind(&record.middle_name)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        }

        tx.commit().await.map_err(write_err)?;
        Ok(records.len())
    }

    async fn delete_all(&self) -> Result<u64, SinkError> {
        let mut tx = self.pool.begin().await.map_err(write_err)?;
        let result = sqlx::query("DELETE FROM inmates")
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        tx.commit().await.map_err(write_err)?;
        Ok(result.rows_affected())
    }

    async fn list_county(&self, query: &RosterQuery) -> Result<RosterPage, SinkError> {
        let pattern = query.search_term().map(escape_like);

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM inmates
            WHERE county = ?1 COLLATE NOCASE
              AND (?2 IS NULL
                   OR first_name LIKE ?2 ESCAPE '\'
                   OR last_name LIKE ?2 ESCAPE '\')
            "#,
        )
        .bind(&query.county)
        .bind(pattern.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(read_err)?;

        let rows = sqlx::query(
            r#"
            SELECT id, county, last_name, first_name, middle_name
            FROM inmates
            WHERE county = ?1 COLLATE NOCASE
              AND (?2 IS NULL
                   OR first_name LIKE ?2 ESCAPE '\'
                   OR last_name LIKE ?2 ESCAPE '\')
            ORDER BY last_name, first_name
            LIMIT ?3 OFFSET ?4
            "#,
        )
        .bind(&query.county)
        .bind(pattern.as_deref())
        .bind(i64::from(query.page_size))
        .bind(query.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(read_err)?;

        let records = rows
            .iter()
            .map(|row| NormalizedRecord {
                id: row.get("id"),
                county: row.get("county"),
                last_name: row.get("last_name"),
                first_name: row.get("first_name"),
                middle_name: row.get("middle_name"),
            })
            .collect();

        Ok(RosterPage {
            records,
            total: total.max(0) as u64,
        })
    }

    async fn counties(&self) -> Result<Vec<CountyRow>, SinkError> {
        let rows = sqlx::query("SELECT id, name FROM counties ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(read_err)?;
        Ok(rows
            .iter()
            .map(|row| CountyRow {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }

    async fn init_counties(&self, names: &[&str]) -> Result<usize, SinkError> {
        let mut tx = self.pool.begin().await.map_err(write_err)?;
        for (i, name) in names.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO counties (id, name) VALUES (?, ?)
                ON CONFLICT(id) DO UPDATE SET name = excluded.name
                "#,
            )
            .bind(i as i64 + 1)
            .bind(*name)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        }
        tx.commit().await.map_err(write_err)?;
        Ok(names.len())
    }
}
