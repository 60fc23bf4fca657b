use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema on an open pool. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // One row per person currently on a roster, keyed by identity
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS inmates (
            id TEXT PRIMARY KEY,
            county TEXT NOT NULL,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            middle_name TEXT NOT NULL DEFAULT '',
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // County metadata for the read surface
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS counties (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_inmates_county ON inmates(county COLLATE NOCASE)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_inmates_name ON inmates(last_name, first_name)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
