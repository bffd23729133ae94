use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the schema for the database configured under `[db]`.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Idempotent schema creation on an open pool.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS concepts (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            keywords TEXT NOT NULL DEFAULT '',
            category TEXT NOT NULL DEFAULT '',
            summary TEXT NOT NULL DEFAULT '',
            token_num INTEGER NOT NULL DEFAULT 0,
            embedding BLOB,
            dims INTEGER,
            datasource TEXT NOT NULL DEFAULT '',
            filepath TEXT NOT NULL DEFAULT '',
            plaintext TEXT NOT NULL DEFAULT '',
            dedup_hash TEXT NOT NULL UNIQUE,
            source_num INTEGER NOT NULL DEFAULT 0,
            target_num INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Edges are directed: source_id -> target_id
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS networks (
            source_id TEXT NOT NULL,
            target_id TEXT NOT NULL,
            similarity REAL NOT NULL,
            strategy TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(source_id, target_id),
            FOREIGN KEY (source_id) REFERENCES concepts(id) ON DELETE CASCADE,
            FOREIGN KEY (target_id) REFERENCES concepts(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_concepts_filepath ON concepts(filepath)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_concepts_category ON concepts(category)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_networks_target ON networks(target_id)")
        .execute(pool)
        .await?;

    Ok(())
}
