use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the schema in the database named by `config`. Safe to re-run.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index on an open pool. Safe to re-run.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS brains (
            brain_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'public',
            model TEXT NOT NULL,
            temperature REAL NOT NULL DEFAULT 0,
            max_tokens INTEGER NOT NULL DEFAULT 256,
            openai_api_key TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS brains_users (
            brain_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            rights TEXT NOT NULL,
            default_brain INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (brain_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vectors (
            id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            embedding BLOB,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // rowid gives links a stable insertion order
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS brains_vectors (
            brain_id TEXT NOT NULL,
            vector_id TEXT NOT NULL,
            file_sha1 TEXT NOT NULL,
            PRIMARY KEY (brain_id, vector_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one default brain per user
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_brains_users_default \
         ON brains_users(user_id) WHERE default_brain = 1",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_brains_users_user ON brains_users(user_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_brains_vectors_vector ON brains_vectors(vector_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_brains_vectors_sha1 ON brains_vectors(brain_id, file_sha1)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_vectors_file_sha1 \
         ON vectors(json_extract(metadata, '$.file_sha1'))",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_vectors_file_name \
         ON vectors(json_extract(metadata, '$.file_name'))",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_created_at ON vectors(created_at)")
        .execute(pool)
        .await?;

    Ok(())
}
