//! SQLite-backed [`Store`] implementation.
//!
//! Ids are stored as hyphenated UUID text, timestamps as Unix milliseconds,
//! and segment metadata as a JSON text column that indexed lookups reach
//! through `json_extract`. Every row is decoded into its typed record; a row
//! that does not decode is reported as [`Error::Decode`], never skipped.
//!
//! Lock contention, pool exhaustion, and I/O failures surface as transient
//! [`Error::Store`] values so the caller's retry helper can re-run
//! idempotent writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use uuid::Uuid;

use brainstore_core::embedding::{blob_to_vec, vec_to_blob};
use brainstore_core::models::{
    Brain, BrainUpdate, BrainUser, BrainVector, FileSummary, NewBrain, NewVector, Role,
    SegmentMetadata, VectorRecord,
};
use brainstore_core::store::Store;
use brainstore_core::{Error, Result};

/// SQLite implementation of the [`Store`] trait.
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

/// Classify a sqlx failure. Busy/locked databases, pool timeouts and I/O
/// errors are worth retrying; constraint and syntax errors are not.
pub fn store_err(e: sqlx::Error) -> Error {
    match &e {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed => {
            Error::transient_store(e.to_string())
        }
        sqlx::Error::Database(db) => {
            let message = db.message().to_ascii_lowercase();
            if message.contains("locked") || message.contains("busy") {
                Error::transient_store(e.to_string())
            } else {
                Error::store(e.to_string())
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            Error::Decode(e.to_string())
        }
        _ => Error::store(e.to_string()),
    }
}

fn parse_uuid(raw: &str, column: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::Decode(format!("{}: '{}': {}", column, raw, e)))
}

fn parse_millis(ms: i64, column: &str) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| Error::Decode(format!("{}: timestamp out of range: {}", column, ms)))
}

fn get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(column).map_err(store_err)
}

fn brain_from_row(row: &SqliteRow) -> Result<Brain> {
    let max_tokens: i64 = get(row, "max_tokens")?;
    Ok(Brain {
        id: parse_uuid(&get::<String>(row, "brain_id")?, "brain_id")?,
        name: get(row, "name")?,
        description: get(row, "description")?,
        status: get(row, "status")?,
        model: get(row, "model")?,
        temperature: get(row, "temperature")?,
        max_tokens: u32::try_from(max_tokens)
            .map_err(|_| Error::Decode(format!("max_tokens out of range: {}", max_tokens)))?,
        openai_api_key: get(row, "openai_api_key")?,
        created_at: parse_millis(get(row, "created_at")?, "created_at")?,
    })
}

fn member_from_row(row: &SqliteRow) -> Result<BrainUser> {
    Ok(BrainUser {
        brain_id: parse_uuid(&get::<String>(row, "brain_id")?, "brain_id")?,
        user_id: parse_uuid(&get::<String>(row, "user_id")?, "user_id")?,
        rights: get::<String>(row, "rights")?.parse::<Role>()?,
        default_brain: get::<i64>(row, "default_brain")? != 0,
    })
}

fn vector_from_row(row: &SqliteRow) -> Result<VectorRecord> {
    let metadata: SegmentMetadata = serde_json::from_str(&get::<String>(row, "metadata")?)?;
    let embedding: Option<Vec<u8>> = get(row, "embedding")?;
    Ok(VectorRecord {
        id: parse_uuid(&get::<String>(row, "id")?, "id")?,
        content: get(row, "content")?,
        metadata,
        embedding: embedding.map(|blob| blob_to_vec(&blob)),
        created_at: parse_millis(get(row, "created_at")?, "created_at")?,
    })
}

fn ids_from_rows(rows: &[SqliteRow], column: &str) -> Result<Vec<Uuid>> {
    rows.iter()
        .map(|row| parse_uuid(&get::<String>(row, column)?, column))
        .collect()
}

/// Append `(?, ?, ...)` binding every id as text.
/// Largest `IN (...)` list bound in one statement. Longer id lists are
/// split; SQLite caps bound parameters per statement.
const MAX_BOUND_IDS: usize = 500;

fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[Uuid]) {
    qb.push("(");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id.to_string());
    }
    separated.push_unseparated(")");
}

const BRAIN_COLUMNS: &str = "brain_id, name, description, status, model, temperature, \
                             max_tokens, openai_api_key, created_at";

#[async_trait]
impl Store for SqliteStore {
    async fn insert_brain(&self, brain: &NewBrain) -> Result<Brain> {
        let row = Brain {
            id: Uuid::new_v4(),
            name: brain.name.clone(),
            description: brain.description.clone(),
            status: brain.status.clone(),
            model: brain.model.clone(),
            temperature: brain.temperature,
            max_tokens: brain.max_tokens,
            openai_api_key: brain.openai_api_key.clone(),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO brains (brain_id, name, description, status, model, temperature,
                                max_tokens, openai_api_key, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.id.to_string())
        .bind(&row.name)
        .bind(&row.description)
        .bind(&row.status)
        .bind(&row.model)
        .bind(row.temperature)
        .bind(i64::from(row.max_tokens))
        .bind(&row.openai_api_key)
        .bind(row.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(row)
    }

    async fn get_brain(&self, id: Uuid) -> Result<Option<Brain>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM brains WHERE brain_id = ?",
            BRAIN_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.as_ref().map(brain_from_row).transpose()
    }

    async fn update_brain(&self, id: Uuid, update: &BrainUpdate) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM brains WHERE brain_id = ?",
            BRAIN_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_err)?;
        let Some(row) = row else {
            return Ok(false);
        };

        let mut brain = brain_from_row(&row)?;
        update.apply(&mut brain);

        sqlx::query(
            r#"
            UPDATE brains SET name = ?, description = ?, status = ?, model = ?,
                              temperature = ?, max_tokens = ?, openai_api_key = ?
            WHERE brain_id = ?
            "#,
        )
        .bind(&brain.name)
        .bind(&brain.description)
        .bind(&brain.status)
        .bind(&brain.model)
        .bind(brain.temperature)
        .bind(i64::from(brain.max_tokens))
        .bind(&brain.openai_api_key)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;
        Ok(true)
    }

    async fn delete_brain(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM brains WHERE brain_id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_brain_user(&self, member: &BrainUser) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        if member.default_brain {
            sqlx::query("UPDATE brains_users SET default_brain = 0 WHERE user_id = ?")
                .bind(member.user_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(store_err)?;
        }

        let inserted = sqlx::query(
            "INSERT INTO brains_users (brain_id, user_id, rights, default_brain) VALUES (?, ?, ?, ?)",
        )
        .bind(member.brain_id.to_string())
        .bind(member.user_id.to_string())
        .bind(member.rights.as_str())
        .bind(i64::from(member.default_brain))
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(Error::InvalidInput(format!(
                    "user {} is already a member of brain {}",
                    member.user_id, member.brain_id
                )));
            }
            Err(e) => return Err(store_err(e)),
        }

        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn get_brain_user(&self, brain_id: Uuid, user_id: Uuid) -> Result<Option<BrainUser>> {
        let row = sqlx::query(
            "SELECT brain_id, user_id, rights, default_brain FROM brains_users \
             WHERE brain_id = ? AND user_id = ?",
        )
        .bind(brain_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.as_ref().map(member_from_row).transpose()
    }

    async fn brain_users(&self, brain_id: Uuid) -> Result<Vec<BrainUser>> {
        let rows = sqlx::query(
            "SELECT brain_id, user_id, rights, default_brain FROM brains_users \
             WHERE brain_id = ? ORDER BY rowid",
        )
        .bind(brain_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter().map(member_from_row).collect()
    }

    async fn user_memberships(&self, user_id: Uuid) -> Result<Vec<(BrainUser, Brain)>> {
        let rows = sqlx::query(
            r#"
            SELECT bu.user_id, bu.rights, bu.default_brain,
                   b.brain_id, b.name, b.description, b.status, b.model, b.temperature,
                   b.max_tokens, b.openai_api_key, b.created_at
            FROM brains_users bu
            JOIN brains b ON b.brain_id = bu.brain_id
            WHERE bu.user_id = ?
            ORDER BY bu.rowid
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter()
            .map(|row| Ok((member_from_row(row)?, brain_from_row(row)?)))
            .collect()
    }

    async fn delete_brain_user(&self, brain_id: Uuid, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM brains_users WHERE brain_id = ? AND user_id = ?")
            .bind(brain_id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected())
    }

    async fn delete_brain_users(&self, brain_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM brains_users WHERE brain_id = ?")
            .bind(brain_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected())
    }

    async fn set_default_brain(&self, user_id: Uuid, brain_id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let is_member: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM brains_users WHERE user_id = ? AND brain_id = ?",
        )
        .bind(user_id.to_string())
        .bind(brain_id.to_string())
        .fetch_one(&mut *tx)
        .await
        .map_err(store_err)?;
        if !is_member {
            return Ok(false);
        }

        sqlx::query("UPDATE brains_users SET default_brain = 0 WHERE user_id = ?")
            .bind(user_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        sqlx::query("UPDATE brains_users SET default_brain = 1 WHERE user_id = ? AND brain_id = ?")
            .bind(user_id.to_string())
            .bind(brain_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;
        Ok(true)
    }

    async fn default_brain_id(&self, user_id: Uuid) -> Result<Option<Uuid>> {
        let raw: Option<String> = sqlx::query_scalar(
            "SELECT brain_id FROM brains_users WHERE user_id = ? AND default_brain = 1",
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        raw.map(|id| parse_uuid(&id, "brain_id")).transpose()
    }

    async fn insert_vectors(&self, vectors: &[NewVector]) -> Result<u64> {
        if vectors.is_empty() {
            return Ok(0);
        }
        let now = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        let mut inserted = 0;

        for v in vectors {
            let metadata = serde_json::to_string(&v.metadata)?;
            let result = sqlx::query(
                r#"
                INSERT INTO vectors (id, content, metadata, embedding, created_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(v.id.to_string())
            .bind(&v.content)
            .bind(metadata)
            .bind(v.embedding.as_deref().map(vec_to_blob))
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
            inserted += result.rows_affected();
        }

        tx.commit().await.map_err(store_err)?;
        Ok(inserted)
    }

    async fn vector_ids_by_file_sha1(&self, file_sha1: &str) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            "SELECT id FROM vectors WHERE json_extract(metadata, '$.file_sha1') = ? ORDER BY rowid",
        )
        .bind(file_sha1)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        ids_from_rows(&rows, "id")
    }

    async fn vector_ids_by_file_name(&self, file_name: &str) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            "SELECT id FROM vectors WHERE json_extract(metadata, '$.file_name') = ? ORDER BY rowid",
        )
        .bind(file_name)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        ids_from_rows(&rows, "id")
    }

    async fn vectors_by_file_name(&self, file_name: &str) -> Result<Vec<VectorRecord>> {
        let rows = sqlx::query(
            "SELECT id, content, metadata, embedding, created_at FROM vectors \
             WHERE json_extract(metadata, '$.file_name') = ? ORDER BY rowid",
        )
        .bind(file_name)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter().map(vector_from_row).collect()
    }

    async fn file_summaries(&self, vector_ids: &[Uuid]) -> Result<Vec<FileSummary>> {
        let mut files = Vec::new();
        for ids in vector_ids.chunks(MAX_BOUND_IDS) {
            let mut qb = QueryBuilder::<Sqlite>::new("SELECT metadata FROM vectors WHERE id IN ");
            push_id_list(&mut qb, ids);
            let rows = qb
                .build()
                .fetch_all(&self.pool)
                .await
                .map_err(store_err)?;

            for row in &rows {
                let metadata: SegmentMetadata =
                    serde_json::from_str(&get::<String>(row, "metadata")?)?;
                files.push(FileSummary {
                    name: metadata.file_name,
                    size: metadata.file_size,
                });
            }
        }
        Ok(files)
    }

    async fn delete_orphaned_vectors(&self, candidates: &[Uuid]) -> Result<Vec<Uuid>> {
        let mut deleted = Vec::new();
        for ids in candidates.chunks(MAX_BOUND_IDS) {
            // One statement: the reference check and the delete cannot
            // interleave with a concurrent link insert.
            let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM vectors WHERE id IN ");
            push_id_list(&mut qb, ids);
            qb.push(
                " AND NOT EXISTS (SELECT 1 FROM brains_vectors bv WHERE bv.vector_id = vectors.id) \
                 RETURNING id",
            );
            let rows = qb
                .build()
                .fetch_all(&self.pool)
                .await
                .map_err(store_err)?;
            deleted.extend(ids_from_rows(&rows, "id")?);
        }
        Ok(deleted)
    }

    async fn unlinked_vector_ids(&self, created_before: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            r#"
            SELECT v.id FROM vectors v
            WHERE v.created_at < ?
              AND NOT EXISTS (SELECT 1 FROM brains_vectors bv WHERE bv.vector_id = v.id)
            ORDER BY v.rowid
            "#,
        )
        .bind(created_before.timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        ids_from_rows(&rows, "id")
    }

    async fn insert_links(&self, links: &[BrainVector]) -> Result<u64> {
        if links.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        let mut inserted = 0;

        for link in links {
            let result = sqlx::query(
                "INSERT INTO brains_vectors (brain_id, vector_id, file_sha1) VALUES (?, ?, ?) \
                 ON CONFLICT(brain_id, vector_id) DO NOTHING",
            )
            .bind(link.brain_id.to_string())
            .bind(link.vector_id.to_string())
            .bind(&link.file_sha1)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
            inserted += result.rows_affected();
        }

        tx.commit().await.map_err(store_err)?;
        Ok(inserted)
    }

    async fn brain_has_file(&self, brain_id: Uuid, file_sha1: &str) -> Result<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM brains_vectors WHERE brain_id = ? AND file_sha1 = ?)",
        )
        .bind(brain_id.to_string())
        .bind(file_sha1)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)
    }

    async fn brain_vector_ids(&self, brain_id: Uuid) -> Result<Vec<Uuid>> {
        let rows =
            sqlx::query("SELECT vector_id FROM brains_vectors WHERE brain_id = ? ORDER BY rowid")
                .bind(brain_id.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(store_err)?;

        ids_from_rows(&rows, "vector_id")
    }

    async fn brains_for_vector(&self, vector_id: Uuid) -> Result<Vec<Uuid>> {
        let rows =
            sqlx::query("SELECT brain_id FROM brains_vectors WHERE vector_id = ? ORDER BY rowid")
                .bind(vector_id.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(store_err)?;

        ids_from_rows(&rows, "brain_id")
    }

    async fn delete_links(&self, brain_id: Uuid, vector_ids: &[Uuid]) -> Result<u64> {
        if vector_ids.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        let mut removed = 0;
        for ids in vector_ids.chunks(MAX_BOUND_IDS) {
            let mut qb =
                QueryBuilder::<Sqlite>::new("DELETE FROM brains_vectors WHERE brain_id = ");
            qb.push_bind(brain_id.to_string());
            qb.push(" AND vector_id IN ");
            push_id_list(&mut qb, ids);
            let result = qb
                .build()
                .execute(&mut *tx)
                .await
                .map_err(store_err)?;
            removed += result.rows_affected();
        }
        tx.commit().await.map_err(store_err)?;
        Ok(removed)
    }

    async fn delete_brain_links(&self, brain_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM brains_vectors WHERE brain_id = ?")
            .bind(brain_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected())
    }
}
