//! Postgres + pgvector record store
//!
//! Ranking uses pgvector's `<=>` operator, which is cosine distance. The
//! vector index is built with `vector_cosine_ops` to match, and
//! [`PgVectorStore::verify_cosine_operator`] checks the operator at connect
//! time so a server with different operator semantics fails loudly instead
//! of silently changing ranking.
//!
//! Filtered nearest-neighbour queries run with `hnsw.iterative_scan =
//! strict_order`, so the HNSW scan keeps walking the graph until `limit`
//! rows pass the filter instead of stopping after `hnsw.ef_search`
//! candidates. The walk is capped at `HNSW_MAX_SCAN_TUPLES` visited
//! tuples. Iterative scans need pgvector 0.8.0 or newer, which is checked
//! at connect time.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, Postgres, QueryBuilder, Row};

use crate::config::StorageConfig;
use crate::error::{MemoryError, Result};
use crate::memory::types::{MemoryRecord, NewMemory, ScoredMemory};
use crate::storage::filter::MemoryFilter;
use crate::storage::{MEMORIES_TABLE, RecordStore, ensure_dimension};

const SELECT_COLUMNS: &str = "id, content, embedding, metadata, category, priority, tags, \
                              owner_agent, conversation_thread, created_at, updated_at";

const EMBEDDING_INDEX: &str = "idx_semantic_memories_embedding";

/// HNSW graph parameters (pgvector defaults made explicit)
const HNSW_M: u32 = 16;
const HNSW_EF_CONSTRUCTION: u32 = 64;

/// Upper bound on tuples a filtered HNSW scan visits (pgvector's default)
const HNSW_MAX_SCAN_TUPLES: u32 = 20_000;

/// First pgvector release with `hnsw.iterative_scan`
const MIN_PGVECTOR_VERSION: (u32, u32) = (0, 8);

#[derive(Debug, FromRow)]
struct MemoryRow {
    id: i64,
    content: String,
    embedding: Vector,
    metadata: Json<Map<String, Value>>,
    category: String,
    priority: String,
    tags: Json<Vec<String>>,
    owner_agent: Option<String>,
    conversation_thread: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct ScoredRow {
    #[sqlx(flatten)]
    row: MemoryRow,
    similarity: f64,
}

impl TryFrom<MemoryRow> for MemoryRecord {
    type Error = MemoryError;

    fn try_from(row: MemoryRow) -> Result<Self> {
        let id = row.id;
        Ok(MemoryRecord {
            id,
            content: row.content,
            embedding: row.embedding.to_vec(),
            metadata: row.metadata.0,
            category: row
                .category
                .parse()
                .map_err(|e| MemoryError::Store(format!("Corrupt category in record {id}: {e}")))?,
            priority: row
                .priority
                .parse()
                .map_err(|e| MemoryError::Store(format!("Corrupt priority in record {id}: {e}")))?,
            tags: row.tags.0,
            owner_agent: row.owner_agent,
            conversation_thread: row.conversation_thread,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Record store backed by a Postgres table with a pgvector column
pub struct PgVectorStore {
    pool: PgPool,
    dimension: usize,
}

impl PgVectorStore {
    /// Connect a pool, create the schema if missing and verify the
    /// distance operator.
    pub async fn connect(url: &str, dimension: usize, config: &StorageConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| MemoryError::Store(format!("Failed to connect to Postgres: {e}")))?;

        Self::from_pool(pool, dimension).await
    }

    /// Wrap an existing pool
    pub async fn from_pool(pool: PgPool, dimension: usize) -> Result<Self> {
        let store = Self { pool, dimension };
        store.migrate().await?;
        store.verify_extension_version().await?;
        store.verify_cosine_operator().await?;
        Ok(store)
    }

    /// Create the extension, table, indexes and `updated_at` trigger.
    /// Every statement is idempotent.
    pub async fn migrate(&self) -> Result<()> {
        let dimension = self.dimension;
        let statements = [
            "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
            format!(
                "CREATE TABLE IF NOT EXISTS {MEMORIES_TABLE} (
                    id BIGSERIAL PRIMARY KEY,
                    content TEXT NOT NULL CHECK (content <> ''),
                    embedding VECTOR({dimension}) NOT NULL,
                    metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                    category VARCHAR(50) NOT NULL DEFAULT 'general',
                    priority VARCHAR(20) NOT NULL DEFAULT 'medium',
                    tags JSONB NOT NULL DEFAULT '[]'::jsonb,
                    owner_agent VARCHAR(255),
                    conversation_thread VARCHAR(255),
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )"
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {EMBEDDING_INDEX} ON {MEMORIES_TABLE}
                 USING hnsw (embedding vector_cosine_ops)
                 WITH (m = {HNSW_M}, ef_construction = {HNSW_EF_CONSTRUCTION})"
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_semantic_memories_category ON {MEMORIES_TABLE} (category)"
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_semantic_memories_priority ON {MEMORIES_TABLE} (priority)"
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_semantic_memories_owner_agent ON {MEMORIES_TABLE} (owner_agent)"
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_semantic_memories_thread ON {MEMORIES_TABLE} (conversation_thread)"
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_semantic_memories_created_at ON {MEMORIES_TABLE} (created_at DESC)"
            ),
            "CREATE OR REPLACE FUNCTION semantic_memories_touch_updated_at()
             RETURNS TRIGGER AS $$
             BEGIN
                 NEW.updated_at = NOW();
                 RETURN NEW;
             END;
             $$ LANGUAGE plpgsql"
                .to_string(),
            format!(
                "DROP TRIGGER IF EXISTS semantic_memories_updated_at ON {MEMORIES_TABLE}"
            ),
            format!(
                "CREATE TRIGGER semantic_memories_updated_at
                 BEFORE UPDATE ON {MEMORIES_TABLE}
                 FOR EACH ROW EXECUTE FUNCTION semantic_memories_touch_updated_at()"
            ),
        ];

        for statement in &statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| MemoryError::Store(format!("Failed to apply schema: {e}")))?;
        }

        self.check_existing_dimension().await?;
        tracing::debug!("Schema for {MEMORIES_TABLE} is up to date ({dimension} dimensions)");
        Ok(())
    }

    /// A table created earlier with another model keeps its old width;
    /// refuse to mix.
    async fn check_existing_dimension(&self) -> Result<()> {
        let width: i32 = sqlx::query_scalar(
            "SELECT atttypmod FROM pg_attribute
             WHERE attrelid = $1::regclass AND attname = 'embedding'",
        )
        .bind(MEMORIES_TABLE)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MemoryError::Store(format!("Failed to read embedding width: {e}")))?;

        if width as usize != self.dimension {
            return Err(MemoryError::Config(format!(
                "{MEMORIES_TABLE}.embedding stores {width}-dimensional vectors but the \
                 embedding provider is configured for {}; mixing models in one collection \
                 is not supported",
                self.dimension
            )));
        }
        Ok(())
    }

    /// Refuse pgvector releases without iterative index scans
    pub async fn verify_extension_version(&self) -> Result<()> {
        let version: String =
            sqlx::query_scalar("SELECT extversion FROM pg_extension WHERE extname = 'vector'")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| MemoryError::Store(format!("Failed to read pgvector version: {e}")))?;

        match parse_version(&version) {
            Some(found) if found >= MIN_PGVECTOR_VERSION => {
                tracing::debug!("pgvector {version}");
                Ok(())
            }
            _ => Err(MemoryError::Store(format!(
                "pgvector {version} is too old; {}.{}.0 or newer is required for \
                 filtered HNSW scans",
                MIN_PGVECTOR_VERSION.0, MIN_PGVECTOR_VERSION.1
            ))),
        }
    }

    /// Check that `<=>` behaves as cosine distance: parallel vectors of
    /// different length are at distance 0, orthogonal ones at 1.
    pub async fn verify_cosine_operator(&self) -> Result<()> {
        let row = sqlx::query(
            "SELECT ('[1,0]'::vector <=> '[2,0]'::vector)::float8 AS parallel,
                    ('[1,0]'::vector <=> '[0,1]'::vector)::float8 AS orthogonal",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MemoryError::Store(format!("Failed to probe distance operator: {e}")))?;

        let parallel: f64 = row
            .try_get("parallel")
            .map_err(|e| MemoryError::Store(format!("Failed to read probe result: {e}")))?;
        let orthogonal: f64 = row
            .try_get("orthogonal")
            .map_err(|e| MemoryError::Store(format!("Failed to read probe result: {e}")))?;

        if parallel.abs() > 1e-6 || (orthogonal - 1.0).abs() > 1e-6 {
            return Err(MemoryError::Store(format!(
                "The <=> operator is not cosine distance on this server \
                 (parallel = {parallel}, orthogonal = {orthogonal})"
            )));
        }

        tracing::debug!("Verified <=> is cosine distance");
        Ok(())
    }
}

/// Major and minor parts of an `extversion` string such as `0.8.0`
fn parse_version(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}

/// Append a WHERE clause for `filter`, binding every value
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &MemoryFilter) {
    let mut separator = " WHERE ";

    if let Some(category) = filter.category {
        qb.push(separator).push("category = ").push_bind(category.as_str());
        separator = " AND ";
    }

    if let Some(priority) = filter.priority {
        qb.push(separator).push("priority = ").push_bind(priority.as_str());
        separator = " AND ";
    }

    if let Some(ref owner) = filter.owner_agent {
        qb.push(separator).push("owner_agent = ").push_bind(owner.clone());
        separator = " AND ";
    }

    if let Some(ref thread) = filter.conversation_thread {
        qb.push(separator)
            .push("conversation_thread = ")
            .push_bind(thread.clone());
        separator = " AND ";
    }

    if let Some(cutoff) = filter.created_before {
        qb.push(separator).push("created_at < ").push_bind(cutoff);
    }
}

#[async_trait]
impl RecordStore for PgVectorStore {
    fn name(&self) -> &'static str {
        "pgvector"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn insert(&self, memory: NewMemory) -> Result<MemoryRecord> {
        ensure_dimension(self.dimension, &memory.embedding)?;

        let sql = format!(
            "INSERT INTO {MEMORIES_TABLE}
                (content, embedding, metadata, category, priority, tags, owner_agent, conversation_thread)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {SELECT_COLUMNS}"
        );

        let row: MemoryRow = sqlx::query_as(&sql)
            .bind(memory.content)
            .bind(Vector::from(memory.embedding))
            .bind(Json(memory.metadata))
            .bind(memory.category.as_str())
            .bind(memory.priority.as_str())
            .bind(Json(memory.tags))
            .bind(memory.owner_agent)
            .bind(memory.conversation_thread)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::Store(format!("Failed to insert memory: {e}")))?;

        row.try_into()
    }

    async fn get(&self, id: i64) -> Result<Option<MemoryRecord>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM {MEMORIES_TABLE} WHERE id = $1");

        let row: Option<MemoryRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::Store(format!("Failed to query memory: {e}")))?;

        row.map(MemoryRecord::try_from).transpose()
    }

    async fn nearest(
        &self,
        query: &[f32],
        filter: &MemoryFilter,
        limit: usize,
    ) -> Result<Vec<ScoredMemory>> {
        ensure_dimension(self.dimension, query)?;
        let query_vector = Vector::from(query.to_vec());

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {SELECT_COLUMNS}, 1 - (embedding <=> "
        ));
        qb.push_bind(query_vector.clone());
        qb.push(") AS similarity FROM ");
        qb.push(MEMORIES_TABLE);
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY embedding <=> ");
        qb.push_bind(query_vector);
        qb.push(", created_at DESC, id DESC LIMIT ");
        qb.push_bind(limit as i64);

        let search_error =
            |e: sqlx::Error| MemoryError::Store(format!("Failed to execute search: {e}"));

        // SET LOCAL scopes the scan settings to this transaction
        let mut tx = self.pool.begin().await.map_err(search_error)?;
        sqlx::query("SET LOCAL hnsw.iterative_scan = strict_order")
            .execute(&mut *tx)
            .await
            .map_err(search_error)?;
        sqlx::query(&format!("SET LOCAL hnsw.max_scan_tuples = {HNSW_MAX_SCAN_TUPLES}"))
            .execute(&mut *tx)
            .await
            .map_err(search_error)?;
        let rows: Vec<ScoredRow> = qb
            .build_query_as()
            .fetch_all(&mut *tx)
            .await
            .map_err(search_error)?;
        tx.commit().await.map_err(search_error)?;

        rows.into_iter()
            .map(|scored| {
                let similarity = if scored.similarity.is_finite() {
                    scored.similarity.clamp(-1.0, 1.0) as f32
                } else {
                    0.0
                };
                Ok(ScoredMemory {
                    record: scored.row.try_into()?,
                    similarity,
                })
            })
            .collect()
    }

    async fn recent(&self, filter: &MemoryFilter, window: usize) -> Result<Vec<MemoryRecord>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {SELECT_COLUMNS} FROM "));
        qb.push(MEMORIES_TABLE);
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        qb.push_bind(window as i64);

        let rows: Vec<MemoryRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::Store(format!("Failed to scan candidates: {e}")))?;

        rows.into_iter().map(MemoryRecord::try_from).collect()
    }

    async fn count(&self, filter: &MemoryFilter) -> Result<usize> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM ");
        qb.push(MEMORIES_TABLE);
        push_filter(&mut qb, filter);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::Store(format!("Failed to count memories: {e}")))?;

        Ok(count as usize)
    }

    async fn delete_matching(&self, filter: &MemoryFilter) -> Result<usize> {
        if filter.is_empty() {
            return Err(MemoryError::Validation(
                "Refusing to delete without a filter".to_string(),
            ));
        }

        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM ");
        qb.push(MEMORIES_TABLE);
        push_filter(&mut qb, filter);

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Store(format!("Failed to delete memories: {e}")))?;

        Ok(result.rows_affected() as usize)
    }

    async fn build_vector_index(&self) -> Result<bool> {
        // Compacts the graph after heavy purging
        sqlx::query(&format!("REINDEX INDEX {EMBEDDING_INDEX}"))
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Store(format!("Failed to rebuild vector index: {e}")))?;
        Ok(true)
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{Category, Priority};
    use chrono::TimeZone;

    fn rendered(filter: &MemoryFilter) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 FROM semantic_memories");
        push_filter(&mut qb, filter);
        qb.sql().to_string()
    }

    #[test]
    fn test_empty_filter_adds_no_where() {
        assert_eq!(rendered(&MemoryFilter::new()), "SELECT 1 FROM semantic_memories");
    }

    #[test]
    fn test_filter_binds_values() {
        let filter = MemoryFilter::new()
            .with_category(Category::Coding)
            .with_priority(Priority::High)
            .with_owner_agent("coding-agent");

        assert_eq!(
            rendered(&filter),
            "SELECT 1 FROM semantic_memories WHERE category = $1 AND priority = $2 AND owner_agent = $3"
        );
    }

    #[test]
    fn test_filter_thread_and_cutoff() {
        let cutoff = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let filter = MemoryFilter::new()
            .with_conversation_thread("t-9")
            .created_before(cutoff);

        assert_eq!(
            rendered(&filter),
            "SELECT 1 FROM semantic_memories WHERE conversation_thread = $1 AND created_at < $2"
        );
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("0.8.0"), Some((0, 8)));
        assert_eq!(parse_version("0.7.4"), Some((0, 7)));
        assert_eq!(parse_version("1.0"), Some((1, 0)));
        assert_eq!(parse_version("dev"), None);
        assert!(parse_version("0.7.4").unwrap() < MIN_PGVECTOR_VERSION);
        assert!(parse_version("0.10.1").unwrap() >= MIN_PGVECTOR_VERSION);
    }

    #[test]
    fn test_row_with_unknown_category_is_store_error() {
        let now = Utc::now();
        let row = MemoryRow {
            id: 7,
            content: "x".to_string(),
            embedding: Vector::from(vec![1.0, 0.0]),
            metadata: Json(Map::new()),
            category: "misc".to_string(),
            priority: "medium".to_string(),
            tags: Json(Vec::new()),
            owner_agent: None,
            conversation_thread: None,
            created_at: now,
            updated_at: now,
        };

        let err = MemoryRecord::try_from(row).unwrap_err();
        assert!(matches!(err, MemoryError::Store(_)));
        assert!(err.to_string().contains("record 7"));
    }
}
