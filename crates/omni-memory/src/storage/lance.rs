//! Embedded LanceDB record store
//!
//! Vector queries always use cosine distance. Once `build_vector_index` has
//! trained an IVF-PQ index, Lance's `_distance` comes from compressed codes,
//! so candidates are re-ranked against the full vectors and every reported
//! similarity is recomputed exactly from the stored embedding.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray, TimestampMicrosecondArray,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef, TimeUnit};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::TryStreamExt;
use lancedb::DistanceType;
use lancedb::Table;
use lancedb::connection::Connection;
use lancedb::index::Index;
use lancedb::index::vector::IvfPqIndexBuilder;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use serde_json::{Map, Value};

use crate::error::{MemoryError, Result};
use crate::memory::similarity::cosine_similarity;
use crate::memory::types::{MemoryRecord, NewMemory, ScoredMemory};
use crate::storage::filter::MemoryFilter;
use crate::storage::{MEMORIES_TABLE, RecordStore, ensure_dimension};

/// IVF-PQ needs enough rows to train its partitions
const MIN_ROWS_FOR_INDEX: usize = 256;

/// Candidates fetched per requested row and re-ranked on full vectors
/// when an IVF-PQ index is in use
const REFINE_FACTOR: u32 = 10;

/// Embedded LanceDB record store.
///
/// Ids come from an in-process counter seeded from the largest stored id
/// when the table is opened, so a data directory must only be written by
/// one process at a time.
pub struct LanceStore {
    connection: Connection,
    table: Table,
    schema: SchemaRef,
    dimension: usize,
    next_id: AtomicI64,
}

impl LanceStore {
    /// Connect to the database at `path`, creating or opening the memory
    /// table. An existing table with a different embedding width is
    /// rejected.
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        let uri = path
            .to_str()
            .ok_or_else(|| MemoryError::Store("Invalid path encoding".to_string()))?;

        let connection = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| MemoryError::Store(format!("Failed to connect to LanceDB: {e}")))?;

        let schema = Self::memories_schema(dimension)?;

        let table = if Self::table_exists(&connection).await? {
            tracing::debug!("Opening existing {MEMORIES_TABLE} table");
            let table = connection
                .open_table(MEMORIES_TABLE)
                .execute()
                .await
                .map_err(|e| MemoryError::Store(format!("Failed to open memories table: {e}")))?;
            Self::check_existing_dimension(&table, dimension).await?;
            table
        } else {
            tracing::info!("Creating {MEMORIES_TABLE} table ({dimension} dimensions)");
            let batch = RecordBatch::new_empty(schema.clone());
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema.clone());
            connection
                .create_table(MEMORIES_TABLE, Box::new(batches))
                .execute()
                .await
                .map_err(|e| {
                    MemoryError::Store(format!("Failed to create memories table: {e}"))
                })?
        };

        let max_id = Self::max_id(&table).await?;

        Ok(Self {
            connection,
            table,
            schema,
            dimension,
            next_id: AtomicI64::new(max_id + 1),
        })
    }

    fn memories_schema(dimension: usize) -> Result<SchemaRef> {
        let width = i32::try_from(dimension).map_err(|_| {
            MemoryError::Config(format!("Embedding dimension {dimension} is too large"))
        })?;

        Ok(Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("content", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), width),
                false,
            ),
            Field::new("metadata", DataType::Utf8, false),
            Field::new("category", DataType::Utf8, false),
            Field::new("priority", DataType::Utf8, false),
            Field::new("tags", DataType::Utf8, false),
            Field::new("owner_agent", DataType::Utf8, true),
            Field::new("conversation_thread", DataType::Utf8, true),
            Field::new(
                "created_at",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
            Field::new(
                "updated_at",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
        ])))
    }

    async fn table_exists(connection: &Connection) -> Result<bool> {
        let names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| MemoryError::Store(format!("Failed to list tables: {e}")))?;

        Ok(names.iter().any(|n| n == MEMORIES_TABLE))
    }

    async fn check_existing_dimension(table: &Table, dimension: usize) -> Result<()> {
        let schema = table
            .schema()
            .await
            .map_err(|e| MemoryError::Store(format!("Failed to read table schema: {e}")))?;

        let field = schema
            .field_with_name("embedding")
            .map_err(|e| MemoryError::Store(format!("Memories table has no embedding: {e}")))?;

        match field.data_type() {
            DataType::FixedSizeList(_, width) if *width as usize == dimension => Ok(()),
            DataType::FixedSizeList(_, width) => Err(MemoryError::Config(format!(
                "Memories table stores {width}-dimensional embeddings but the embedding \
                 provider is configured for {dimension}; mixing models in one collection \
                 is not supported"
            ))),
            other => Err(MemoryError::Store(format!(
                "Unexpected embedding column type: {other}"
            ))),
        }
    }

    async fn max_id(table: &Table) -> Result<i64> {
        let batches = Self::collect(
            table
                .query()
                .select(Select::columns(&["id"]))
                .execute()
                .await
                .map_err(|e| MemoryError::Store(format!("Failed to scan ids: {e}")))?,
        )
        .await?;

        let mut max_id = 0;
        for batch in &batches {
            let ids = column::<Int64Array>(batch, "id")?;
            for row in 0..ids.len() {
                max_id = max_id.max(ids.value(row));
            }
        }
        Ok(max_id)
    }

    async fn collect(stream: lancedb::arrow::SendableRecordBatchStream) -> Result<Vec<RecordBatch>> {
        stream
            .try_collect()
            .await
            .map_err(|e| MemoryError::Store(format!("Failed to collect query results: {e}")))
    }

    /// Convert records to an Arrow RecordBatch
    fn records_to_batch(&self, records: &[MemoryRecord]) -> Result<RecordBatch> {
        let width = self.dimension as i32;

        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        let contents: Vec<&str> = records.iter().map(|r| r.content.as_str()).collect();
        let embeddings: Vec<Option<Vec<Option<f32>>>> = records
            .iter()
            .map(|r| Some(r.embedding.iter().map(|&v| Some(v)).collect()))
            .collect();

        let metadata = records
            .iter()
            .map(|r| serde_json::to_string(&r.metadata))
            .collect::<std::result::Result<Vec<String>, _>>()?;
        let tags = records
            .iter()
            .map(|r| serde_json::to_string(&r.tags))
            .collect::<std::result::Result<Vec<String>, _>>()?;

        let categories: Vec<&str> = records.iter().map(|r| r.category.as_str()).collect();
        let priorities: Vec<&str> = records.iter().map(|r| r.priority.as_str()).collect();
        let owners: Vec<Option<&str>> = records.iter().map(|r| r.owner_agent.as_deref()).collect();
        let threads: Vec<Option<&str>> = records
            .iter()
            .map(|r| r.conversation_thread.as_deref())
            .collect();
        let created_at: Vec<i64> = records.iter().map(|r| r.created_at.timestamp_micros()).collect();
        let updated_at: Vec<i64> = records.iter().map(|r| r.updated_at.timestamp_micros()).collect();

        RecordBatch::try_new(
            self.schema.clone(),
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(StringArray::from(contents)),
                Arc::new(FixedSizeListArray::from_iter_primitive::<
                    arrow_array::types::Float32Type,
                    _,
                    _,
                >(embeddings, width)),
                Arc::new(StringArray::from(metadata)),
                Arc::new(StringArray::from(categories)),
                Arc::new(StringArray::from(priorities)),
                Arc::new(StringArray::from(tags)),
                Arc::new(StringArray::from(owners)),
                Arc::new(StringArray::from(threads)),
                Arc::new(TimestampMicrosecondArray::from(created_at).with_timezone("UTC")),
                Arc::new(TimestampMicrosecondArray::from(updated_at).with_timezone("UTC")),
            ],
        )
        .map_err(|e| MemoryError::Store(format!("Failed to create RecordBatch: {e}")))
    }

    /// Convert an Arrow RecordBatch row back to a record
    fn batch_to_record(batch: &RecordBatch, row: usize) -> Result<MemoryRecord> {
        let id = column::<Int64Array>(batch, "id")?.value(row);
        let content = column::<StringArray>(batch, "content")?.value(row).to_string();

        let embedding_list = column::<FixedSizeListArray>(batch, "embedding")?.value(row);
        let embedding = embedding_list
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| MemoryError::Store("Failed to get embedding values".to_string()))?
            .values()
            .to_vec();

        let metadata: Map<String, Value> =
            serde_json::from_str(column::<StringArray>(batch, "metadata")?.value(row))?;
        let tags: Vec<String> = serde_json::from_str(column::<StringArray>(batch, "tags")?.value(row))?;

        let category = column::<StringArray>(batch, "category")?
            .value(row)
            .parse()
            .map_err(|e| MemoryError::Store(format!("Corrupt category in record {id}: {e}")))?;
        let priority = column::<StringArray>(batch, "priority")?
            .value(row)
            .parse()
            .map_err(|e| MemoryError::Store(format!("Corrupt priority in record {id}: {e}")))?;

        let owner_agent = optional_string(column::<StringArray>(batch, "owner_agent")?, row);
        let conversation_thread =
            optional_string(column::<StringArray>(batch, "conversation_thread")?, row);

        let created_at = timestamp(column::<TimestampMicrosecondArray>(batch, "created_at")?, row)?;
        let updated_at = timestamp(column::<TimestampMicrosecondArray>(batch, "updated_at")?, row)?;

        Ok(MemoryRecord {
            id,
            content,
            embedding,
            metadata,
            category,
            priority,
            tags,
            owner_agent,
            conversation_thread,
            created_at,
            updated_at,
        })
    }

    fn batches_to_records(batches: &[RecordBatch]) -> Result<Vec<MemoryRecord>> {
        let mut records = Vec::new();
        for batch in batches {
            for row in 0..batch.num_rows() {
                records.push(Self::batch_to_record(batch, row)?);
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl RecordStore for LanceStore {
    fn name(&self) -> &'static str {
        "lancedb"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn insert(&self, memory: NewMemory) -> Result<MemoryRecord> {
        ensure_dimension(self.dimension, &memory.embedding)?;

        let now = now_micros();
        let record = MemoryRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            content: memory.content,
            embedding: memory.embedding,
            metadata: memory.metadata,
            category: memory.category,
            priority: memory.priority,
            tags: memory.tags,
            owner_agent: memory.owner_agent,
            conversation_thread: memory.conversation_thread,
            created_at: now,
            updated_at: now,
        };

        let batch = self.records_to_batch(std::slice::from_ref(&record))?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], self.schema.clone());

        self.table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| MemoryError::Store(format!("Failed to insert memory: {e}")))?;

        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<Option<MemoryRecord>> {
        let stream = self
            .table
            .query()
            .only_if(format!("id = {id}"))
            .execute()
            .await
            .map_err(|e| MemoryError::Store(format!("Failed to query memory: {e}")))?;

        let batches = Self::collect(stream).await?;
        Ok(Self::batches_to_records(&batches)?.into_iter().next())
    }

    async fn nearest(
        &self,
        query: &[f32],
        filter: &MemoryFilter,
        limit: usize,
    ) -> Result<Vec<ScoredMemory>> {
        ensure_dimension(self.dimension, query)?;

        let mut vector_query = self
            .table
            .query()
            .nearest_to(query)
            .map_err(|e| MemoryError::Store(format!("Failed to create vector query: {e}")))?
            .distance_type(DistanceType::Cosine)
            .refine_factor(REFINE_FACTOR)
            .limit(limit);

        if let Some(sql_filter) = filter.to_sql_clause() {
            vector_query = vector_query.only_if(sql_filter);
        }

        let stream = vector_query
            .execute()
            .await
            .map_err(|e| MemoryError::Store(format!("Failed to execute search: {e}")))?;
        let batches = Self::collect(stream).await?;

        let mut results = Self::batches_to_records(&batches)?
            .into_iter()
            .map(|record| {
                let similarity = cosine_similarity(query, &record.embedding)?;
                Ok(ScoredMemory { record, similarity })
            })
            .collect::<Result<Vec<_>>>()?;

        results.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| b.record.created_at.cmp(&a.record.created_at))
                .then_with(|| b.record.id.cmp(&a.record.id))
        });
        Ok(results)
    }

    async fn recent(&self, filter: &MemoryFilter, window: usize) -> Result<Vec<MemoryRecord>> {
        if window == 0 {
            return Ok(Vec::new());
        }

        // LanceDB has no ORDER BY: rank ids by recency first, then load only
        // the rows inside the window.
        let mut key_query = self.table.query().select(Select::columns(&["id", "created_at"]));
        if let Some(sql_filter) = filter.to_sql_clause() {
            key_query = key_query.only_if(sql_filter);
        }
        let key_batches = Self::collect(
            key_query
                .execute()
                .await
                .map_err(|e| MemoryError::Store(format!("Failed to scan candidates: {e}")))?,
        )
        .await?;

        let mut keys: Vec<(i64, i64)> = Vec::new();
        for batch in &key_batches {
            let ids = column::<Int64Array>(batch, "id")?;
            let created = column::<TimestampMicrosecondArray>(batch, "created_at")?;
            for row in 0..batch.num_rows() {
                keys.push((created.value(row), ids.value(row)));
            }
        }
        keys.sort_unstable_by(|a, b| b.cmp(a));
        keys.truncate(window);

        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let id_list = keys
            .iter()
            .map(|(_, id)| id.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        let stream = self
            .table
            .query()
            .only_if(format!("id IN ({id_list})"))
            .execute()
            .await
            .map_err(|e| MemoryError::Store(format!("Failed to load candidates: {e}")))?;
        let batches = Self::collect(stream).await?;

        let position: HashMap<i64, usize> = keys
            .iter()
            .enumerate()
            .map(|(pos, (_, id))| (*id, pos))
            .collect();
        let mut records = Self::batches_to_records(&batches)?;
        records.sort_by_key(|r| position.get(&r.id).copied().unwrap_or(usize::MAX));

        Ok(records)
    }

    async fn count(&self, filter: &MemoryFilter) -> Result<usize> {
        self.table
            .count_rows(filter.to_sql_clause())
            .await
            .map_err(|e| MemoryError::Store(format!("Failed to count memories: {e}")))
    }

    async fn delete_matching(&self, filter: &MemoryFilter) -> Result<usize> {
        let predicate = filter.to_sql_clause().ok_or_else(|| {
            MemoryError::Validation("Refusing to delete without a filter".to_string())
        })?;

        let matching = self.count(filter).await?;
        if matching == 0 {
            return Ok(0);
        }

        self.table
            .delete(&predicate)
            .await
            .map_err(|e| MemoryError::Store(format!("Failed to delete memories: {e}")))?;

        Ok(matching)
    }

    async fn build_vector_index(&self) -> Result<bool> {
        let row_count = self.count(&MemoryFilter::default()).await?;

        if row_count < MIN_ROWS_FOR_INDEX {
            tracing::info!(
                "Skipping vector index: {row_count} rows, need at least {MIN_ROWS_FOR_INDEX}"
            );
            return Ok(false);
        }

        let ivf_pq = IvfPqIndexBuilder::default().distance_type(DistanceType::Cosine);

        self.table
            .create_index(&["embedding"], Index::IvfPq(ivf_pq))
            .execute()
            .await
            .map_err(|e| MemoryError::Store(format!("Failed to create vector index: {e}")))?;

        Ok(true)
    }

    /// LanceDB connections hold no server resources, so there is nothing to release
    async fn close(&self) -> Result<()> {
        tracing::debug!("Closing LanceDB connection to {}", self.connection.uri());
        Ok(())
    }
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| MemoryError::Store(format!("Failed to get {name} column")))
}

fn optional_string(array: &StringArray, row: usize) -> Option<String> {
    if array.is_null(row) {
        None
    } else {
        Some(array.value(row).to_string())
    }
}

fn timestamp(array: &TimestampMicrosecondArray, row: usize) -> Result<DateTime<Utc>> {
    Utc.timestamp_micros(array.value(row))
        .single()
        .ok_or_else(|| MemoryError::Store("Failed to parse timestamp".to_string()))
}

/// Current time truncated to the microsecond precision the table stores
fn now_micros() -> DateTime<Utc> {
    let now = Utc::now();
    Utc.timestamp_micros(now.timestamp_micros())
        .single()
        .unwrap_or(now)
}
