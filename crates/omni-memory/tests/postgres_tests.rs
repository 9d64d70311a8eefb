//! Integration tests for the pgvector store
//!
//! Need a Postgres server with the `vector` extension available. Set
//! `DATABASE_URL` and run with `--ignored`. Each test works in its own
//! schema so runs do not interfere.

use omni_memory::MemoryError;
use omni_memory::memory::{Category, NewMemory, Priority};
use omni_memory::storage::{MemoryFilter, PgVectorStore, RecordStore};
use sqlx::postgres::PgPoolOptions;

const DIM: usize = 3;

/// Test fixture: store inside a fresh schema, or None without DATABASE_URL
async fn create_test_store(schema: &str) -> Option<PgVectorStore> {
    create_test_store_with(schema, false).await
}

/// Test fixture: as `create_test_store`, optionally steering the planner
/// onto the HNSW index even for small tables
async fn create_test_store_with(schema: &str, force_index: bool) -> Option<PgVectorStore> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let schema = schema.to_string();

    let setup = PgPoolOptions::new().max_connections(1).connect(&url).await.unwrap();
    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(&setup)
        .await
        .unwrap();
    sqlx::query(&format!("DROP SCHEMA IF EXISTS {schema} CASCADE"))
        .execute(&setup)
        .await
        .unwrap();
    sqlx::query(&format!("CREATE SCHEMA {schema}"))
        .execute(&setup)
        .await
        .unwrap();
    setup.close().await;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .after_connect(move |conn, _meta| {
            let schema = schema.clone();
            Box::pin(async move {
                sqlx::query(&format!("SET search_path TO {schema}, public"))
                    .execute(&mut *conn)
                    .await?;
                if force_index {
                    sqlx::query("SET enable_seqscan = off")
                        .execute(&mut *conn)
                        .await?;
                }
                Ok(())
            })
        })
        .connect(&url)
        .await
        .unwrap();

    Some(PgVectorStore::from_pool(pool, DIM).await.unwrap())
}

fn memory(content: &str, embedding: [f32; DIM], category: Category) -> NewMemory {
    NewMemory::new(content, embedding.to_vec()).with_category(category)
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at Postgres with pgvector"]
async fn test_insert_assigns_id_and_timestamps() {
    let Some(store) = create_test_store("omni_pg_insert").await else {
        return;
    };

    let first = store
        .insert(
            memory("first", [1.0, 0.0, 0.0], Category::Coding)
                .with_priority(Priority::Critical)
                .with_tags(vec!["a".to_string()])
                .with_owner_agent("coder"),
        )
        .await
        .unwrap();
    let second = store
        .insert(memory("second", [0.0, 1.0, 0.0], Category::Email))
        .await
        .unwrap();

    assert!(second.id > first.id);
    assert_eq!(first.created_at, first.updated_at);

    let fetched = store.get(first.id).await.unwrap().unwrap();
    assert_eq!(fetched.content, "first");
    assert_eq!(fetched.priority, Priority::Critical);
    assert_eq!(fetched.tags, vec!["a".to_string()]);
    assert_eq!(fetched.owner_agent.as_deref(), Some("coder"));
    assert_eq!(fetched.embedding, vec![1.0, 0.0, 0.0]);

    store.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at Postgres with pgvector"]
async fn test_nearest_uses_cosine_similarity() {
    let Some(store) = create_test_store("omni_pg_nearest").await else {
        return;
    };

    store
        .insert(memory("x axis", [1.0, 0.0, 0.0], Category::Coding))
        .await
        .unwrap();
    store
        .insert(memory("diagonal", [1.0, 1.0, 0.0], Category::Coding))
        .await
        .unwrap();
    store
        .insert(memory("z axis", [0.0, 0.0, 1.0], Category::Personal))
        .await
        .unwrap();

    // Magnitude does not matter for cosine
    let results = store
        .nearest(&[5.0, 0.0, 0.0], &MemoryFilter::new(), 3)
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].record.content, "x axis");
    assert!((results[0].similarity - 1.0).abs() < 1e-5);
    assert!((results[1].similarity - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-5);
    assert!(results[2].similarity.abs() < 1e-5);

    let filtered = store
        .nearest(
            &[1.0, 0.0, 0.0],
            &MemoryFilter::new().with_category(Category::Personal),
            3,
        )
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].record.content, "z axis");

    store.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at Postgres with pgvector"]
async fn test_selective_filter_still_fills_limit() {
    let Some(store) = create_test_store_with("omni_pg_selective", true).await else {
        return;
    };

    // Far more unfiltered neighbours than one HNSW candidate list holds
    for i in 0..200 {
        store
            .insert(memory(
                &format!("general {i}"),
                [1.0, i as f32 * 0.001, 0.0],
                Category::General,
            ))
            .await
            .unwrap();
    }
    for i in 0..3 {
        store
            .insert(memory(
                &format!("personal {i}"),
                [0.5, 0.0, 1.0 + i as f32],
                Category::Personal,
            ))
            .await
            .unwrap();
    }

    let results = store
        .nearest(
            &[1.0, 0.0, 0.0],
            &MemoryFilter::new().with_category(Category::Personal),
            3,
        )
        .await
        .unwrap();

    let contents: Vec<&str> = results.iter().map(|r| r.record.content.as_str()).collect();
    assert_eq!(contents, vec!["personal 0", "personal 1", "personal 2"]);
    assert!(results.iter().all(|r| r.similarity > 0.0));

    store.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at Postgres with pgvector"]
async fn test_recent_count_and_purge() {
    let Some(store) = create_test_store("omni_pg_recent").await else {
        return;
    };

    for i in 0..4 {
        store
            .insert(memory(&format!("note {i}"), [1.0, i as f32, 0.0], Category::General))
            .await
            .unwrap();
    }

    let recent = store.recent(&MemoryFilter::new(), 2).await.unwrap();
    let contents: Vec<&str> = recent.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(contents, vec!["note 3", "note 2"]);

    assert_eq!(store.count(&MemoryFilter::new()).await.unwrap(), 4);

    let err = store.delete_matching(&MemoryFilter::new()).await.unwrap_err();
    assert!(matches!(err, MemoryError::Validation(_)));

    let removed = store
        .delete_matching(&MemoryFilter::new().created_before(chrono::Utc::now()))
        .await
        .unwrap();
    assert_eq!(removed, 4);
    assert_eq!(store.count(&MemoryFilter::new()).await.unwrap(), 0);

    store.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at Postgres with pgvector"]
async fn test_wrong_dimension_rejected() {
    let Some(store) = create_test_store("omni_pg_dimension").await else {
        return;
    };

    let err = store
        .insert(NewMemory::new("short", vec![1.0, 0.0]))
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::Validation(_)));
    assert_eq!(store.count(&MemoryFilter::new()).await.unwrap(), 0);

    store.close().await.unwrap();
}
