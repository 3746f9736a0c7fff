//! Vector writer and unique-files aggregator.
//!
//! [`create_vectors`] turns segments into persisted vector rows;
//! [`unique_files_from_vector_ids`] collapses a brain's vector ids into the
//! distinct `(name, size)` files behind them.

use std::collections::HashSet;
use std::time::Instant;

use brainstore_core::models::{FileSummary, NewVector, Segment};
use brainstore_core::{Error, Result};
use futures::{StreamExt, TryStreamExt};
use uuid::Uuid;

use crate::context::AppContext;
use crate::retry::retry_idempotent;

/// Embed and persist `segments`, returning one vector id per segment in
/// input order.
///
/// Every batch is embedded before anything is written, and the rows go to
/// the store in a single insert. A failure at any point leaves no vector
/// behind. Ids are assigned here, so a retried insert after a transient
/// failure cannot create duplicate rows. When the embedder reports zero
/// dimensions (store-only mode) segments are stored without embeddings.
pub async fn create_vectors(
    ctx: &AppContext,
    segments: &[Segment],
    credential: Option<&str>,
) -> Result<Vec<Uuid>> {
    if segments.is_empty() {
        return Ok(Vec::new());
    }
    let start = Instant::now();
    let store_only = ctx.embedder.dims() == 0;
    let batch_size = ctx.config.embedding.batch_size.max(1);
    let mut rows: Vec<NewVector> = Vec::with_capacity(segments.len());

    for batch in segments.chunks(batch_size) {
        let embeddings: Vec<Option<Vec<f32>>> = if store_only {
            vec![None; batch.len()]
        } else {
            let texts: Vec<String> = batch.iter().map(|s| s.content.clone()).collect();
            let vectors = ctx.embedder.embed(&texts, credential).await?;
            if vectors.len() != batch.len() {
                return Err(Error::embedding(
                    format!(
                        "embedder returned {} vectors for {} segments",
                        vectors.len(),
                        batch.len()
                    ),
                    false,
                ));
            }
            vectors.into_iter().map(Some).collect()
        };

        rows.extend(
            batch
                .iter()
                .zip(embeddings)
                .map(|(segment, embedding)| NewVector {
                    id: Uuid::new_v4(),
                    content: segment.content.clone(),
                    metadata: segment.metadata.clone(),
                    embedding,
                }),
        );
    }

    let store = ctx.store.as_ref();
    let rows_ref = rows.as_slice();
    retry_idempotent(ctx.config.store.retry_policy(), "insert_vectors", move || {
        store.insert_vectors(rows_ref)
    })
    .await?;
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

    tracing::debug!(
        vector_count = ids.len(),
        store_only,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "vectors written"
    );
    Ok(ids)
}

/// Distinct `(name, size)` files behind `vector_ids`.
///
/// Ids are resolved in batches of `store.lookup_batch_size`, at most
/// `store.max_concurrency` batches at a time. Output order is unspecified.
pub async fn unique_files_from_vector_ids(
    ctx: &AppContext,
    vector_ids: &[Uuid],
) -> Result<Vec<FileSummary>> {
    let batch_size = ctx.config.store.lookup_batch_size.max(1);
    let concurrency = ctx.config.store.max_concurrency.max(1);
    let store = ctx.store.as_ref();

    let owned: Vec<Vec<Uuid>> = vector_ids.chunks(batch_size).map(<[Uuid]>::to_vec).collect();

    let batches: Vec<Vec<FileSummary>> = futures::stream::iter(owned)
        .map(|batch: Vec<Uuid>| async move { store.file_summaries(&batch).await })
        .buffer_unordered(concurrency)
        .try_collect()
        .await?;

    let mut seen = HashSet::new();
    Ok(batches
        .into_iter()
        .flatten()
        .filter(|file| seen.insert(file.clone()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use brainstore_core::embedding::Embedder;
    use brainstore_core::models::SegmentMetadata;
    use brainstore_core::store::Store;

    use crate::config::Config;
    use crate::embedding::DisabledEmbedder;

    struct CountingEmbedder;

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String], _credential: Option<&str>) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    fn segment(name: &str, size: u64, content: &str) -> Segment {
        Segment {
            content: content.to_string(),
            metadata: SegmentMetadata {
                file_sha1: format!("sha-{}", name),
                file_size: size,
                file_name: name.to_string(),
                file_extension: ".txt".into(),
                chunk_size: 500,
                chunk_overlap: 0,
                date: "20260101".into(),
                summarization: false,
                file_url: None,
            },
        }
    }

    fn ctx(embedder: Arc<dyn Embedder>) -> AppContext {
        let mut config = Config::minimal("unused.sqlite");
        config.embedding.batch_size = 2;
        config.store.lookup_batch_size = 2;
        AppContext::in_memory(config, embedder)
    }

    #[tokio::test]
    async fn test_create_vectors_preserves_order() {
        let ctx = ctx(Arc::new(CountingEmbedder));
        let segments: Vec<Segment> = (0..5)
            .map(|i| segment("a.txt", 10, &"x".repeat(i + 1)))
            .collect();
        let ids = create_vectors(&ctx, &segments, None).await.unwrap();
        assert_eq!(ids.len(), 5);

        let stored = ctx.store.vectors_by_file_name("a.txt").await.unwrap();
        let stored_ids: Vec<Uuid> = stored.iter().map(|v| v.id).collect();
        assert_eq!(stored_ids, ids);
        assert_eq!(stored[3].embedding, Some(vec![4.0, 1.0]));
    }

    #[tokio::test]
    async fn test_store_only_mode_skips_embedding() {
        let ctx = ctx(Arc::new(DisabledEmbedder));
        let ids = create_vectors(&ctx, &[segment("a.txt", 10, "hello")], None)
            .await
            .unwrap();
        assert_eq!(ids.len(), 1);
        let stored = ctx.store.vectors_by_file_name("a.txt").await.unwrap();
        assert_eq!(stored[0].embedding, None);
    }

    #[tokio::test]
    async fn test_unique_files_deduplicates_name_and_size() {
        let ctx = ctx(Arc::new(DisabledEmbedder));
        let mut segments = Vec::new();
        for _ in 0..4 {
            segments.push(segment("a.txt", 10, "a"));
        }
        segments.push(segment("b.txt", 20, "b"));
        segments.push(segment("b.txt", 20, "b2"));
        let ids = create_vectors(&ctx, &segments, None).await.unwrap();

        let mut files = unique_files_from_vector_ids(&ctx, &ids).await.unwrap();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            files,
            vec![
                FileSummary { name: "a.txt".into(), size: 10 },
                FileSummary { name: "b.txt".into(), size: 20 },
            ]
        );
    }

    struct FailsAfterFirstBatch(std::sync::atomic::AtomicBool);

    #[async_trait]
    impl Embedder for FailsAfterFirstBatch {
        fn model_name(&self) -> &str {
            "fails-after-first-batch"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String], credential: Option<&str>) -> Result<Vec<Vec<f32>>> {
            if self.0.swap(true, std::sync::atomic::Ordering::SeqCst) {
                return Err(Error::embedding("quota exceeded", false));
            }
            CountingEmbedder.embed(texts, credential).await
        }
    }

    #[tokio::test]
    async fn test_failed_batch_writes_nothing() {
        let ctx = ctx(Arc::new(FailsAfterFirstBatch(Default::default())));
        let segments: Vec<Segment> = (0..5).map(|i| segment("a.txt", 10, &i.to_string())).collect();
        assert!(create_vectors(&ctx, &segments, None).await.is_err());
        assert!(ctx.store.vector_ids_by_file_sha1("sha-a.txt").await.unwrap().is_empty());
    }

    #[test]
    fn test_futures_are_send() {
        fn assert_send<T: Send>(_: T) {}
        let ctx = ctx(Arc::new(DisabledEmbedder));
        assert_send(create_vectors(&ctx, &[], None));
        assert_send(unique_files_from_vector_ids(&ctx, &[]));
    }

    #[tokio::test]
    async fn test_unique_files_of_nothing() {
        let ctx = ctx(Arc::new(DisabledEmbedder));
        assert!(unique_files_from_vector_ids(&ctx, &[]).await.unwrap().is_empty());
    }
}
