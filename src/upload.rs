//! Upload pipeline: quota gate, content-hash dedup, extraction, chunking,
//! vector writes, and linking.
//!
//! Expected outcomes (duplicate, empty file, unsupported type, quota,
//! processing failure) are reported as an [`UploadMessage`]; only
//! authorization and store lookups fail the call itself.

use std::time::Instant;

use brainstore_core::chunk::split_text;
use brainstore_core::hash::{content_hash, file_extension};
use brainstore_core::models::{Segment, SegmentMetadata, UploadMessage};
use brainstore_core::Result;
use uuid::Uuid;

use crate::authorization::{require_role, EDITORS};
use crate::brains;
use crate::context::AppContext;
use crate::extract;
use crate::reaper;
use crate::vectors::create_vectors;

/// An uploaded file held in memory. Never persisted as such.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub size: u64,
    /// Lowercase, with the leading dot; empty when the name has none.
    pub extension: String,
    pub sha1: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        Self {
            extension: file_extension(&name),
            size: bytes.len() as u64,
            sha1: content_hash(&bytes),
            name,
            bytes,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub enable_summarization: bool,
    /// Caller-supplied embedding key. Also raises the quota limit.
    pub credential: Option<String>,
}

/// Upload on behalf of `user_id`, who must be an Editor or Owner.
pub async fn upload_for_user(
    ctx: &AppContext,
    user_id: Uuid,
    brain_id: Uuid,
    file: &UploadedFile,
    options: &UploadOptions,
) -> Result<UploadMessage> {
    require_role(ctx, brain_id, user_id, EDITORS).await?;
    upload_file(ctx, brain_id, file, options).await
}

/// Run the upload pipeline for an already authorized caller.
pub async fn upload_file(
    ctx: &AppContext,
    brain_id: Uuid,
    file: &UploadedFile,
    options: &UploadOptions,
) -> Result<UploadMessage> {
    let start = Instant::now();
    let has_credential = options.credential.is_some();

    let current = brains::brain_size(ctx, brain_id).await?;
    if let Err(exceeded) = ctx
        .config
        .quota
        .policy()
        .check(current, file.size, has_credential)
    {
        tracing::info!(
            brain_id = %brain_id,
            file_name = %file.name,
            current,
            incoming = file.size,
            limit = exceeded.limit,
            "upload rejected by quota"
        );
        return Ok(UploadMessage::error(exceeded.to_string()));
    }

    let message = filter_file(ctx, brain_id, file, options).await?;
    tracing::info!(
        brain_id = %brain_id,
        file_name = %file.name,
        outcome = ?message.kind,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "upload finished"
    );
    Ok(message)
}

async fn filter_file(
    ctx: &AppContext,
    brain_id: Uuid,
    file: &UploadedFile,
    options: &UploadOptions,
) -> Result<UploadMessage> {
    if ctx.store.brain_has_file(brain_id, &file.sha1).await? {
        return Ok(UploadMessage::warning(format!(
            "{} already exists in brain {}.",
            file.name, brain_id
        )));
    }

    if file.size < 1 {
        return Ok(UploadMessage::error(format!(
            "{} is empty.",
            file.name
        )));
    }

    let existing = ctx.store.vector_ids_by_file_sha1(&file.sha1).await?;
    if !existing.is_empty() {
        brains::link_vectors(ctx, brain_id, &existing, &file.sha1).await?;
        tracing::debug!(brain_id = %brain_id, file_name = %file.name, "linked existing vectors");
        return Ok(UploadMessage::success(format!(
            "{} has been uploaded to brain {}.",
            file.name, brain_id
        )));
    }

    if !extract::is_supported(&file.extension) {
        return Ok(UploadMessage::error(format!(
            "{} is not supported.",
            file.name
        )));
    }

    match process_file(ctx, brain_id, file, options).await {
        Ok(vector_count) => {
            tracing::debug!(brain_id = %brain_id, file_name = %file.name, vector_count, "file processed");
            Ok(UploadMessage::success(format!(
                "{} has been uploaded to brain {}.",
                file.name, brain_id
            )))
        }
        Err(e) => {
            tracing::error!(brain_id = %brain_id, file_name = %file.name, error = %e, "file processing failed");
            Ok(UploadMessage::error(format!(
                "There was an error uploading the file {}: {}",
                file.name, e
            )))
        }
    }
}

/// Extract, chunk, embed, persist, and link. Returns the vector count.
async fn process_file(
    ctx: &AppContext,
    brain_id: Uuid,
    file: &UploadedFile,
    options: &UploadOptions,
) -> Result<usize> {
    let text = extract::extract_text(&file.bytes, &file.extension)?;
    let segments = build_segments(ctx, file, &text, options.enable_summarization);
    if segments.is_empty() {
        return Err(brainstore_core::Error::Extraction(format!(
            "no text could be extracted from {}",
            file.name
        )));
    }

    let ids = create_vectors(ctx, &segments, options.credential.as_deref()).await?;
    if let Err(e) = brains::link_vectors(ctx, brain_id, &ids, &file.sha1).await {
        // Unlinked rows would be picked up as a known file by the next upload.
        if let Err(cleanup) = reaper::delete_orphans(ctx, &ids).await {
            tracing::warn!(file_name = %file.name, error = %cleanup, "could not remove unlinked vectors");
        }
        return Err(e);
    }
    Ok(ids.len())
}

/// Chunk `text` and attach the file's provenance to every segment.
pub fn build_segments(
    ctx: &AppContext,
    file: &UploadedFile,
    text: &str,
    enable_summarization: bool,
) -> Vec<Segment> {
    let params = ctx.config.chunking.params();
    let date = chrono::Local::now().format("%Y%m%d").to_string();

    split_text(text, &params)
        .into_iter()
        .filter(|span| !span.text.trim().is_empty())
        .map(|span| Segment {
            content: span.text,
            metadata: SegmentMetadata {
                file_sha1: file.sha1.clone(),
                file_size: file.size,
                file_name: file.name.clone(),
                file_extension: file.extension.clone(),
                chunk_size: params.chunk_size,
                chunk_overlap: params.chunk_overlap,
                date: date.clone(),
                summarization: enable_summarization,
                file_url: None,
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::Config;
    use crate::embedding::DisabledEmbedder;

    #[test]
    fn test_uploaded_file_identity() {
        let file = UploadedFile::new("Notes.MD", b"hello".to_vec());
        assert_eq!(file.size, 5);
        assert_eq!(file.extension, ".md");
        assert_eq!(file.sha1, content_hash(b"hello"));
    }

    #[test]
    fn test_build_segments_carries_metadata() {
        let mut config = Config::minimal("unused.sqlite");
        config.chunking.chunk_size = 5;
        let ctx = AppContext::in_memory(config, Arc::new(DisabledEmbedder));
        let file = UploadedFile::new("a.txt", b"unused".to_vec());
        let text = "one two three four five six seven eight nine ten eleven twelve";

        let segments = build_segments(&ctx, &file, text, true);
        assert!(segments.len() > 1);
        for s in &segments {
            assert_eq!(s.metadata.file_name, "a.txt");
            assert_eq!(s.metadata.file_extension, ".txt");
            assert_eq!(s.metadata.chunk_size, 5);
            assert_eq!(s.metadata.date.len(), 8);
            assert!(s.metadata.summarization);
        }
    }

    #[test]
    fn test_whitespace_only_text_yields_no_segments() {
        let ctx = AppContext::in_memory(Config::minimal("unused.sqlite"), Arc::new(DisabledEmbedder));
        let file = UploadedFile::new("blank.txt", b"   \n\n  ".to_vec());
        assert!(build_segments(&ctx, &file, "   \n\n  ", false).is_empty());
    }
}
