//! Embedder trait and vector serialization helpers.
//!
//! Defines the [`Embedder`] trait that all embedding backends implement,
//! plus pure helpers for storing vectors as BLOBs.
//!
//! Concrete providers (OpenAI, Ollama, disabled) live in the `brainstore`
//! app crate.

use async_trait::async_trait;

use crate::error::Result;

/// An embedding backend.
///
/// `embed` returns one vector per input text, in input order. `credential`
/// is a caller-supplied API key that replaces the server-side one for this
/// call only.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-ada-002"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality, `0` when disabled.
    fn dims(&self) -> usize;

    async fn embed(&self, texts: &[String], credential: Option<&str>) -> Result<Vec<Vec<f32>>>;
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use brainstore_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a BLOB written by [`vec_to_blob`]. Trailing bytes that do not
/// form a whole `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
