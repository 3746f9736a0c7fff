//! # brainstore core
//!
//! Shared logic for brainstore: data models, error type, chunking, content
//! hashing, quota math, and the [`Store`](store::Store) and
//! [`Embedder`](embedding::Embedder) abstractions the ingestion pipeline is
//! written against.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. The SQLite
//! store, the embedding providers and the HTTP surface live in the
//! `brainstore` application crate.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod hash;
pub mod models;
pub mod quota;
pub mod store;

pub use error::{Error, Result};
