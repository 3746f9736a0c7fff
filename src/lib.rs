//! # brainstore
//!
//! Document ingestion backend for "brains": named, access-controlled
//! collections of embedded text segments.
//!
//! Uploaded files are deduplicated by content hash, chunked, embedded, and
//! persisted once as vectors. Brains reference vectors through link rows, so
//! the same file uploaded to several brains is stored a single time. Removing
//! a file from a brain drops its links and reaps the vectors no brain still
//! references.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────────┐
//! │  Upload   │──▶│ Quota + dedup │──▶│ Extract + chunk   │
//! └──────────┘   └──────┬───────┘   └────────┬─────────┘
//!                       │ known hash          ▼
//!                       │            ┌──────────────────┐
//!                       │            │ Embed + vectors   │
//!                       ▼            └────────┬─────────┘
//!                 ┌──────────────────────────────────────┐
//!                 │  brains_vectors links  │  SQLite      │
//!                 └──────────────────────────────────────┘
//!                       ▲                      ▲
//!                 ┌──────────┐           ┌──────────┐
//!                 │   CLI    │           │   HTTP   │
//!                 └──────────┘           └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! brainstore init
//! brainstore brain create --user <uuid> --name notes
//! brainstore upload ./report.pdf --brain <uuid>
//! brainstore files --brain <uuid>
//! brainstore serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`context`] | Shared application context |
//! | [`authorization`] | Role checks on brains |
//! | [`brains`] | Brains, memberships, links, size accounting |
//! | [`upload`] | Upload pipeline |
//! | [`extract`] | Text extraction per file type |
//! | [`vectors`] | Vector writes and the unique-files aggregator |
//! | [`reaper`] | Orphan vector cleanup |
//! | [`explore`] | File listing, removal, download |
//! | [`embedding`] | Embedding providers |
//! | [`retry`] | Retry of idempotent store calls |
//! | [`server`] | JSON HTTP API |
//! | [`sqlite_store`] | SQLite [`Store`](brainstore_core::store::Store) |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`logging`] | Tracing subscriber setup |

pub mod authorization;
pub mod brains;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod explore;
pub mod extract;
pub mod logging;
pub mod migrate;
pub mod reaper;
pub mod retry;
pub mod server;
pub mod sqlite_store;
pub mod upload;
pub mod vectors;
