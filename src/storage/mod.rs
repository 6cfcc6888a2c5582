//! storage layer for sbac
//!
//! Two durable stores sit under the metadata directory: the object store
//! (one file per blob, keyed by content digest) and a relational metadata
//! store holding tracking rows, commits and baselines. The repository
//! controller composes them and is the only caller.
//!
//!  # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Repository                           │
//! │    (init, add, status, diff, commit, baseline, checkout)    │
//! └─────────────────────────────────────────────────────────────┘
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │ ObjectStore │       │  Tracking   │       │   History   │──┐
//!  │   (blobs)   │       │   (files)   │       │  (commits)  │  │
//!  └─────────────┘       └─────────────┘       └─────────────┘  │
//!                               │                     │         ▼
//!                               └──────────┬──────────┘   ┌───────────┐
//!                                          ▼              │ Reference │
//!                                   ┌─────────────┐       │(baselines)│
//!                                   │MetadataStore│◄──────└───────────┘
//!                                   └─────────────┘
//! ```
//!
//! The relational stores are unit structs whose functions take a
//! `&rusqlite::Connection`, so a caller can run several of them inside
//! one [`MetadataStore::with_transaction`] call.

mod error;
mod history;
mod objects;
mod refs;
pub mod schema;
mod store;
mod tracking;
mod types;

// Re-export public API
pub use error::{StorageError, StorageResult};
pub use history::{Commit, CommitEntry, HistoryStore};
pub use objects::{hash_bytes, hash_reader, ObjectStore, DEFAULT_CHUNK_SIZE};
pub use refs::{Baseline, ReferenceStore};
pub use store::MetadataStore;
pub use tracking::{TrackedFile, TrackingTable};
pub use types::{BaselineName, CommitId, Digest, InvalidNameError, RepoPath};
