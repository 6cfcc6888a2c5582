//! Repository controller.
//!
//! [`Repository`] ties the object store, the metadata database and the
//! working tree together and exposes the user-facing operations:
//!
//! ```text
//!   init ─► add ─► commit ─► baseline
//!            │       │          │
//!            ▼       ▼          ▼
//!         status   history   checkout
//!          diff
//! ```
//!
//! Multi-relation updates (commit, baseline, checkout, init) each run in
//! one metadata transaction.

mod config;
mod controller;
mod error;
mod report;

pub use config::{RepoConfig, StoreBackend};
pub use controller::{Repository, MIN_PREFIX_LEN};
pub use error::{RepoError, RepoResult};
pub use report::{CheckoutReport, FileDiff, StatusReport};
