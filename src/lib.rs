//! sbac - Snapshot-Based Version Control
//!
//! A minimal local version control system for a single working tree. File
//! contents live in a content-addressable object store keyed by SHA-1;
//! tracking state, commits and named baselines live in an embedded SQLite
//! database under `.sbac/`.
//!
//! # Example
//!
//! ```no_run
//! use sbac::repository::Repository;
//!
//! let mut repo = Repository::open("./project").unwrap();
//! repo.init().unwrap();
//! repo.add("README.md").unwrap();
//! let commit = repo.commit("first snapshot").unwrap();
//! repo.baseline("v1").unwrap();
//! repo.checkout("v1").unwrap();
//! println!("{}", commit.id);
//! ```

pub mod cli;
pub mod diff;
pub mod platform;
pub mod repository;
pub mod storage;
