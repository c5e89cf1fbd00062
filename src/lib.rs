//! # BlockR - Block-Level File Reconciliation Engine
//!
//! BlockR materializes target file descriptions on a local filesystem:
//! blocks already present locally (in a leftover temp file or in other
//! files) are reused, the rest is pulled from remote devices, and the
//! result is installed atomically with rename-into-place. Directories,
//! deletions and renames follow the same idempotency and conflict
//! discipline, and completed changes are batched into a persistence layer.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use blockr::changeset::ChangeSet;
//! use blockr::fs::default_filesystem;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cs = ChangeSet::new("/data/folder", Arc::new(default_filesystem()));
//!     cs.write_dir(&target_dir)?;
//!     cs.write_file(target_file).await?;
//!     Ok(())
//! }
//! ```

pub mod activity;
pub mod changeset;
pub mod chunking;
pub mod config;
pub mod db_updater;
pub mod error;
pub mod fs;
pub mod logging;
pub mod progress;
pub mod puller;
pub mod types;
pub mod util;
pub mod version;

// Re-export commonly used types
pub use changeset::ChangeSet;
pub use error::{OpError, PullError};
pub use types::{BlockInfo, DeviceId, FileInfo};
pub use version::{VectorOrdering, VersionVector};

// vim: ts=4
