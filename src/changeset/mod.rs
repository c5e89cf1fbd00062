//! Applying tree changes to a local filesystem root
//!
//! A `ChangeSet` materializes target `FileInfo` descriptions under one
//! root: files are assembled block by block from local and remote sources
//! into a hidden temp file and renamed into place, directories are created
//! or re-moded, deletions and renames are applied idempotently. Conflicting
//! concurrent modifications are moved aside rather than overwritten.

mod dir;
mod file;

use async_trait::async_trait;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::error::{OpError, PullError};
use crate::fs::Filesystem;
use crate::progress::Progresser;
use crate::types::FileInfo;

/// Returns the last known database record for a name, if any
pub trait CurrentFiler: Send + Sync {
	fn current_file(&self, name: &str) -> Option<FileInfo>;
}

/// Moves an existing file into archival storage before it is replaced or
/// deleted. Archiving a missing file is not an error.
pub trait Archiver: Send + Sync {
	fn archive(&self, path: &Path) -> io::Result<()>;
}

/// Satisfies a block request from data already on this host, filling
/// `buf` with exactly `buf.len()` verified bytes.
pub trait LocalRequester: Send + Sync {
	fn request(
		&self,
		file: &str,
		offset: u64,
		hash: &[u8],
		buf: &mut [u8],
	) -> Result<(), PullError>;
}

/// Satisfies a block request from the network, returning exactly `size`
/// verified bytes.
#[async_trait]
pub trait NetworkRequester: Send + Sync {
	async fn request(
		&self,
		file: &str,
		offset: u64,
		hash: &[u8],
		size: usize,
	) -> Result<Vec<u8>, PullError>;
}

/// Applies file, directory, deletion and rename operations under a root.
/// All collaborators except the filesystem are optional; a changeset with
/// no pullers can still write files whose blocks are already present in
/// an existing temp file, and empty files.
pub struct ChangeSet {
	root: PathBuf,
	fs: Arc<dyn Filesystem>,
	current_filer: Option<Arc<dyn CurrentFiler>>,
	local: Option<Arc<dyn LocalRequester>>,
	network: Option<Arc<dyn NetworkRequester>>,
	progresser: Option<Arc<dyn Progresser>>,
	archiver: Option<Arc<dyn Archiver>>,
	max_conflicts: i32,
}

impl ChangeSet {
	pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn Filesystem>) -> Self {
		ChangeSet {
			root: root.into(),
			fs,
			current_filer: None,
			local: None,
			network: None,
			progresser: None,
			archiver: None,
			max_conflicts: -1,
		}
	}

	pub fn with_current_filer(mut self, filer: Arc<dyn CurrentFiler>) -> Self {
		self.current_filer = Some(filer);
		self
	}

	pub fn with_local_requester(mut self, local: Arc<dyn LocalRequester>) -> Self {
		self.local = Some(local);
		self
	}

	pub fn with_network_requester(mut self, network: Arc<dyn NetworkRequester>) -> Self {
		self.network = Some(network);
		self
	}

	pub fn with_progresser(mut self, progresser: Arc<dyn Progresser>) -> Self {
		self.progresser = Some(progresser);
		self
	}

	pub fn with_archiver(mut self, archiver: Arc<dyn Archiver>) -> Self {
		self.archiver = Some(archiver);
		self
	}

	/// Limit the number of conflict copies kept per file. 0 deletes the
	/// losing side instead of keeping a copy, -1 keeps all copies.
	pub fn with_max_conflicts(mut self, max_conflicts: i32) -> Self {
		self.max_conflicts = max_conflicts;
		self
	}

	/// Resolve a relative name against the root. Names are validated here,
	/// at the single boundary between wire form and filesystem paths.
	fn real_path(&self, name: &str) -> Result<PathBuf, OpError> {
		validate_name(name).map_err(|reason| OpError::new(name, "validate name", reason))?;
		Ok(self.root.join(name))
	}
}

/// Check that a name is relative, non-empty and free of parent directory
/// traversal.
fn validate_name(name: &str) -> Result<(), String> {
	if name.is_empty() {
		return Err("empty name".to_string());
	}

	let path = Path::new(name);
	if path.is_absolute() {
		return Err("absolute path".to_string());
	}
	for component in path.components() {
		match component {
			Component::ParentDir => return Err("parent directory traversal".to_string()),
			Component::CurDir => return Err("current directory reference".to_string()),
			_ => {}
		}
	}

	Ok(())
}

/// The hidden sibling used while a file is being assembled. Idempotent:
/// the temp name of a temp name is itself.
pub fn temp_name(path: &Path) -> PathBuf {
	let base = match path.file_name() {
		Some(base) => base.to_string_lossy(),
		None => return path.to_path_buf(),
	};
	if base.starts_with('.') && base.ends_with(".tmp") {
		return path.to_path_buf();
	}

	let mut temp = path.to_path_buf();
	temp.set_file_name(format!(".{}.tmp", base));
	temp
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_temp_name() {
		assert_eq!(temp_name(Path::new("dir/file.txt")), Path::new("dir/.file.txt.tmp"));
		assert_eq!(temp_name(Path::new("file")), Path::new(".file.tmp"));
	}

	#[test]
	fn test_temp_name_is_idempotent() {
		let once = temp_name(Path::new("dir/file.txt"));
		assert_eq!(temp_name(&once), once);
	}

	#[test]
	fn test_temp_name_stays_in_same_dir() {
		let temp = temp_name(Path::new("a/b/c.dat"));
		assert_eq!(temp.parent(), Some(Path::new("a/b")));
	}

	#[test]
	fn test_validate_name_allows_relative_paths() {
		assert!(validate_name("file.txt").is_ok());
		assert!(validate_name("dir/file.txt").is_ok());
		assert!(validate_name("a/b/c/d.txt").is_ok());
	}

	#[test]
	fn test_validate_name_rejects_absolute_paths() {
		assert!(validate_name("/etc/passwd").is_err());
		assert!(validate_name("/").is_err());
	}

	#[test]
	fn test_validate_name_rejects_parent_traversal() {
		assert!(validate_name("../etc/passwd").is_err());
		assert!(validate_name("dir/../../etc/passwd").is_err());
		assert!(validate_name("..").is_err());
		assert!(validate_name("dir/..").is_err());
	}

	#[test]
	fn test_validate_name_rejects_empty_and_current_dir() {
		assert!(validate_name("").is_err());
		assert!(validate_name(".").is_err());
	}
}

// vim: ts=4
