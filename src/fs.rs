//! Filesystem access for one rooted subtree
//!
//! The engine performs all disk access through the `Filesystem` trait so
//! tests and alternative backends can substitute their own. `BasicFilesystem`
//! delegates to `std::fs`; `ExtendedFilesystem` layers retry behavior for
//! removing and renaming over entries that a stricter permission regime
//! would otherwise block.

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use filetime::FileTime;

/// The subset of stat information the engine consumes
#[derive(Debug, Clone, Copy)]
pub struct Metadata {
	/// Permission bits including setuid/setgid/sticky (mode & 0o7777)
	pub mode: u32,
	pub size: u64,
	/// Modification time, seconds since the epoch
	pub modified: i64,
	pub is_dir: bool,
}

impl Metadata {
	fn from_std(meta: &fs::Metadata) -> Self {
		Metadata {
			mode: meta.permissions().mode() & 0o7777,
			size: meta.len(),
			modified: meta.mtime(),
			is_dir: meta.is_dir(),
		}
	}
}

/// Narrow capability set over a mounted tree.
pub trait Filesystem: Send + Sync {
	fn chmod(&self, path: &Path, mode: u32) -> io::Result<()>;
	fn chtimes(&self, path: &Path, atime: i64, mtime: i64) -> io::Result<()>;
	fn lstat(&self, path: &Path) -> io::Result<Metadata>;
	fn stat(&self, path: &Path) -> io::Result<Metadata>;
	fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()>;
	fn remove(&self, path: &Path) -> io::Result<()>;
	fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
	fn dir_names(&self, path: &Path) -> io::Result<Vec<String>>;

	/// Open a file for writing, creating it if absent. With `excl` the open
	/// fails if the file already exists. With `size` the file is truncated
	/// to exactly that many bytes after opening.
	fn open_write(&self, path: &Path, excl: bool, size: Option<u64>) -> io::Result<File>;
}

/// Implements all operations by delegating to `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicFilesystem;

impl Filesystem for BasicFilesystem {
	fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
		fs::set_permissions(path, fs::Permissions::from_mode(mode))
	}

	fn chtimes(&self, path: &Path, atime: i64, mtime: i64) -> io::Result<()> {
		filetime::set_file_times(
			path,
			FileTime::from_unix_time(atime, 0),
			FileTime::from_unix_time(mtime, 0),
		)
	}

	fn lstat(&self, path: &Path) -> io::Result<Metadata> {
		fs::symlink_metadata(path).map(|m| Metadata::from_std(&m))
	}

	fn stat(&self, path: &Path) -> io::Result<Metadata> {
		fs::metadata(path).map(|m| Metadata::from_std(&m))
	}

	fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
		DirBuilder::new().recursive(true).mode(mode).create(path)
	}

	fn remove(&self, path: &Path) -> io::Result<()> {
		let meta = fs::symlink_metadata(path)?;
		if meta.is_dir() {
			fs::remove_dir(path)
		} else {
			fs::remove_file(path)
		}
	}

	fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
		fs::rename(from, to)
	}

	fn dir_names(&self, path: &Path) -> io::Result<Vec<String>> {
		let mut names = Vec::new();
		for entry in fs::read_dir(path)? {
			names.push(entry?.file_name().to_string_lossy().into_owned());
		}
		Ok(names)
	}

	fn open_write(&self, path: &Path, excl: bool, size: Option<u64>) -> io::Result<File> {
		let mut options = OpenOptions::new();
		options.write(true);
		if excl {
			options.create_new(true);
		} else {
			options.create(true);
		}
		let fd = options.open(path)?;

		if let Some(size) = size {
			fd.set_len(size)?;
		}

		Ok(fd)
	}
}

/// Adds robustness on top of `BasicFilesystem`: removal of entries whose
/// mode blocks the operation, and rename-over when the destination is in
/// the way.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtendedFilesystem(pub BasicFilesystem);

impl Filesystem for ExtendedFilesystem {
	fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
		self.0.chmod(path, mode)
	}

	fn chtimes(&self, path: &Path, atime: i64, mtime: i64) -> io::Result<()> {
		self.0.chtimes(path, atime, mtime)
	}

	fn lstat(&self, path: &Path) -> io::Result<Metadata> {
		self.0.lstat(path)
	}

	fn stat(&self, path: &Path) -> io::Result<Metadata> {
		self.0.stat(path)
	}

	fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
		self.0.mkdir_all(path, mode)
	}

	fn remove(&self, path: &Path) -> io::Result<()> {
		match self.0.remove(path) {
			Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
				// A read-only mode on the entry itself can block directory
				// removal; relax it and retry once.
				self.0.chmod(path, 0o700)?;
				self.0.remove(path)
			}
			other => other,
		}
	}

	fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
		match self.0.rename(from, to) {
			Ok(()) => Ok(()),
			Err(err) => {
				// The destination may exist with a type or mode that blocks
				// rename-over. Move it out of the way and retry once.
				if self.lstat(to).is_err() {
					return Err(err);
				}
				self.remove(to)?;
				self.0.rename(from, to)
			}
		}
	}

	fn dir_names(&self, path: &Path) -> io::Result<Vec<String>> {
		self.0.dir_names(path)
	}

	fn open_write(&self, path: &Path, excl: bool, size: Option<u64>) -> io::Result<File> {
		self.0.open_write(path, excl, size)
	}
}

/// The filesystem used when callers have no reason to supply their own.
pub fn default_filesystem() -> ExtendedFilesystem {
	ExtendedFilesystem(BasicFilesystem)
}

/// Run `op` on `path`. If it fails with a permission error, temporarily
/// reduce the parent directory to owner-only rwx, retry, and restore the
/// parent's previous mode whether or not the retry succeeded. Needed for
/// creating or deleting entries under directories the target permission
/// regime keeps read-only.
pub fn in_writable_dir<F>(fs: &dyn Filesystem, op: F, path: &Path) -> io::Result<()>
where
	F: Fn(&Path) -> io::Result<()>,
{
	let err = match op(path) {
		Ok(()) => return Ok(()),
		Err(err) if err.kind() == io::ErrorKind::PermissionDenied => err,
		Err(err) => return Err(err),
	};

	let dir = parent_dir(path);
	let info = match fs.stat(&dir) {
		Ok(info) => info,
		Err(_) => return Err(err),
	};
	// Exactly 0o700 for the retry window: group and other keep nothing
	if fs.chmod(&dir, 0o700).is_err() {
		return Err(err);
	}

	let result = op(path);
	let _ = fs.chmod(&dir, info.mode);
	result
}

fn parent_dir(path: &Path) -> PathBuf {
	match path.parent() {
		Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
		_ => PathBuf::from("."),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::cell::Cell;
	use std::io::Read;
	use tempfile::TempDir;

	#[test]
	fn test_open_write_truncates_to_size() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("file");
		fs::write(&path, b"hello world").unwrap();

		let fd = BasicFilesystem.open_write(&path, false, Some(4)).unwrap();
		drop(fd);

		assert_eq!(fs::metadata(&path).unwrap().len(), 4);
	}

	#[test]
	fn test_open_write_exclusive_fails_on_existing() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("file");
		fs::write(&path, b"x").unwrap();

		assert!(BasicFilesystem.open_write(&path, true, None).is_err());
	}

	#[test]
	fn test_open_write_creates() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("new");

		let fd = BasicFilesystem.open_write(&path, true, Some(8)).unwrap();
		drop(fd);

		assert_eq!(fs::metadata(&path).unwrap().len(), 8);
	}

	#[test]
	fn test_remove_file_and_dir() {
		let dir = TempDir::new().unwrap();
		let file = dir.path().join("f");
		let sub = dir.path().join("d");
		fs::write(&file, b"x").unwrap();
		fs::create_dir(&sub).unwrap();

		BasicFilesystem.remove(&file).unwrap();
		BasicFilesystem.remove(&sub).unwrap();
		assert!(!file.exists());
		assert!(!sub.exists());
	}

	#[test]
	fn test_dir_names() {
		let dir = TempDir::new().unwrap();
		fs::write(dir.path().join("a"), b"").unwrap();
		fs::write(dir.path().join("b"), b"").unwrap();

		let mut names = BasicFilesystem.dir_names(dir.path()).unwrap();
		names.sort();
		assert_eq!(names, vec!["a", "b"]);
	}

	#[test]
	fn test_chtimes() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("f");
		fs::write(&path, b"x").unwrap();

		BasicFilesystem.chtimes(&path, 1_000_000, 1_000_000).unwrap();
		assert_eq!(BasicFilesystem.lstat(&path).unwrap().modified, 1_000_000);
	}

	#[test]
	fn test_rename_over_existing_file() {
		let dir = TempDir::new().unwrap();
		let from = dir.path().join("from");
		let to = dir.path().join("to");
		fs::write(&from, b"new").unwrap();
		fs::write(&to, b"old").unwrap();

		default_filesystem().rename(&from, &to).unwrap();

		let mut content = String::new();
		File::open(&to).unwrap().read_to_string(&mut content).unwrap();
		assert_eq!(content, "new");
		assert!(!from.exists());
	}

	#[test]
	fn test_in_writable_dir_passes_through_success() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("f");
		fs::write(&path, b"x").unwrap();

		in_writable_dir(&BasicFilesystem, |p| BasicFilesystem.remove(p), &path).unwrap();
		assert!(!path.exists());
	}

	#[test]
	fn test_in_writable_dir_retries_on_permission_error() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("f");
		fs::write(&path, b"x").unwrap();

		// Give the parent group/other bits so the retry window is visible
		BasicFilesystem.chmod(dir.path(), 0o755).unwrap();

		// Fail the first attempt so the helper drops the parent to
		// owner-only access and retries.
		let attempts = Cell::new(0);
		let retry_mode = Cell::new(0);
		let op = |p: &Path| {
			attempts.set(attempts.get() + 1);
			if attempts.get() == 1 {
				return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
			}
			retry_mode.set(BasicFilesystem.stat(p.parent().unwrap()).unwrap().mode);
			BasicFilesystem.remove(p)
		};

		in_writable_dir(&BasicFilesystem, op, &path).unwrap();

		assert_eq!(attempts.get(), 2);
		assert!(!path.exists());
		// During the retry the parent held exactly owner rwx
		assert_eq!(retry_mode.get(), 0o700);
		// Parent mode is restored after the retry
		assert_eq!(BasicFilesystem.stat(dir.path()).unwrap().mode, 0o755);
	}

	#[test]
	fn test_in_writable_dir_propagates_other_errors() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("missing");

		let err =
			in_writable_dir(&BasicFilesystem, |p| BasicFilesystem.remove(p), &path).unwrap_err();
		assert_eq!(err.kind(), io::ErrorKind::NotFound);
	}
}

// vim: ts=4
