//! File-level operations: assembling, deleting, renaming and moving
//! aside for conflict

use chrono::{DateTime, Utc};
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{temp_name, ChangeSet, NetworkRequester};
use crate::chunking;
use crate::config::BLOCK_SIZE;
use crate::error::{OpError, PullError};
use crate::fs::in_writable_dir;
use crate::logging::*;
use crate::progress::Progresser;
use crate::types::{BlockInfo, FileInfo};

impl ChangeSet {
	/// Materialize one regular file under the root. Blocks already present
	/// in a leftover temp file are kept, further blocks come from the
	/// local requester or, as concurrent background fetches, from the
	/// network requester. The finished temp file is renamed into place,
	/// which is the point where the new content becomes visible.
	pub async fn write_file(&self, mut f: FileInfo) -> Result<(), OpError> {
		let real_path = self.real_path(&f.name)?;
		let temp_path = temp_name(&real_path);

		let mut in_conflict = false;
		if let Some(filer) = &self.current_filer {
			if let Some(cur) = filer.current_file(&f.name) {
				// The database knows an existing file under this name. If
				// the file on disk no longer matches that record it was
				// changed outside our awareness; a rescan is required
				// before we may replace it.
				if let Ok(info) = self.fs.lstat(&real_path) {
					let mismatch = if info.modified != cur.modified {
						Some("modification time mismatch")
					} else if info.size != cur.size {
						Some("size mismatch")
					} else {
						None
					};
					if let Some(mismatch) = mismatch {
						return Err(OpError::rescan(&f.name, "write file check", mismatch));
					}
				}

				// Concurrent version vectors mean the file was modified on
				// both sides; the existing copy is moved aside at finalize.
				in_conflict = cur.version.concurrent(&f.version);

				// TODO: when the existing content already hashes to the
				// target block list, update metadata only and skip the
				// temp file dance.
			}
		}

		let mut reuse = false;
		if self.fs.lstat(&temp_path).is_ok() {
			// An earlier attempt left a temp file behind. Hash what it
			// holds and fetch only the blocks it is missing.
			match chunking::hash_file(&temp_path, BLOCK_SIZE) {
				Ok(have) => {
					let (_, missing) = chunking::block_diff(&have, &f.blocks);
					f.blocks = missing;
					reuse = true;
				}
				Err(_) => {
					// Unreadable temp file; get rid of it and start fresh
					if let Err(err) =
						in_writable_dir(self.fs.as_ref(), |p| self.fs.remove(p), &temp_path)
					{
						return Err(OpError::new(&f.name, "write file remove reused temp", err));
					}
				}
			}
		}

		let fd = self
			.open_temp_file(&temp_path, reuse, f.size)
			.map_err(|err| OpError::new(&f.name, "write file open", err))?;
		let fd = Arc::new(fd);

		let progress_file = Arc::new(f.clone());
		let mut buf = vec![0u8; BLOCK_SIZE];
		// Room for exactly one error; later failures are dropped
		let (err_tx, mut err_rx) = mpsc::channel::<OpError>(1);
		let mut background: Vec<JoinHandle<()>> = Vec::new();

		for block in &f.blocks {
			// A background request may have failed since the last block;
			// stop dispatching if so.
			if let Ok(err) = err_rx.try_recv() {
				drain(&mut background).await;
				return Err(err);
			}

			if block.is_empty() && !reuse {
				// The exclusively created, truncated temp file is already
				// zero at this offset. A reused temp only lists this block
				// because it held something else there, so it cannot be
				// skipped then.
				if let Some(progresser) = &self.progresser {
					progresser.progress(&progress_file, i64::from(block.size), 0, 0);
				}
				continue;
			}

			let buf = &mut buf[..block.size as usize];

			// Replaced below if a source is configured at all
			let mut pull_err = Some(PullError::NoSource);

			if let Some(local) = &self.local {
				match local.request(&f.name, block.offset, &block.hash, buf) {
					Ok(()) => {
						if let Err(err) = fd.write_all_at(buf, block.offset) {
							return Err(OpError::new(&f.name, "write file write", err));
						}
						if let Some(progresser) = &self.progresser {
							progresser.progress(&progress_file, i64::from(block.size), 0, 0);
						}
						pull_err = None;
					}
					Err(err) => pull_err = Some(err),
				}
			}

			if pull_err.is_some() {
				if let Some(network) = &self.network {
					// Hand the block to a background task; a failure comes
					// back through the error channel.
					pull_err = None;
					if let Some(progresser) = &self.progresser {
						progresser.progress(&progress_file, 0, i64::from(block.size), 0);
					}
					background.push(spawn_network_request(
						network.clone(),
						fd.clone(),
						self.progresser.clone(),
						progress_file.clone(),
						err_tx.clone(),
						f.name.clone(),
						block.clone(),
					));
				}
			}

			if let Some(err) = pull_err {
				drain(&mut background).await;
				return Err(OpError::new(&f.name, "pull", err));
			}
		}

		// Let the in-flight background requests finish, then check
		// whether any of them failed.
		drain(&mut background).await;
		if let Ok(err) = err_rx.try_recv() {
			return Err(err);
		}

		// Flush the temp file. An error here means the content on disk is
		// not what was written, so the file must not be installed.
		fd.sync_all().map_err(|err| OpError::new(&f.name, "write file close", err))?;
		drop(fd);

		if !f.ignores_permissions() {
			self.fs
				.chmod(&temp_path, f.permissions())
				.map_err(|err| OpError::new(&f.name, "write file chmod", err))?;
		}

		self.fs
			.chtimes(&temp_path, f.modified, f.modified)
			.map_err(|err| OpError::new(&f.name, "write file chtimes", err))?;

		if in_conflict {
			if let Err(err) = self.move_for_conflict(&real_path) {
				warn!("move for conflict {}: {}", real_path.display(), err);
			}
		} else if let Some(archiver) = &self.archiver {
			let _ = archiver.archive(&real_path);
		}

		self.fs
			.rename(&temp_path, &real_path)
			.map_err(|err| OpError::new(&f.name, "write file rename", err))
	}

	/// Delete one file. Entries that are already gone, or that cannot even
	/// be stat'ed, count as deleted.
	pub fn delete_file(&self, f: &FileInfo) -> Result<(), OpError> {
		let real_path = self.real_path(&f.name)?;
		if let Some(archiver) = &self.archiver {
			let _ = archiver.archive(&real_path);
		}

		if let Err(err) = in_writable_dir(self.fs.as_ref(), |p| self.fs.remove(p), &real_path) {
			if err.kind() == io::ErrorKind::NotFound {
				return Ok(());
			}
			if self.fs.lstat(&real_path).is_err() {
				return Ok(());
			}
			return Err(OpError::new(&f.name, "delete file remove", err));
		}

		Ok(())
	}

	/// Rename a file within the root. The caller guarantees the target
	/// name is free or has been dealt with.
	pub fn rename_file(&self, from: &FileInfo, to: &FileInfo) -> Result<(), OpError> {
		let real_from = self.real_path(&from.name)?;
		let real_to = self.real_path(&to.name)?;
		self.fs
			.rename(&real_from, &real_to)
			.map_err(|err| OpError::new(&to.name, "rename file", err))
	}

	/// Move an existing file out of the way of a conflicting incoming
	/// version, keeping at most `max_conflicts` dated copies.
	pub(super) fn move_for_conflict(&self, real_path: &Path) -> io::Result<()> {
		let base = match real_path.file_name() {
			Some(base) => base.to_string_lossy().into_owned(),
			None => return Ok(()),
		};
		if base.contains(".sync-conflict-") {
			// Don't pile conflict names onto conflict copies
			return Ok(());
		}

		if self.max_conflicts == 0 {
			return match in_writable_dir(self.fs.as_ref(), |p| self.fs.remove(p), real_path) {
				Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
				_ => Ok(()),
			};
		}

		let conflict_path = conflict_name(real_path, Utc::now());
		let result = match self.fs.rename(real_path, &conflict_path) {
			// The file is already gone: the user moved it away, or the
			// conflict was against a local delete. Nothing left to keep.
			Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
			other => other,
		};

		if self.max_conflicts > -1 {
			// Enumerate siblings by reading the directory rather than by
			// globbing; base names routinely contain glob metacharacters.
			let dir = match real_path.parent() {
				Some(dir) if !dir.as_os_str().is_empty() => dir,
				_ => Path::new("."),
			};
			let names = match self.fs.dir_names(dir) {
				Ok(names) => names,
				Err(_) => return result,
			};

			let ext = extension_with_dot(&base);
			let stem = &base[..base.len() - ext.len()];
			let prefix = format!("{}.sync-conflict-", stem);
			let mut matches: Vec<String> = names
				.into_iter()
				.filter(|name| name.starts_with(&prefix) && name.ends_with(&ext))
				.collect();

			if matches.len() > self.max_conflicts as usize {
				// The fixed timestamp format sorts lexically in time
				// order, so reverse order is newest first
				matches.sort_by(|a, b| b.cmp(a));
				for name in &matches[self.max_conflicts as usize..] {
					let _ = self.fs.remove(&dir.join(name));
				}
			}
		}

		result
	}

	/// Open the temp file for writing. A fresh temp is created exclusively
	/// after making sure the parent directory exists and admits the
	/// create; a reused temp is opened in place. Both are truncated to the
	/// target size.
	fn open_temp_file(&self, temp_path: &Path, reuse: bool, size: u64) -> io::Result<File> {
		if !reuse {
			let dir = match temp_path.parent() {
				Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
				_ => PathBuf::from("."),
			};

			let mut restore_mode = None;
			match self.fs.stat(&dir) {
				Err(err) if err.kind() == io::ErrorKind::NotFound => {
					self.fs.mkdir_all(&dir, 0o755)?;
				}
				Err(err) => return Err(err),
				Ok(info) => {
					if info.mode & 0o200 == 0 && self.fs.chmod(&dir, 0o755).is_ok() {
						restore_mode = Some(info.mode);
					}
				}
			}

			let result = self.fs.open_write(temp_path, true, Some(size));
			if let Some(mode) = restore_mode {
				let _ = self.fs.chmod(&dir, mode);
			}
			return result;
		}

		// A crash between the final chmod and the rename leaves a
		// read-only temp file behind. Make sure it is writable before the
		// open; if chmod is unsupported here the open will complain
		// instead.
		let _ = self.fs.chmod(temp_path, 0o666);
		self.fs.open_write(temp_path, false, Some(size))
	}
}

fn spawn_network_request(
	network: Arc<dyn NetworkRequester>,
	fd: Arc<File>,
	progresser: Option<Arc<dyn Progresser>>,
	file: Arc<FileInfo>,
	err_tx: mpsc::Sender<OpError>,
	name: String,
	block: BlockInfo,
) -> JoinHandle<()> {
	tokio::spawn(async move {
		match network.request(&name, block.offset, &block.hash, block.size as usize).await {
			Err(err) => {
				if let Some(progresser) = &progresser {
					progresser.progress(&file, 0, -i64::from(block.size), 0);
				}
				// First failure wins; a full channel means another task
				// already reported one
				let _ = err_tx.try_send(OpError::new(&name, "background request", err));
			}
			Ok(data) => {
				if let Err(err) = fd.write_all_at(&data, block.offset) {
					if let Some(progresser) = &progresser {
						progresser.progress(&file, 0, -i64::from(block.size), 0);
					}
					let _ = err_tx.try_send(OpError::new(&name, "background write", err));
				} else if let Some(progresser) = &progresser {
					progresser.progress(&file, 0, -i64::from(block.size), i64::from(block.size));
				}
			}
		}
	})
}

async fn drain(background: &mut Vec<JoinHandle<()>>) {
	for handle in background.drain(..) {
		let _ = handle.await;
	}
}

fn conflict_name(path: &Path, now: DateTime<Utc>) -> PathBuf {
	let base = match path.file_name() {
		Some(base) => base.to_string_lossy().into_owned(),
		None => return path.to_path_buf(),
	};
	let ext = extension_with_dot(&base);
	let stem = &base[..base.len() - ext.len()];

	let mut conflict = path.to_path_buf();
	conflict.set_file_name(format!(
		"{}.sync-conflict-{}{}",
		stem,
		now.format("%Y%m%d-%H%M%S"),
		ext
	));
	conflict
}

fn extension_with_dot(base: &str) -> String {
	match base.rfind('.') {
		Some(idx) if idx > 0 => base[idx..].to_string(),
		_ => String::new(),
	}
}


// vim: ts=4
