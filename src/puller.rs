//! Block pullers: obtaining block content from local files or from
//! remote devices
//!
//! The local puller resolves a block hash through a finder index and reads
//! it out of whatever file currently holds it, verifying the content and
//! repairing the index on stale hits. The network puller asks the least
//! busy device advertising the file, verifies the returned bytes, and
//! falls back to the next device on a hash mismatch.

use async_trait::async_trait;
use std::collections::HashMap;
use std::error::Error;
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::activity::DeviceActivity;
use crate::changeset::{LocalRequester, NetworkRequester};
use crate::chunking;
use crate::config::BLOCK_SIZE;
use crate::error::PullError;
use crate::logging::*;
use crate::types::DeviceId;
use crate::util;

/// Index from block hash to the places in the local tree that hold the
/// block. `iterate` calls the callback with `(folder, file, block_index)`
/// per candidate and stops on the first accepted one, returning whether
/// any candidate was accepted. `fix` replaces a stale index entry after a
/// verification failure.
pub trait Finder: Send + Sync {
	fn iterate(
		&self,
		folders: &[String],
		hash: &[u8],
		cb: &mut dyn FnMut(&str, &str, u32) -> bool,
	) -> bool;

	fn fix(
		&self,
		folder: &str,
		file: &str,
		index: u32,
		expected: &[u8],
		actual: &[u8],
	) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// Returns the devices currently believed to have a file
pub trait AvailabilityOracle: Send + Sync {
	fn availability(&self, folder: &str, file: &str) -> Vec<DeviceId>;
}

/// Issues a single block request to a specific device
#[async_trait]
pub trait RemoteRequester: Send + Sync {
	async fn request_global(
		&self,
		device: DeviceId,
		folder: &str,
		file: &str,
		offset: u64,
		size: usize,
		hash: &[u8],
		flags: u32,
	) -> Result<Vec<u8>, PullError>;
}

/// Satisfies block requests from files already present in the local tree.
pub struct LocalBlockPuller {
	pub finder: Arc<dyn Finder>,
	pub folders: Vec<String>,
	pub folder_roots: HashMap<String, PathBuf>,
}

impl LocalRequester for LocalBlockPuller {
	fn request(
		&self,
		_file: &str,
		_offset: u64,
		hash: &[u8],
		buf: &mut [u8],
	) -> Result<(), PullError> {
		let found = self.finder.iterate(&self.folders, hash, &mut |folder, file, index| {
			let Some(root) = self.folder_roots.get(folder) else {
				return false;
			};
			let Ok(fd) = File::open(root.join(file)) else {
				return false;
			};
			if fd.read_exact_at(buf, BLOCK_SIZE as u64 * index as u64).is_err() {
				return false;
			}

			match chunking::verify_buffer(buf, hash) {
				Ok(()) => true,
				Err(actual) => {
					debug!(
						"block mismatch in {}:{}:{}: expected {}, got {}",
						folder,
						file,
						index,
						util::hash_to_base64(hash),
						util::hash_to_base64(&actual)
					);
					// The index entry is stale; let it repair itself
					if let Err(err) = self.finder.fix(folder, file, index, hash, &actual) {
						warn!("finder fix: {}", err);
					}
					false
				}
			}
		});

		if found {
			Ok(())
		} else {
			Err(PullError::NoSuchBlock)
		}
	}
}

/// Satisfies block requests by asking remote devices, one at a time,
/// least busy first.
pub struct NetworkBlockPuller {
	pub folder: String,
	pub availability: Arc<dyn AvailabilityOracle>,
	pub requester: Arc<dyn RemoteRequester>,
	pub activity: Arc<DeviceActivity>,
}

#[async_trait]
impl NetworkRequester for NetworkBlockPuller {
	async fn request(
		&self,
		file: &str,
		offset: u64,
		hash: &[u8],
		size: usize,
	) -> Result<Vec<u8>, PullError> {
		let mut candidates = self.availability.availability(&self.folder, file);

		loop {
			// Pick the least busy device still in the pool. Running out of
			// candidates fails the block.
			let Some(selected) = self.activity.least_busy(&candidates) else {
				debug!("request {}:{} offset {}: no device", self.folder, file, offset);
				return Err(PullError::NoDevice);
			};
			candidates.retain(|d| *d != selected);

			// Count the request against the device while it is in flight so
			// concurrent pulls prefer other devices.
			self.activity.using(selected);
			let result =
				self.requester.request_global(selected, &self.folder, file, offset, size, hash, 0).await;
			self.activity.done(selected);

			let data = match result {
				Ok(data) => data,
				Err(err) => {
					// A transport failure is fatal for the block; retrying
					// another device is reserved for content mismatches.
					debug!(
						"request {}:{} offset {} from {}: {}",
						self.folder, file, offset, selected, err
					);
					return Err(err);
				}
			};

			match chunking::verify_buffer(&data, hash) {
				Ok(()) => {
					debug!("completed request {}:{} offset {}", self.folder, file, offset);
					return Ok(data);
				}
				Err(actual) => {
					// The device returned the wrong data; drop it from the
					// pool and try the next one.
					debug!(
						"request {}:{} offset {} from {}: expected {}, got {}",
						self.folder,
						file,
						offset,
						selected,
						util::hash_to_base64(hash),
						util::hash_to_base64(&actual)
					);
				}
			}
		}
	}
}


// vim: ts=4
