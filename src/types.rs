//! Core data types describing files, blocks and devices

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::config::BLOCK_SIZE;
use crate::util;
use crate::version::VersionVector;

/// File is deleted on the source device
pub const FLAG_DELETED: u32 = 1 << 12;

/// File is invalid (e.g. failed to scan) and must not be synced
pub const FLAG_INVALID: u32 = 1 << 13;

/// Entry is a directory
pub const FLAG_DIRECTORY: u32 = 1 << 14;

/// Permission bits are not tracked for this entry
pub const FLAG_NO_PERM_BITS: u32 = 1 << 15;

/// Entry is a symbolic link
pub const FLAG_SYMLINK: u32 = 1 << 16;

/// Identifies a device (node) in the cluster.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub [u8; 32]);

impl fmt::Display for DeviceId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		// The truncated form is unambiguous enough for logs
		write!(f, "{}", &util::hash_to_base64(&self.0)[..8])
	}
}

impl fmt::Debug for DeviceId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "DeviceId({})", self)
	}
}

/// One fixed-size piece of a file, identified by its SHA-256 hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
	pub offset: u64,
	pub size: u32,
	pub hash: Vec<u8>,
}

impl BlockInfo {
	/// True if this block consists of all zero bytes. A full-size zero
	/// block is recognized by its well-known hash; short tail blocks are
	/// hashed on the fly.
	pub fn is_empty(&self) -> bool {
		if self.size as usize == BLOCK_SIZE {
			return self.hash == *zero_block_hash();
		}
		self.hash == util::hash(&vec![0u8; self.size as usize])
	}
}

fn zero_block_hash() -> &'static Vec<u8> {
	static HASH: OnceLock<Vec<u8>> = OnceLock::new();
	HASH.get_or_init(|| util::hash(&vec![0u8; BLOCK_SIZE]))
}

/// The target description of one entry in the tree: metadata plus the
/// ordered block list. This is what the writer materializes and what the
/// database updater persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
	/// Forward-slash relative path, never absolute, never containing ".."
	pub name: String,
	/// Permission bits plus the FLAG_* bits above
	pub flags: u32,
	/// Modification time, seconds since the epoch
	pub modified: i64,
	/// Version vector of this revision
	pub version: VersionVector,
	/// Database sequence number; 0 means "renumber at persist time"
	pub local_version: u64,
	/// File size in bytes; equals the sum of the block sizes
	pub size: u64,
	pub blocks: Vec<BlockInfo>,
}

impl FileInfo {
	pub fn is_deleted(&self) -> bool {
		self.flags & FLAG_DELETED != 0
	}

	pub fn is_invalid(&self) -> bool {
		self.flags & FLAG_INVALID != 0
	}

	pub fn is_directory(&self) -> bool {
		self.flags & FLAG_DIRECTORY != 0
	}

	pub fn is_symlink(&self) -> bool {
		self.flags & FLAG_SYMLINK != 0
	}

	/// True if permission bits should not be applied to the filesystem
	pub fn ignores_permissions(&self) -> bool {
		self.flags & FLAG_NO_PERM_BITS != 0
	}

	/// The permission bits of the entry
	pub fn permissions(&self) -> u32 {
		self.flags & 0o777
	}
}
