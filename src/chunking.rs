//! Fixed-size block hashing and block-list diffing

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::types::BlockInfo;
use crate::util;

/// Read a file and hash it into a list of fixed-size blocks. The final
/// block may be shorter; a zero-length file yields an empty list.
pub fn hash_file(path: &Path, block_size: usize) -> io::Result<Vec<BlockInfo>> {
	let fd = File::open(path)?;
	hash_blocks(fd, block_size)
}

/// Hash a stream into a list of fixed-size blocks.
pub fn hash_blocks<R: Read>(mut reader: R, block_size: usize) -> io::Result<Vec<BlockInfo>> {
	let mut blocks = Vec::new();
	let mut buf = vec![0u8; block_size];
	let mut offset: u64 = 0;

	loop {
		let mut filled = 0;
		while filled < block_size {
			let n = reader.read(&mut buf[filled..])?;
			if n == 0 {
				break;
			}
			filled += n;
		}
		if filled == 0 {
			break;
		}

		blocks.push(BlockInfo {
			offset,
			size: filled as u32,
			hash: util::hash(&buf[..filled]),
		});
		offset += filled as u64;

		if filled < block_size {
			break;
		}
	}

	Ok(blocks)
}

/// Compare two block lists position by position. Returns the blocks of
/// `want` that are already present in `have` at the same index, and those
/// that still need to be obtained.
pub fn block_diff(have: &[BlockInfo], want: &[BlockInfo]) -> (Vec<BlockInfo>, Vec<BlockInfo>) {
	if want.is_empty() {
		return (Vec::new(), Vec::new());
	}
	if have.is_empty() {
		return (Vec::new(), want.to_vec());
	}

	let mut existing = Vec::new();
	let mut missing = Vec::new();
	for (i, block) in want.iter().enumerate() {
		if i < have.len() && have[i].hash == block.hash {
			existing.push(block.clone());
		} else {
			missing.push(block.clone());
		}
	}
	(existing, missing)
}

/// Verify that a buffer matches the expected block hash. On mismatch the
/// actual hash is returned so callers can report or repair their index.
pub fn verify_buffer(buf: &[u8], expected: &[u8]) -> Result<(), Vec<u8>> {
	let actual = util::hash(buf);
	if actual == expected {
		Ok(())
	} else {
		Err(actual)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn block(data: &[u8], offset: u64) -> BlockInfo {
		BlockInfo { offset, size: data.len() as u32, hash: util::hash(data) }
	}

	#[test]
	fn test_hash_blocks_exact_multiple() {
		let data = vec![7u8; 8];
		let blocks = hash_blocks(&data[..], 4).unwrap();
		assert_eq!(blocks.len(), 2);
		assert_eq!(blocks[0].offset, 0);
		assert_eq!(blocks[1].offset, 4);
		assert_eq!(blocks[1].size, 4);
	}

	#[test]
	fn test_hash_blocks_short_tail() {
		let data = vec![7u8; 10];
		let blocks = hash_blocks(&data[..], 4).unwrap();
		assert_eq!(blocks.len(), 3);
		assert_eq!(blocks[2].offset, 8);
		assert_eq!(blocks[2].size, 2);
	}

	#[test]
	fn test_hash_blocks_empty() {
		let blocks = hash_blocks(&[][..], 4).unwrap();
		assert!(blocks.is_empty());
	}

	#[test]
	fn test_block_offsets_contiguous() {
		let data = vec![1u8; 13];
		let blocks = hash_blocks(&data[..], 4).unwrap();
		assert_eq!(blocks[0].offset, 0);
		for w in blocks.windows(2) {
			assert_eq!(w[1].offset, w[0].offset + w[0].size as u64);
		}
	}

	#[test]
	fn test_block_diff_identical() {
		let want = vec![block(b"aaaa", 0), block(b"bbbb", 4)];
		let (existing, missing) = block_diff(&want, &want);
		assert_eq!(existing.len(), 2);
		assert!(missing.is_empty());
	}

	#[test]
	fn test_block_diff_empty_have() {
		let want = vec![block(b"aaaa", 0)];
		let (existing, missing) = block_diff(&[], &want);
		assert!(existing.is_empty());
		assert_eq!(missing, want);
	}

	#[test]
	fn test_block_diff_partial() {
		let have = vec![block(b"aaaa", 0), block(b"XXXX", 4)];
		let want = vec![block(b"aaaa", 0), block(b"bbbb", 4), block(b"cc", 8)];
		let (existing, missing) = block_diff(&have, &want);
		assert_eq!(existing, vec![block(b"aaaa", 0)]);
		assert_eq!(missing, vec![block(b"bbbb", 4), block(b"cc", 8)]);
	}

	#[test]
	fn test_block_diff_have_longer_than_want() {
		let have = vec![block(b"aaaa", 0), block(b"bbbb", 4)];
		let want = vec![block(b"aaaa", 0)];
		let (existing, missing) = block_diff(&have, &want);
		assert_eq!(existing.len(), 1);
		assert!(missing.is_empty());
	}

	#[test]
	fn test_verify_buffer() {
		let data = b"hello world";
		assert!(verify_buffer(data, &util::hash(data)).is_ok());

		let actual = verify_buffer(data, &util::hash(b"other")).unwrap_err();
		assert_eq!(actual, util::hash(data));
	}
}

// vim: ts=4
