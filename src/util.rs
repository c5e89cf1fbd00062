//! Block hashing helpers

use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};

/// Hash a buffer with SHA-256, returning the raw 32-byte digest.
pub fn hash(buf: &[u8]) -> Vec<u8> {
	let mut hasher = Sha256::new();
	hasher.update(buf);
	hasher.finalize().to_vec()
}

/// Render a raw hash as base64 for logs and error messages.
pub fn hash_to_base64(hash: &[u8]) -> String {
	general_purpose::STANDARD.encode(hash)
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_hash_simple() {
		let res = hash(b"12");
		// echo -n 12 | sha256sum
		assert_eq!(res, hex("6b51d431df5d7f141cbececcf79edf3dd861c3b4069f0b11661a3eefacbba918"));
	}

	#[test]
	fn test_hash_empty() {
		let res = hash(b"");
		// echo -n "" | sha256sum
		assert_eq!(
			res,
			hex("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
		);
	}

	#[test]
	fn test_hash_length() {
		assert_eq!(hash(b"anything").len(), crate::config::HASH_LENGTH);
	}

	#[test]
	fn test_hash_consistency() {
		let src = b"test data";
		assert_eq!(hash(src), hash(src));
	}

	#[test]
	fn test_hash_different_inputs() {
		assert_ne!(hash(b"test1"), hash(b"test2"));
	}

	fn hex(s: &str) -> Vec<u8> {
		(0..s.len())
			.step_by(2)
			.map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
			.collect()
	}
}
