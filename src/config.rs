//! Compile-time constants shared across the crate

/// Block size in bytes (128 KiB). Every block of a regular file except
/// possibly the last one has exactly this size.
pub const BLOCK_SIZE: usize = 128 * 1024;

/// Length in bytes of a block hash (SHA-256)
pub const HASH_LENGTH: usize = 32;

// vim: ts=4
