//! Progress reporting for reconciliation operations

use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::OpError;
use crate::types::FileInfo;

/// Receives life-cycle and byte-level progress events from the writer.
/// `progress` deltas are signed: a positive `requested` announces a network
/// fetch, a matching negative delta rolls it back when the fetch completes
/// or fails. Implementations must tolerate interleaved calls from writers
/// working on different files.
pub trait Progresser: Send + Sync {
	fn started(&self, file: &FileInfo);
	fn progress(&self, file: &FileInfo, copied: i64, requested: i64, downloaded: i64);
	fn completed(&self, file: &FileInfo, err: Option<&OpError>);
}

/// Keeps running byte totals across all files, for status display.
#[derive(Debug, Default)]
pub struct TransferTotals {
	copied: AtomicI64,
	requested: AtomicI64,
	downloaded: AtomicI64,
}

impl TransferTotals {
	pub fn new() -> Self {
		TransferTotals::default()
	}

	/// Bytes satisfied from local sources (existing temp content or other
	/// local files)
	pub fn copied(&self) -> i64 {
		self.copied.load(Ordering::Relaxed)
	}

	/// Bytes currently requested from the network and not yet resolved
	pub fn requested(&self) -> i64 {
		self.requested.load(Ordering::Relaxed)
	}

	/// Bytes successfully downloaded from the network
	pub fn downloaded(&self) -> i64 {
		self.downloaded.load(Ordering::Relaxed)
	}
}

impl Progresser for TransferTotals {
	fn started(&self, _file: &FileInfo) {}

	fn progress(&self, _file: &FileInfo, copied: i64, requested: i64, downloaded: i64) {
		self.copied.fetch_add(copied, Ordering::Relaxed);
		self.requested.fetch_add(requested, Ordering::Relaxed);
		self.downloaded.fetch_add(downloaded, Ordering::Relaxed);
	}

	fn completed(&self, _file: &FileInfo, _err: Option<&OpError>) {}
}


// vim: ts=4
