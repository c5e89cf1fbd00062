//! Version vectors for detecting concurrent modification

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::DeviceId;

/// Result of comparing two version vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorOrdering {
	/// All counters equal
	Equal,
	/// Strictly dominated by the other vector
	Before,
	/// Strictly dominates the other vector
	After,
	/// Neither dominates; the versions were produced independently
	Concurrent,
}

/// A version vector: per-device monotonically increasing counters.
/// Devices absent from the map implicitly hold counter zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionVector {
	counters: BTreeMap<DeviceId, u64>,
}

impl VersionVector {
	pub fn new() -> Self {
		VersionVector { counters: BTreeMap::new() }
	}

	/// Increment the counter for the given device, returning the vector
	/// for chaining.
	pub fn update(mut self, id: DeviceId) -> Self {
		*self.counters.entry(id).or_insert(0) += 1;
		self
	}

	/// Get the counter for a device (zero if absent)
	pub fn counter(&self, id: DeviceId) -> u64 {
		self.counters.get(&id).copied().unwrap_or(0)
	}

	/// Compare two vectors under the standard vector-clock partial order.
	pub fn compare(&self, other: &VersionVector) -> VectorOrdering {
		let mut less = false;
		let mut greater = false;

		for (id, &a) in &self.counters {
			let b = other.counter(*id);
			if a < b {
				less = true;
			} else if a > b {
				greater = true;
			}
		}
		for (id, &b) in &other.counters {
			// Devices only the other side knows about count as zero here
			if b > 0 && !self.counters.contains_key(id) {
				less = true;
			}
		}

		match (less, greater) {
			(false, false) => VectorOrdering::Equal,
			(true, false) => VectorOrdering::Before,
			(false, true) => VectorOrdering::After,
			(true, true) => VectorOrdering::Concurrent,
		}
	}

	/// True if neither vector dominates the other, i.e. the two versions
	/// were produced without knowledge of each other.
	pub fn concurrent(&self, other: &VersionVector) -> bool {
		self.compare(other) == VectorOrdering::Concurrent
	}

	/// Merge another vector into this one, taking the maximum of each
	/// counter pair.
	pub fn merge(mut self, other: &VersionVector) -> Self {
		for (id, &b) in &other.counters {
			let a = self.counters.entry(*id).or_insert(0);
			if *a < b {
				*a = b;
			}
		}
		self
	}
}


// vim: ts=4
