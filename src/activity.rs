//! Tracking of per-device request load
//!
//! Keeps an in-flight request count per device so block requests can be
//! spread across the devices that have the data, always preferring the
//! least loaded one.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::DeviceId;

/// Shared counter map of outstanding requests per device. One instance is
/// shared by all network pullers of a process.
#[derive(Debug, Default)]
pub struct DeviceActivity {
	counts: Mutex<HashMap<DeviceId, usize>>,
}

impl DeviceActivity {
	pub fn new() -> Self {
		DeviceActivity { counts: Mutex::new(HashMap::new()) }
	}

	/// Pick the candidate with the fewest outstanding requests. Ties go to
	/// the earliest candidate in the slice. Returns None for an empty
	/// candidate set.
	pub fn least_busy(&self, candidates: &[DeviceId]) -> Option<DeviceId> {
		let counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
		let mut selected: Option<DeviceId> = None;
		let mut low = usize::MAX;
		for id in candidates {
			let usage = counts.get(id).copied().unwrap_or(0);
			if usage < low {
				low = usage;
				selected = Some(*id);
			}
		}
		selected
	}

	/// Mark a request to the device as started
	pub fn using(&self, id: DeviceId) {
		let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
		*counts.entry(id).or_insert(0) += 1;
	}

	/// Mark a request to the device as finished. Calling this without a
	/// matching `using` is a programming error.
	pub fn done(&self, id: DeviceId) {
		let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
		let count = counts.entry(id).or_insert(0);
		debug_assert!(*count > 0, "done without using for device {}", id);
		*count = count.saturating_sub(1);
	}
}


// vim: ts=4
