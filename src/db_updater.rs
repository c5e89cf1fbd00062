//! Batched persistence of completed changes
//!
//! Committing every finished file to the database individually is too
//! chatty at high throughput. The updater collects completed `FileInfo`s
//! and flushes them either when the batch is full or when the oldest
//! buffered entry has waited long enough.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use crate::error::OpError;
use crate::logging::*;
use crate::progress::Progresser;
use crate::types::FileInfo;

const MAX_BATCH_SIZE: usize = 1000;
const MAX_BATCH_TIME: Duration = Duration::from_secs(2);

/// The persistence layer the updater flushes into.
pub trait Model: Send + Sync {
	/// Commit a batch of local file records, in arrival order
	fn update_locals(&self, folder: &str, files: &[FileInfo]);

	/// Note the most recently completed regular file, for "recently
	/// received" bookkeeping
	fn received_file(&self, folder: &str, file: &FileInfo);
}

/// Accepts completed files through its `Progresser` impl and commits them
/// to the model in batches from a background task. Must be created inside
/// a tokio runtime.
pub struct DatabaseUpdater {
	updates: Mutex<Option<mpsc::UnboundedSender<FileInfo>>>,
	runner: Mutex<Option<JoinHandle<()>>>,
}

impl DatabaseUpdater {
	pub fn new(folder: &str, model: Arc<dyn Model>) -> Self {
		let (tx, rx) = mpsc::unbounded_channel();
		let handle = tokio::spawn(run(folder.to_string(), model, rx));
		DatabaseUpdater { updates: Mutex::new(Some(tx)), runner: Mutex::new(Some(handle)) }
	}

	/// Stop accepting updates, flush whatever is still buffered, and wait
	/// for the background task to finish.
	pub async fn close(&self) {
		self.updates.lock().unwrap_or_else(|e| e.into_inner()).take();
		let handle = self.runner.lock().unwrap_or_else(|e| e.into_inner()).take();
		if let Some(handle) = handle {
			let _ = handle.await;
		}
	}
}

impl Progresser for DatabaseUpdater {
	fn started(&self, _file: &FileInfo) {}

	fn progress(&self, _file: &FileInfo, _copied: i64, _requested: i64, _downloaded: i64) {}

	fn completed(&self, file: &FileInfo, err: Option<&OpError>) {
		if err.is_some() {
			return;
		}
		if let Some(tx) = self.updates.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
			let mut file = file.clone();
			// Renumbered when the database assigns its own sequence
			file.local_version = 0;
			let _ = tx.send(file);
		}
	}
}

async fn run(folder: String, model: Arc<dyn Model>, mut updates: mpsc::UnboundedReceiver<FileInfo>) {
	let mut batch: Vec<FileInfo> = Vec::with_capacity(MAX_BATCH_SIZE);
	let mut last_received: Option<FileInfo> = None;
	let mut next_commit = interval_at(Instant::now() + MAX_BATCH_TIME, MAX_BATCH_TIME);

	loop {
		tokio::select! {
			update = updates.recv() => {
				let Some(update) = update else {
					break;
				};

				if !update.is_directory()
					&& !update.is_deleted()
					&& !update.is_invalid()
					&& !update.is_symlink()
				{
					last_received = Some(update.clone());
				}

				batch.push(update);
				if batch.len() == MAX_BATCH_SIZE {
					commit(&folder, model.as_ref(), &mut batch, &mut last_received);
					next_commit.reset();
				}
			}

			_ = next_commit.tick() => {
				if !batch.is_empty() {
					commit(&folder, model.as_ref(), &mut batch, &mut last_received);
				}
			}
		}
	}

	if !batch.is_empty() {
		commit(&folder, model.as_ref(), &mut batch, &mut last_received);
	}
}

fn commit(
	folder: &str,
	model: &dyn Model,
	batch: &mut Vec<FileInfo>,
	last_received: &mut Option<FileInfo>,
) {
	debug!("committing batch of {} updates", batch.len());
	model.update_locals(folder, batch);
	if let Some(file) = last_received.take() {
		model.received_file(folder, &file);
	}

	// Drop the entries (and their block lists) right away but keep the
	// buffer allocation for the next batch.
	batch.clear();
}

// vim: ts=4
