//! Watching the local tree
//!
//! A recursive `notify` watcher feeds raw events through an unbounded
//! channel. Each event is narrowed to the files it names, re-validated
//! against the local disk and handed to the dispatcher on its own task.

use notify::event::{AccessKind, AccessMode, ModifyKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::coordinator::PathLockCoordinator;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::error::{SyncError, SyncResult};
use crate::exclusion::PatternMatcher;
use crate::logging::*;
use crate::repository::RepositoryClient;
use crate::util::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
	Create,
	Modify,
	Remove,
	Rename,
	Other,
}

impl FileEventKind {
	pub fn past_tense(&self) -> &'static str {
		match self {
			FileEventKind::Create => "created",
			FileEventKind::Modify => "changed",
			FileEventKind::Remove => "removed",
			FileEventKind::Rename => "renamed",
			FileEventKind::Other => "touched",
		}
	}
}

/// A change to one path below the base directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
	pub kind: FileEventKind,
	pub relative_path: PathBuf,
}

impl FileEvent {
	pub fn new(kind: FileEventKind, relative_path: impl Into<PathBuf>) -> Self {
		FileEvent { kind, relative_path: relative_path.into() }
	}

	/// One event per path of `event` that lies below `base`
	///
	/// Plain reads are dropped; a write-close counts as a modification.
	pub fn from_notify(event: &Event, base: &Path) -> Vec<FileEvent> {
		let kind = match event.kind {
			EventKind::Create(_) => FileEventKind::Create,
			EventKind::Modify(ModifyKind::Name(_)) => FileEventKind::Rename,
			EventKind::Modify(_) => FileEventKind::Modify,
			EventKind::Access(AccessKind::Close(AccessMode::Write)) => FileEventKind::Modify,
			EventKind::Access(_) => return vec![],
			EventKind::Remove(_) => FileEventKind::Remove,
			EventKind::Any | EventKind::Other => FileEventKind::Other,
		};

		event
			.paths
			.iter()
			.filter_map(|path| path.strip_prefix(base).ok())
			.filter(|relative| !relative.as_os_str().is_empty())
			.map(|relative| FileEvent::new(kind, relative))
			.collect()
	}
}

/// Recently reported paths that were gone by the time they were checked
///
/// Kept only to tell deletes from renames when reading the logs; once full
/// the oldest entry is dropped.
pub struct MissingLog {
	entries: VecDeque<PathBuf>,
	capacity: usize,
}

impl MissingLog {
	pub fn new(capacity: usize) -> Self {
		MissingLog { entries: VecDeque::with_capacity(capacity.min(1024)), capacity }
	}

	pub fn record(&mut self, path: PathBuf) {
		if self.capacity == 0 {
			return;
		}
		while self.entries.len() >= self.capacity {
			self.entries.pop_front();
		}
		self.entries.push_back(path);
	}

	pub fn contains(&self, path: &Path) -> bool {
		self.entries.iter().any(|entry| entry == path)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

/// Decides which events reach the dispatcher
pub struct EventFilter {
	base: PathBuf,
	matcher: PatternMatcher,
	missing: Mutex<MissingLog>,
}

impl EventFilter {
	pub fn new(base: impl Into<PathBuf>, matcher: PatternMatcher, missing_capacity: usize) -> Self {
		EventFilter { base: base.into(), matcher, missing: Mutex::new(MissingLog::new(missing_capacity)) }
	}

	/// Re-validate `event` against the local disk
	///
	/// Excluded paths, paths that no longer exist and anything that is not a
	/// regular file are rejected.
	pub async fn accept(&self, event: &FileEvent) -> bool {
		let relative = &event.relative_path;
		if self.matcher.is_excluded(relative) {
			trace!("Excluded: {}", relative.display());
			return false;
		}

		let meta = match tokio::fs::metadata(self.base.join(relative)).await {
			Ok(meta) => meta,
			Err(_) => {
				debug!("{} {} but is gone", relative.display(), event.kind.past_tense());
				lock(&self.missing).record(relative.clone());
				return false;
			}
		};
		if !meta.is_file() {
			return false;
		}

		info!("{} {}", relative.display(), event.kind.past_tense());
		true
	}

	pub fn was_missing(&self, relative: &Path) -> bool {
		lock(&self.missing).contains(relative)
	}

	pub fn missing_count(&self) -> usize {
		lock(&self.missing).len()
	}
}

/// Recursive watcher on one directory
pub struct TreeWatcher {
	_watcher: RecommendedWatcher,
	events: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl TreeWatcher {
	pub fn new(base: &Path) -> SyncResult<Self> {
		let (events_tx, events) = mpsc::unbounded_channel();
		let mut watcher = RecommendedWatcher::new(
			move |result| {
				if events_tx.send(result).is_err() {
					error!("Tried to send file system events to a closed channel");
				}
			},
			notify::Config::default(),
		)?;
		watcher.watch(base, RecursiveMode::Recursive)?;
		Ok(TreeWatcher { _watcher: watcher, events })
	}

	pub async fn next(&mut self) -> Option<notify::Result<Event>> {
		self.events.recv().await
	}
}

/// Everything one sync loop needs, wired together
pub struct SyncSession {
	base: PathBuf,
	filter: EventFilter,
	dispatcher: Arc<Dispatcher>,
}

impl SyncSession {
	pub fn new(config: &Config, client: Arc<dyn RepositoryClient>) -> SyncResult<Self> {
		let base = std::fs::canonicalize(&config.base).map_err(|e| SyncError::local_io(&config.base, e))?;
		let matcher = PatternMatcher::new(&config.exclude_patterns)?;
		let filter = EventFilter::new(base.clone(), matcher, config.missing_log_capacity);
		let dispatcher = Arc::new(Dispatcher::new(client, Arc::new(PathLockCoordinator::new()), base.clone()));
		Ok(SyncSession { base, filter, dispatcher })
	}

	pub fn base(&self) -> &Path {
		&self.base
	}

	pub fn filter(&self) -> &EventFilter {
		&self.filter
	}

	pub fn dispatcher(&self) -> &Arc<Dispatcher> {
		&self.dispatcher
	}

	/// Start watching the base directory
	pub fn watch(&self) -> SyncResult<TreeWatcher> {
		TreeWatcher::new(&self.base)
	}

	/// Filter `event` and, if accepted, dispatch it on a new task
	pub async fn handle(&self, event: FileEvent) -> Option<JoinHandle<SyncResult<DispatchOutcome>>> {
		if !self.filter.accept(&event).await {
			return None;
		}
		let dispatcher = Arc::clone(&self.dispatcher);
		Some(tokio::spawn(async move { dispatcher.dispatch(&event.relative_path).await }))
	}

	/// Process events from `watcher` until `shutdown` resolves
	pub async fn run_until<F>(&self, mut watcher: TreeWatcher, shutdown: F) -> SyncResult<()>
	where
		F: Future,
	{
		info!("Start syncing on {}", self.base.display());
		tokio::pin!(shutdown);
		loop {
			tokio::select! {
				_ = &mut shutdown => {
					info!("Stopped syncing on {}", self.base.display());
					return Ok(());
				}
				event = watcher.next() => {
					match event {
						Some(Ok(event)) => {
							for file_event in FileEvent::from_notify(&event, &self.base) {
								// Failures are logged by the dispatcher
								let _ = self.handle(file_event).await;
							}
						}
						Some(Err(e)) => error!("Watcher error: {}", e),
						None => {
							return Err(SyncError::Watch { message: "event channel closed".to_string() });
						}
					}
				}
			}
		}
	}
}

/// Watch `config.base` and mirror every change until Ctrl-C
pub async fn run(config: &Config, client: Arc<dyn RepositoryClient>) -> SyncResult<()> {
	let session = SyncSession::new(config, client)?;
	let watcher = session.watch()?;
	info!("Uploading changes to {}", config.base_url());
	session.run_until(watcher, tokio::signal::ctrl_c()).await
}


// vim: ts=4
