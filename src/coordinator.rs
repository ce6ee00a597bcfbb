//! Path-lock coordinator
//!
//! Serializes uploads whose target paths could race on folder creation
//! while letting independent subtrees proceed.
//!
//! Every operation inside `run_exclusive` owns an upload signal for its
//! path. A new operation subscribes to every live signal with the closest
//! ancestor it shares with that signal's owner, and waits. It is woken
//! either when the owner finishes (full release) or when the owner announces
//! that an ancestor at or below the shared one is settled (partial release).
//! The Folder Materializer makes those announcements level by level as it
//! creates missing folders, and confirms each folder once it exists. Only
//! confirmed folders let later subscribers through without waiting.
//!
//! All bookkeeping happens under one mutex that is never held across an
//! await, so registering, releasing and waking are atomic with respect to
//! each other. There is no timeout: a pipeline that never finishes blocks
//! every overlapping waiter.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::mem;
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, watch};

use crate::error::SyncResult;
use crate::logging::*;
use crate::path::RepositoryPath;
use crate::util::lock;

/// Announces that an ancestor of the running operation's target is settled
pub trait PartialRelease: Send + Sync {
	/// Wake the current waiters covered by `settled`, which is about to be created
	fn release_partial(&self, settled: &RepositoryPath);

	/// `settled` now exists remotely; waiters arriving from here on pass it
	fn confirm_settled(&self, _settled: &RepositoryPath) {}
}

/// Discards announcements, for pipelines run without a coordinator
pub struct NoRelease;

impl PartialRelease for NoRelease {
	fn release_partial(&self, _settled: &RepositoryPath) {}
}

/// A waiter blocked on someone else's signal
struct Subscriber {
	waiter: RepositoryPath,
	required: RepositoryPath,
	wake: oneshot::Sender<()>,
}

/// A waiter needing `required` is unblocked once `settled` sits at or below
/// it. Compared by segment count, not by string length.
fn is_satisfied(required: &RepositoryPath, settled: &RepositoryPath) -> bool {
	required.closest_shared_ancestor(settled).depth() >= required.depth()
}

struct UploadSignal {
	id: u64,
	owner: RepositoryPath,
	/// Ancestors confirmed to exist, so late subscribers need not wait for them
	settled: Vec<RepositoryPath>,
	subscribers: Vec<Subscriber>,
	completion: watch::Sender<bool>,
}

impl UploadSignal {
	fn new(id: u64, owner: RepositoryPath) -> Self {
		let (completion, _) = watch::channel(false);
		UploadSignal { id, owner, settled: Vec::new(), subscribers: Vec::new(), completion }
	}

	fn settles(&self, required: &RepositoryPath) -> bool {
		self.settled.iter().any(|settled| is_satisfied(required, settled))
	}
}

#[derive(Default)]
struct SignalTable {
	live: HashMap<RepositoryPath, UploadSignal>,
	next_id: u64,
}

/// A subscription registered by `acquire`
struct Pending {
	id: u64,
	owner: RepositoryPath,
	required: RepositoryPath,
	wake: oneshot::Receiver<()>,
}

#[derive(Default)]
pub struct PathLockCoordinator {
	table: Mutex<SignalTable>,
}

impl PathLockCoordinator {
	pub fn new() -> Self {
		Self::default()
	}

	/// Wait until no live signal blocks `path`, then register one for it
	pub async fn acquire(self: &Arc<Self>, path: &RepositoryPath) -> ExclusiveGuard {
		// Signals that already let this waiter through, by id
		let mut cleared: HashSet<u64> = HashSet::new();
		loop {
			let pending = match self.try_enter(path, &mut cleared) {
				Ok(id) => {
					debug!("Acquired {}", path);
					let handle = SignalHandle { coordinator: Arc::clone(self), owner: path.clone(), id };
					return ExclusiveGuard { handle, released: false };
				}
				Err(pending) => pending,
			};

			for Pending { id, owner, required, wake } in pending {
				debug!("{} waits for {} to settle {}", path, owner, required);
				// A dropped sender means the signal is gone, which also unblocks
				let _ = wake.await;
				cleared.insert(id);
			}
		}
	}

	fn try_enter(
		&self,
		path: &RepositoryPath,
		cleared: &mut HashSet<u64>,
	) -> Result<u64, Vec<Pending>> {
		let mut table = lock(&self.table);

		let mut pending = Vec::new();
		for signal in table.live.values_mut() {
			if cleared.contains(&signal.id) {
				continue;
			}
			let required = signal.owner.closest_shared_ancestor(path);
			if signal.settles(&required) {
				cleared.insert(signal.id);
				continue;
			}
			let (wake_tx, wake_rx) = oneshot::channel();
			signal.subscribers.push(Subscriber {
				waiter: path.clone(),
				required: required.clone(),
				wake: wake_tx,
			});
			pending.push(Pending { id: signal.id, owner: signal.owner.clone(), required, wake: wake_rx });
		}
		if !pending.is_empty() {
			return Err(pending);
		}

		let id = table.next_id;
		table.next_id += 1;
		table.live.insert(path.clone(), UploadSignal::new(id, path.clone()));
		Ok(id)
	}

	/// Announce that `settled`, an ancestor of `owner`, is guaranteed to exist
	///
	/// Wakes every subscriber of `owner`'s signal whose required ancestor is
	/// covered by `settled`; the others stay queued.
	pub fn release_partial(&self, owner: &RepositoryPath, settled: &RepositoryPath) {
		self.release_partial_for(owner, None, settled, false);
	}

	/// Record that `settled`, an ancestor of `owner`, exists remotely
	///
	/// Wakes the covered subscribers that queued after the announcement, and
	/// lets later ones through without waiting.
	pub fn confirm_settled(&self, owner: &RepositoryPath, settled: &RepositoryPath) {
		self.release_partial_for(owner, None, settled, true);
	}

	fn release_partial_for(
		&self,
		owner: &RepositoryPath,
		id: Option<u64>,
		settled: &RepositoryPath,
		confirmed: bool,
	) {
		if !settled.is_ancestor_of(owner) {
			warn!("Ignoring partial release of {}: not an ancestor of {}", settled, owner);
			return;
		}

		let ready: Vec<Subscriber> = {
			let mut table = lock(&self.table);
			let signal = match table.live.get_mut(owner) {
				Some(signal) if id.map_or(true, |id| id == signal.id) => signal,
				_ => return,
			};
			if confirmed && !signal.settled.contains(settled) {
				signal.settled.push(settled.clone());
			}
			let (ready, waiting): (Vec<_>, Vec<_>) = mem::take(&mut signal.subscribers)
				.into_iter()
				.partition(|subscriber| is_satisfied(&subscriber.required, settled));
			signal.subscribers = waiting;
			ready
		};

		for subscriber in ready {
			debug!("{} settled {}; releasing {}", owner, settled, subscriber.waiter);
			let _ = subscriber.wake.send(());
		}
	}

	/// Retire `owner`'s signal and wake every remaining subscriber
	pub fn release_full(&self, owner: &RepositoryPath) -> bool {
		self.release_full_for(owner, None)
	}

	fn release_full_for(&self, owner: &RepositoryPath, id: Option<u64>) -> bool {
		let signal = {
			let mut table = lock(&self.table);
			let current = table.live.get(owner).map_or(false, |signal| id.map_or(true, |id| id == signal.id));
			if current {
				table.live.remove(owner)
			} else {
				None
			}
		};

		match signal {
			Some(signal) => {
				debug!("Released {} ({} waiting)", owner, signal.subscribers.len());
				signal.completion.send_replace(true);
				for subscriber in signal.subscribers {
					let _ = subscriber.wake.send(());
				}
				true
			}
			None => false,
		}
	}

	/// Acquire `path`, run `pipeline`, and release on every exit path
	///
	/// The pipeline gets a handle for partial releases. Its error, if any,
	/// is returned after the release.
	pub async fn run_exclusive<F, Fut, T>(self: &Arc<Self>, path: RepositoryPath, pipeline: F) -> SyncResult<T>
	where
		F: FnOnce(SignalHandle) -> Fut,
		Fut: Future<Output = SyncResult<T>>,
	{
		let guard = self.acquire(&path).await;
		let result = pipeline(guard.handle()).await;
		guard.release();
		result
	}

	pub fn is_live(&self, path: &RepositoryPath) -> bool {
		lock(&self.table).live.contains_key(path)
	}

	pub fn live_paths(&self) -> Vec<RepositoryPath> {
		let mut paths: Vec<_> = lock(&self.table).live.keys().cloned().collect();
		paths.sort();
		paths
	}

	/// Number of waiters queued on `path`'s signal
	pub fn waiting_on(&self, path: &RepositoryPath) -> usize {
		lock(&self.table).live.get(path).map_or(0, |signal| signal.subscribers.len())
	}

	/// Resolve once the signal currently live for `path` is fully released
	pub async fn wait_released(&self, path: &RepositoryPath) {
		let completion = lock(&self.table).live.get(path).map(|signal| signal.completion.subscribe());
		if let Some(mut completion) = completion {
			let _ = completion.wait_for(|done| *done).await;
		}
	}
}

/// Cloneable handle to one live signal, for partial releases
#[derive(Clone)]
pub struct SignalHandle {
	coordinator: Arc<PathLockCoordinator>,
	owner: RepositoryPath,
	id: u64,
}

impl SignalHandle {
	pub fn path(&self) -> &RepositoryPath {
		&self.owner
	}
}

impl PartialRelease for SignalHandle {
	fn release_partial(&self, settled: &RepositoryPath) {
		self.coordinator.release_partial_for(&self.owner, Some(self.id), settled, false);
	}

	fn confirm_settled(&self, settled: &RepositoryPath) {
		self.coordinator.release_partial_for(&self.owner, Some(self.id), settled, true);
	}
}

/// Ownership of an exclusive region; released fully on drop
pub struct ExclusiveGuard {
	handle: SignalHandle,
	released: bool,
}

impl ExclusiveGuard {
	pub fn path(&self) -> &RepositoryPath {
		&self.handle.owner
	}

	pub fn handle(&self) -> SignalHandle {
		self.handle.clone()
	}

	pub fn release(mut self) {
		self.release_now();
	}

	fn release_now(&mut self) {
		if !self.released {
			self.released = true;
			self.handle.coordinator.release_full_for(&self.handle.owner, Some(self.handle.id));
		}
	}
}

impl PartialRelease for ExclusiveGuard {
	fn release_partial(&self, settled: &RepositoryPath) {
		self.handle.release_partial(settled);
	}

	fn confirm_settled(&self, settled: &RepositoryPath) {
		self.handle.confirm_settled(settled);
	}
}

impl Drop for ExclusiveGuard {
	fn drop(&mut self) {
		self.release_now();
	}
}


// vim: ts=4
