//! Event dispatch
//!
//! Turns a changed local file into one repository pipeline. The file name
//! decides the pipeline:
//!
//! | local file             | pipeline          | target             |
//! |------------------------|-------------------|--------------------|
//! | `dir/_cq_dialog.xml`   | content tree      | `/dir/cq:dialog`   |
//! | `dir/.content.xml`     | folder properties | `/dir`             |
//! | `dir/name.xml`         | content tree      | `/dir/name`        |
//! | anything else          | plain file        | `/dir/file`        |
//!
//! A content tree replaces its target. Folder properties are merged into
//! the existing folder, so its other children survive.
//!
//! Every pipeline runs inside the coordinator's exclusive region for its
//! target. Events for a target that is already being processed are folded
//! into a single rerun once the current pipeline finishes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::content::ContentTreeUploader;
use crate::coordinator::PathLockCoordinator;
use crate::descriptor::read_descriptor;
use crate::error::{SyncError, SyncResult};
use crate::folders::FolderMaterializer;
use crate::logging::*;
use crate::names::{self, CQ_FILE_PREFIX, DESCRIPTOR_EXTENSION, FOLDER_PROPERTIES_FILE, OCTET_STREAM};
use crate::path::RepositoryPath;
use crate::repository::{node_exists, RepositoryClient};
use crate::util::lock;

/// What a changed file means for the repository
///
/// Local paths are relative to the base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
	/// Replace the node at `target` with the tree declared in `descriptor`
	ContentTree { target: RepositoryPath, descriptor: PathBuf },

	/// Merge the folder tree declared in `descriptor` into `target` in place
	FolderProperties { target: RepositoryPath, descriptor: PathBuf },

	/// Upload `local` as a binary file node at `target`
	File { target: RepositoryPath, local: PathBuf },
}

impl Classification {
	pub fn target(&self) -> &RepositoryPath {
		match self {
			Classification::ContentTree { target, .. }
			| Classification::FolderProperties { target, .. }
			| Classification::File { target, .. } => target,
		}
	}

	/// The local file the pipeline reads, relative to the base directory
	pub fn local(&self) -> &Path {
		match self {
			Classification::ContentTree { descriptor, .. }
			| Classification::FolderProperties { descriptor, .. } => descriptor,
			Classification::File { local, .. } => local,
		}
	}
}

/// Classify a file by name
///
/// Directory names are mapped the same way node names are, so a file below
/// `_cq_dialog/` lands below `cq:dialog`.
pub fn classify(relative: &Path) -> SyncResult<Classification> {
	let invalid = |message: &str| SyncError::invalid_path(relative.to_string_lossy(), message);

	let file_name = relative
		.file_name()
		.ok_or_else(|| invalid("no file name"))?
		.to_str()
		.ok_or_else(|| invalid("file names must be valid UTF-8"))?;

	let dir = RepositoryPath::from_relative(relative.parent().unwrap_or_else(|| Path::new("")))?;
	let dir = dir
		.segments()
		.iter()
		.try_fold(RepositoryPath::root(), |path, segment| path.join(&names::node_name(segment)))?;

	if file_name == FOLDER_PROPERTIES_FILE {
		return Ok(Classification::FolderProperties { target: dir, descriptor: relative.to_path_buf() });
	}

	let stem = Path::new(file_name).file_stem().and_then(|s| s.to_str()).unwrap_or(file_name);
	let is_descriptor =
		Path::new(file_name).extension().map_or(false, |ext| ext == DESCRIPTOR_EXTENSION);

	if file_name.starts_with(CQ_FILE_PREFIX) || is_descriptor {
		let name = if is_descriptor { stem } else { file_name };
		let target = dir.join(&names::node_name(name))?;
		return Ok(Classification::ContentTree { target, descriptor: relative.to_path_buf() });
	}

	let target = dir.join(file_name)?;
	Ok(Classification::File { target, local: relative.to_path_buf() })
}

/// Result of one `dispatch` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
	/// The pipeline ran to completion, possibly more than once
	Uploaded,

	/// The local file was gone by the time the pipeline would have started
	Ignored,

	/// Another call for the same target was running and will rerun
	Coalesced,
}

pub struct Dispatcher {
	client: Arc<dyn RepositoryClient>,
	coordinator: Arc<PathLockCoordinator>,
	local_root: PathBuf,
	/// Targets being processed; `Some` holds the rerun queued behind them
	inflight: Mutex<HashMap<RepositoryPath, Option<Classification>>>,
}

impl Dispatcher {
	pub fn new(
		client: Arc<dyn RepositoryClient>,
		coordinator: Arc<PathLockCoordinator>,
		local_root: impl Into<PathBuf>,
	) -> Self {
		Dispatcher { client, coordinator, local_root: local_root.into(), inflight: Mutex::new(HashMap::new()) }
	}

	pub fn coordinator(&self) -> &Arc<PathLockCoordinator> {
		&self.coordinator
	}

	pub fn local_root(&self) -> &Path {
		&self.local_root
	}

	/// Classify `relative` and run its pipeline
	///
	/// Failures are logged with the path and cause, then returned.
	pub async fn dispatch(&self, relative: &Path) -> SyncResult<DispatchOutcome> {
		let classification = match classify(relative) {
			Ok(classification) => classification,
			Err(e) => {
				error!("Cannot sync {}: {}", relative.display(), e);
				return Err(e);
			}
		};
		let target = classification.target().clone();

		if !self.begin(&target, &classification) {
			debug!("{} is already being uploaded; queued a rerun", target);
			return Ok(DispatchOutcome::Coalesced);
		}

		let mut current = classification;
		let mut outcome = Ok(DispatchOutcome::Ignored);
		loop {
			match self.run(&current).await {
				Ok(DispatchOutcome::Ignored) => {}
				result => outcome = result,
			}

			match self.finish(&target) {
				Some(next) => {
					debug!("Rerunning {} for changes seen while uploading", target);
					current = next;
				}
				None => return outcome,
			}
		}
	}

	/// Register `target` as in flight, or queue a rerun if it already is
	fn begin(&self, target: &RepositoryPath, classification: &Classification) -> bool {
		let mut inflight = lock(&self.inflight);
		match inflight.get_mut(target) {
			Some(rerun) => {
				*rerun = Some(classification.clone());
				false
			}
			None => {
				inflight.insert(target.clone(), None);
				true
			}
		}
	}

	/// Take the queued rerun for `target`, or retire it
	fn finish(&self, target: &RepositoryPath) -> Option<Classification> {
		let mut inflight = lock(&self.inflight);
		let next = inflight.get_mut(target).and_then(Option::take);
		if next.is_none() {
			inflight.remove(target);
		}
		next
	}

	async fn run(&self, classification: &Classification) -> SyncResult<DispatchOutcome> {
		let target = classification.target();
		let relative = classification.local();
		let local = self.local_root.join(relative);

		match tokio::fs::metadata(&local).await {
			Ok(meta) if meta.is_file() => {}
			_ => {
				debug!("{} is gone, skipping", relative.display());
				return Ok(DispatchOutcome::Ignored);
			}
		}

		info!("Uploading {} to {}...", relative.display(), target);
		let result = match classification {
			Classification::ContentTree { .. } => self.upload_tree(target, &local).await,
			Classification::FolderProperties { .. } => self.update_folder(target, &local).await,
			Classification::File { .. } => self.upload_file(target, &local).await,
		};

		match result {
			Ok(()) => {
				info!("{} is uploaded", target);
				Ok(DispatchOutcome::Uploaded)
			}
			Err(e) => {
				error!("{} uploading is failed with error: {}", target, e);
				Err(e)
			}
		}
	}

	async fn upload_tree(&self, target: &RepositoryPath, descriptor: &Path) -> SyncResult<()> {
		let client: &dyn RepositoryClient = self.client.as_ref();
		let local_root = self.local_root.as_path();
		self.coordinator
			.run_exclusive(target.clone(), move |handle| async move {
				let tree = read_descriptor(descriptor).await?;
				let uploader = ContentTreeUploader::new(client, local_root);
				uploader.upload(target, &tree, &handle).await?;
				Ok(())
			})
			.await
	}

	async fn update_folder(&self, target: &RepositoryPath, descriptor: &Path) -> SyncResult<()> {
		let client: &dyn RepositoryClient = self.client.as_ref();
		let local_root = self.local_root.as_path();
		self.coordinator
			.run_exclusive(target.clone(), move |handle| async move {
				let tree = read_descriptor(descriptor).await?;
				let uploader = ContentTreeUploader::new(client, local_root);
				uploader.update_folder(target, &tree, &handle).await?;
				Ok(())
			})
			.await
	}

	async fn upload_file(&self, target: &RepositoryPath, local: &Path) -> SyncResult<()> {
		let client: &dyn RepositoryClient = self.client.as_ref();
		let local_root = self.local_root.as_path();
		self.coordinator
			.run_exclusive(target.clone(), move |handle| async move {
				FolderMaterializer::new(client, local_root).ensure_ancestors(target, &handle).await?;

				if node_exists(client, target).await? {
					debug!("File is already there, removing it...");
					client.remove_node(target).await.map_err(|e| SyncError::remote("removal", target, e))?;
				}

				client
					.upload_file(target, local, OCTET_STREAM, true)
					.await
					.map_err(|e| SyncError::remote("file upload", target, e))
			})
			.await
	}
}


// vim: ts=4
