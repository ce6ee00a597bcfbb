//! Folder materialization
//!
//! Makes sure every ancestor of a target path exists remotely, creating
//! missing folders top-down. A missing folder takes its primary type from a
//! `.content.xml` in the matching local directory when one is present and
//! parseable, and is an `nt:folder` otherwise.
//!
//! Each missing ancestor is announced to the coordinator before it is
//! created, so waiters whose concern was only that ancestor can proceed,
//! and confirmed once the create succeeded. Ancestors that already exist
//! are neither announced nor confirmed.

use std::path::{Path, PathBuf};

use crate::coordinator::PartialRelease;
use crate::descriptor::read_descriptor;
use crate::error::{SyncError, SyncResult};
use crate::logging::*;
use crate::names::{self, DEFAULT_FOLDER_TYPE, FOLDER_PROPERTIES_FILE};
use crate::path::RepositoryPath;
use crate::repository::{node_exists, RepositoryClient};

pub struct FolderMaterializer<'a> {
	client: &'a dyn RepositoryClient,
	local_root: &'a Path,
}

impl<'a> FolderMaterializer<'a> {
	pub fn new(client: &'a dyn RepositoryClient, local_root: &'a Path) -> Self {
		FolderMaterializer { client, local_root }
	}

	/// Create every missing ancestor of `target`, shortest first
	///
	/// Returns once the immediate parent exists. The first failing check or
	/// creation aborts the whole operation.
	pub async fn ensure_ancestors(
		&self,
		target: &RepositoryPath,
		release: &dyn PartialRelease,
	) -> SyncResult<()> {
		let parent = match target.parent() {
			Some(parent) => parent,
			None => return Ok(()),
		};

		for ancestor in parent.prefixes() {
			debug!("Check if {} exists...", ancestor);
			if node_exists(self.client, &ancestor).await? {
				debug!("It does, move on");
				continue;
			}

			release.release_partial(&ancestor);

			let primary_type = self.folder_type(&ancestor).await;
			debug!("Creating {} ({})...", ancestor, primary_type);
			self.client
				.create_node(&ancestor, &primary_type)
				.await
				.map_err(|e| SyncError::remote("folder creation", &ancestor, e))?;
			release.confirm_settled(&ancestor);
		}
		Ok(())
	}

	/// Local directory mirroring `path`
	pub fn local_dir(&self, path: &RepositoryPath) -> PathBuf {
		path.segments().iter().fold(self.local_root.to_path_buf(), |dir, segment| {
			dir.join(names::file_name(segment))
		})
	}

	async fn folder_type(&self, folder: &RepositoryPath) -> String {
		let descriptor = self.local_dir(folder).join(FOLDER_PROPERTIES_FILE);
		match tokio::fs::metadata(&descriptor).await {
			Ok(meta) if meta.is_file() => {}
			_ => return DEFAULT_FOLDER_TYPE.to_string(),
		}

		match read_descriptor(&descriptor).await {
			Ok(node) => node.primary_type().unwrap_or(DEFAULT_FOLDER_TYPE).to_string(),
			Err(e) => {
				warn!("{}; creating {} as {}", e, folder, DEFAULT_FOLDER_TYPE);
				DEFAULT_FOLDER_TYPE.to_string()
			}
		}
	}
}


// vim: ts=4
