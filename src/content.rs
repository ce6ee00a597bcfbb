//! Content tree upload
//!
//! Replaces the node at a target path with the tree a descriptor declares:
//! ancestors are ensured, the old node is deleted, a fresh node of the
//! declared primary type is created, and the children are materialized
//! depth-first in document order.
//!
//! Folder properties (`.content.xml`) go through `update_folder` instead,
//! which merges the declared tree into the existing folder and never
//! deletes anything.
//!
//! Siblings are processed strictly one after another; each child's whole
//! subtree is finished before the next sibling starts. A failure aborts the
//! rest of the tree without rolling back what was already created.

use futures::future::{BoxFuture, FutureExt};
use std::collections::HashSet;
use std::path::Path;

use crate::coordinator::PartialRelease;
use crate::descriptor::ContentNode;
use crate::error::{SyncError, SyncResult};
use crate::folders::FolderMaterializer;
use crate::logging::*;
use crate::names::{DEFAULT_FOLDER_TYPE, DEFAULT_NODE_TYPE};
use crate::path::RepositoryPath;
use crate::properties::translate_properties;
use crate::repository::{node_exists, RepositoryClient};

pub struct ContentTreeUploader<'a> {
	client: &'a dyn RepositoryClient,
	folders: FolderMaterializer<'a>,
}

impl<'a> ContentTreeUploader<'a> {
	pub fn new(client: &'a dyn RepositoryClient, local_root: &'a Path) -> Self {
		ContentTreeUploader { client, folders: FolderMaterializer::new(client, local_root) }
	}

	/// Replace the node at `target` with `tree`
	///
	/// The repository root is never deleted or recreated; for `/` only the
	/// properties and children are materialized.
	pub async fn upload(
		&self,
		target: &RepositoryPath,
		tree: &ContentNode,
		release: &dyn PartialRelease,
	) -> SyncResult<()> {
		if !target.is_root() {
			self.folders.ensure_ancestors(target, release).await?;

			if node_exists(self.client, target).await? {
				debug!("{} is already there, removing it...", target);
				self.client
					.remove_node(target)
					.await
					.map_err(|e| SyncError::remote("removal", target, e))?;
			}

			let primary_type = tree.primary_type().unwrap_or(DEFAULT_NODE_TYPE);
			debug!("Creating {} ({})", target, primary_type);
			self.client
				.create_node(target, primary_type)
				.await
				.map_err(|e| SyncError::remote("node creation", target, e))?;
		}

		self.materialize(target, tree).await
	}

	/// Merge `tree` into the folder at `target`, creating it if missing
	///
	/// Nothing below `target` is removed, so files and nodes the descriptor
	/// does not mention survive.
	pub async fn update_folder(
		&self,
		target: &RepositoryPath,
		tree: &ContentNode,
		release: &dyn PartialRelease,
	) -> SyncResult<()> {
		if !target.is_root() {
			self.folders.ensure_ancestors(target, release).await?;

			if !node_exists(self.client, target).await? {
				let primary_type = tree.primary_type().unwrap_or(DEFAULT_FOLDER_TYPE);
				debug!("Creating {} ({})", target, primary_type);
				self.client
					.create_node(target, primary_type)
					.await
					.map_err(|e| SyncError::remote("folder creation", target, e))?;
			}
		}

		self.materialize(target, tree).await
	}

	/// Set `node`'s properties on `path`, then build its children in order
	pub fn materialize<'b>(
		&'b self,
		path: &'b RepositoryPath,
		node: &'b ContentNode,
	) -> BoxFuture<'b, SyncResult<()>> {
		async move {
			let properties = translate_properties(node.attributes());
			if !properties.is_empty() {
				debug!("Setting {} properties on {}", properties.len(), path);
				self.client
					.set_properties(path, &properties)
					.await
					.map_err(|e| SyncError::remote("property update", path, e))?;
			}

			let mut seen: HashSet<&str> = HashSet::new();
			for (tag, child) in node.children() {
				if !seen.insert(tag.as_str()) {
					warn!("Duplicate child <{}> under {}; only the first one is uploaded", tag, path);
					continue;
				}

				let child_path = path.join(tag)?;
				if !node_exists(self.client, &child_path).await? {
					let primary_type = child.primary_type().unwrap_or(DEFAULT_NODE_TYPE);
					debug!("Creating {} ({})", child_path, primary_type);
					self.client
						.create_node(&child_path, primary_type)
						.await
						.map_err(|e| SyncError::remote("node creation", &child_path, e))?;
				}
				self.materialize(&child_path, child).await?;
			}
			Ok(())
		}
		.boxed()
	}
}


// vim: ts=4
