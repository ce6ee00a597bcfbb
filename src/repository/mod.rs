//! Remote repository access
//!
//! The synchronization core talks to the repository only through the
//! `RepositoryClient` trait. `SlingClient` speaks the Sling HTTP API;
//! `MemoryRepository` keeps everything in process and records each call.

use async_trait::async_trait;
use std::path::Path;

use crate::error::{RepositoryError, SyncError, SyncResult};
use crate::path::RepositoryPath;
use crate::properties::PropertyMap;

pub mod memory;
pub mod sling;

pub use memory::{MemoryNode, MemoryRepository, OpKind, RepositoryOp};
pub use sling::SlingClient;

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Node CRUD and file-upload primitives of a content repository
#[async_trait]
pub trait RepositoryClient: Send + Sync {
	/// Fetch the node at `path`; `RepositoryError::NotFound` if it is absent
	async fn get_node(&self, path: &RepositoryPath) -> RepositoryResult<()>;

	/// Create a node of the given primary type; the parent must exist
	async fn create_node(&self, path: &RepositoryPath, primary_type: &str) -> RepositoryResult<()>;

	/// Remove the node and its whole subtree
	async fn remove_node(&self, path: &RepositoryPath) -> RepositoryResult<()>;

	/// Set (add or overwrite) properties on an existing node
	async fn set_properties(
		&self,
		path: &RepositoryPath,
		properties: &PropertyMap,
	) -> RepositoryResult<()>;

	/// Upload a local file as a file node at `path`
	async fn upload_file(
		&self,
		path: &RepositoryPath,
		local_file: &Path,
		mime_type: &str,
		overwrite: bool,
	) -> RepositoryResult<()>;
}

/// Existence check: `NotFound` becomes `false`, anything else is an error
pub async fn node_exists(client: &dyn RepositoryClient, path: &RepositoryPath) -> SyncResult<bool> {
	match client.get_node(path).await {
		Ok(()) => Ok(true),
		Err(RepositoryError::NotFound) => Ok(false),
		Err(e) => Err(SyncError::remote("existence check", path, e)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_node_exists_maps_not_found() {
		let repo = MemoryRepository::new();
		let path = RepositoryPath::parse("/apps").unwrap();
		assert!(!node_exists(&repo, &path).await.unwrap());
		repo.insert_node("/apps", "nt:folder").unwrap();
		assert!(node_exists(&repo, &path).await.unwrap());
	}

	#[tokio::test]
	async fn test_node_exists_propagates_other_errors() {
		let repo = MemoryRepository::new();
		repo.fail_on(OpKind::Get, "/apps");
		let path = RepositoryPath::parse("/apps").unwrap();
		let err = node_exists(&repo, &path).await.unwrap_err();
		assert!(matches!(err, SyncError::RemoteOperationFailed { .. }));
	}
}

// vim: ts=4
