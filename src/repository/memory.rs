//! In-process repository
//!
//! Holds nodes in a sorted map and records every call in order, so the
//! sequence of remote operations a pipeline performs can be asserted
//! exactly. Failures can be injected per operation and path, and gates can
//! hold an operation until the test releases it.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use super::{RepositoryClient, RepositoryResult};
use crate::error::{RepositoryError, SyncResult};
use crate::path::RepositoryPath;
use crate::properties::PropertyMap;
use crate::util::lock;

/// Kind of repository operation, for failure injection and gates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
	Get,
	Create,
	Remove,
	SetProperties,
	Upload,
}

/// One recorded repository call
#[derive(Debug, Clone, PartialEq)]
pub enum RepositoryOp {
	Get { path: String },
	Create { path: String, primary_type: String },
	Remove { path: String },
	SetProperties { path: String, properties: PropertyMap },
	Upload { path: String, local_file: PathBuf, mime_type: String, overwrite: bool },
}

impl RepositoryOp {
	pub fn kind(&self) -> OpKind {
		match self {
			RepositoryOp::Get { .. } => OpKind::Get,
			RepositoryOp::Create { .. } => OpKind::Create,
			RepositoryOp::Remove { .. } => OpKind::Remove,
			RepositoryOp::SetProperties { .. } => OpKind::SetProperties,
			RepositoryOp::Upload { .. } => OpKind::Upload,
		}
	}

	pub fn path(&self) -> &str {
		match self {
			RepositoryOp::Get { path }
			| RepositoryOp::Create { path, .. }
			| RepositoryOp::Remove { path }
			| RepositoryOp::SetProperties { path, .. }
			| RepositoryOp::Upload { path, .. } => path,
		}
	}
}

/// Stored node state
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryNode {
	pub primary_type: String,
	pub properties: PropertyMap,
	pub content: Option<Vec<u8>>,
	pub mime_type: Option<String>,
}

impl MemoryNode {
	fn new(primary_type: &str) -> Self {
		MemoryNode {
			primary_type: primary_type.to_string(),
			properties: PropertyMap::new(),
			content: None,
			mime_type: None,
		}
	}
}

#[derive(Default)]
pub struct MemoryRepository {
	nodes: Mutex<BTreeMap<RepositoryPath, MemoryNode>>,
	log: Mutex<Vec<RepositoryOp>>,
	failures: Mutex<Vec<(OpKind, RepositoryPath)>>,
	gates: Mutex<Vec<(OpKind, RepositoryPath, Arc<Notify>)>>,
	latency: Option<Duration>,
}

impl MemoryRepository {
	/// Empty repository; only the root exists
	pub fn new() -> Self {
		Self::default()
	}

	/// Sleep this long inside every operation
	pub fn with_latency(mut self, latency: Duration) -> Self {
		self.latency = Some(latency);
		self
	}

	/// Seed a node without recording an operation
	pub fn insert_node(&self, path: &str, primary_type: &str) -> SyncResult<()> {
		let path = RepositoryPath::parse(path)?;
		lock(&self.nodes).insert(path, MemoryNode::new(primary_type));
		Ok(())
	}

	/// Make every `kind` operation on `path` fail with a 500
	pub fn fail_on(&self, kind: OpKind, path: &str) {
		if let Ok(path) = RepositoryPath::parse(path) {
			lock(&self.failures).push((kind, path));
		}
	}

	pub fn clear_failures(&self) {
		lock(&self.failures).clear();
	}

	/// Hold the next `kind` operation on `path` until the returned
	/// `Notify` is signalled
	pub fn gate(&self, kind: OpKind, path: &str) -> Arc<Notify> {
		let notify = Arc::new(Notify::new());
		if let Ok(path) = RepositoryPath::parse(path) {
			lock(&self.gates).push((kind, path, Arc::clone(&notify)));
		}
		notify
	}

	/// Every recorded call in order
	pub fn operations(&self) -> Vec<RepositoryOp> {
		lock(&self.log).clone()
	}

	/// Recorded calls except existence checks
	pub fn mutations(&self) -> Vec<RepositoryOp> {
		lock(&self.log).iter().filter(|op| op.kind() != OpKind::Get).cloned().collect()
	}

	pub fn clear_operations(&self) {
		lock(&self.log).clear();
	}

	pub fn node(&self, path: &str) -> Option<MemoryNode> {
		let path = RepositoryPath::parse(path).ok()?;
		lock(&self.nodes).get(&path).cloned()
	}

	pub fn contains(&self, path: &str) -> bool {
		match RepositoryPath::parse(path) {
			Ok(path) => path.is_root() || lock(&self.nodes).contains_key(&path),
			Err(_) => false,
		}
	}

	/// Copy of the whole tree keyed by rendered path
	pub fn snapshot(&self) -> BTreeMap<String, MemoryNode> {
		lock(&self.nodes).iter().map(|(path, node)| (path.to_string(), node.clone())).collect()
	}

	/// Record the call, then apply gates, latency and injected failures
	async fn enter(&self, op: RepositoryOp, path: &RepositoryPath) -> RepositoryResult<()> {
		let kind = op.kind();
		lock(&self.log).push(op);

		let gate = {
			let mut gates = lock(&self.gates);
			let index = gates.iter().position(|(k, p, _)| *k == kind && p == path);
			index.map(|i| gates.remove(i).2)
		};
		if let Some(gate) = gate {
			gate.notified().await;
		}

		match self.latency {
			Some(latency) => tokio::time::sleep(latency).await,
			None => tokio::task::yield_now().await,
		}

		if lock(&self.failures).iter().any(|(k, p)| *k == kind && p == path) {
			return Err(RepositoryError::Status {
				status: 500,
				message: format!("injected failure on {}", path),
			});
		}
		Ok(())
	}

	fn parent_exists(nodes: &BTreeMap<RepositoryPath, MemoryNode>, path: &RepositoryPath) -> bool {
		match path.parent() {
			Some(parent) => parent.is_root() || nodes.contains_key(&parent),
			None => true,
		}
	}
}

fn conflict(message: String) -> RepositoryError {
	RepositoryError::Status { status: 409, message }
}

#[async_trait]
impl RepositoryClient for MemoryRepository {
	async fn get_node(&self, path: &RepositoryPath) -> RepositoryResult<()> {
		self.enter(RepositoryOp::Get { path: path.to_string() }, path).await?;
		if path.is_root() || lock(&self.nodes).contains_key(path) {
			Ok(())
		} else {
			Err(RepositoryError::NotFound)
		}
	}

	async fn create_node(&self, path: &RepositoryPath, primary_type: &str) -> RepositoryResult<()> {
		let op = RepositoryOp::Create { path: path.to_string(), primary_type: primary_type.to_string() };
		self.enter(op, path).await?;

		let mut nodes = lock(&self.nodes);
		if path.is_root() || nodes.contains_key(path) {
			return Err(conflict(format!("{} already exists", path)));
		}
		if !Self::parent_exists(&nodes, path) {
			return Err(conflict(format!("parent of {} does not exist", path)));
		}
		nodes.insert(path.clone(), MemoryNode::new(primary_type));
		Ok(())
	}

	async fn remove_node(&self, path: &RepositoryPath) -> RepositoryResult<()> {
		self.enter(RepositoryOp::Remove { path: path.to_string() }, path).await?;

		if path.is_root() {
			return Err(RepositoryError::Status {
				status: 403,
				message: "the root cannot be removed".to_string(),
			});
		}
		let mut nodes = lock(&self.nodes);
		if !nodes.contains_key(path) {
			return Err(RepositoryError::NotFound);
		}
		nodes.retain(|p, _| p != path && !path.is_ancestor_of(p));
		Ok(())
	}

	async fn set_properties(
		&self,
		path: &RepositoryPath,
		properties: &PropertyMap,
	) -> RepositoryResult<()> {
		let op = RepositoryOp::SetProperties { path: path.to_string(), properties: properties.clone() };
		self.enter(op, path).await?;

		let mut nodes = lock(&self.nodes);
		let node = nodes.get_mut(path).ok_or(RepositoryError::NotFound)?;
		for (name, value) in properties {
			node.properties.insert(name.clone(), value.clone());
		}
		Ok(())
	}

	async fn upload_file(
		&self,
		path: &RepositoryPath,
		local_file: &Path,
		mime_type: &str,
		overwrite: bool,
	) -> RepositoryResult<()> {
		let op = RepositoryOp::Upload {
			path: path.to_string(),
			local_file: local_file.to_path_buf(),
			mime_type: mime_type.to_string(),
			overwrite,
		};
		self.enter(op, path).await?;

		let content = tokio::fs::read(local_file).await.map_err(|e| {
			RepositoryError::Other(format!("cannot read {}: {}", local_file.display(), e))
		})?;

		let mut nodes = lock(&self.nodes);
		if !Self::parent_exists(&nodes, path) {
			return Err(conflict(format!("parent of {} does not exist", path)));
		}
		if !overwrite && nodes.contains_key(path) {
			return Err(conflict(format!("{} already exists", path)));
		}
		let mut node = MemoryNode::new("nt:file");
		node.content = Some(content);
		node.mime_type = Some(mime_type.to_string());
		nodes.insert(path.clone(), node);
		Ok(())
	}
}


// vim: ts=4
