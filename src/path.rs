//! Repository paths
//!
//! A `RepositoryPath` is a slash-delimited absolute path into the remote
//! content tree. The root is `/`. Paths are compared by segment, so the
//! closest shared ancestor of any two paths is always defined.

use std::fmt;
use std::path::{Component, Path};

use crate::error::{SyncError, SyncResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepositoryPath {
	segments: Vec<String>,
}

impl RepositoryPath {
	/// The repository root `/`
	pub fn root() -> Self {
		RepositoryPath { segments: Vec::new() }
	}

	/// Parse an absolute slash-delimited path
	///
	/// Repeated and trailing slashes are collapsed. `.` and `..` segments are
	/// rejected.
	pub fn parse(path: &str) -> SyncResult<Self> {
		if !path.starts_with('/') {
			return Err(SyncError::invalid_path(path, "repository paths must be absolute"));
		}
		let mut segments = Vec::new();
		for segment in path.split('/').filter(|s| !s.is_empty()) {
			if segment == "." || segment == ".." {
				return Err(SyncError::invalid_path(path, "relative segments are not allowed"));
			}
			segments.push(segment.to_string());
		}
		Ok(RepositoryPath { segments })
	}

	/// Map a path relative to the local base directory onto the repository
	pub fn from_relative(relative: &Path) -> SyncResult<Self> {
		let mut segments = Vec::new();
		for component in relative.components() {
			match component {
				Component::Normal(name) => {
					let name = name.to_str().ok_or_else(|| {
						SyncError::invalid_path(
							relative.to_string_lossy(),
							"file names must be valid UTF-8",
						)
					})?;
					segments.push(name.to_string());
				}
				Component::CurDir => {}
				_ => {
					return Err(SyncError::invalid_path(
						relative.to_string_lossy(),
						"expected a path relative to the base directory",
					))
				}
			}
		}
		Ok(RepositoryPath { segments })
	}

	pub fn is_root(&self) -> bool {
		self.segments.is_empty()
	}

	/// Number of segments; the root has depth 0
	pub fn depth(&self) -> usize {
		self.segments.len()
	}

	pub fn segments(&self) -> &[String] {
		&self.segments
	}

	/// Last segment, `None` for the root
	pub fn name(&self) -> Option<&str> {
		self.segments.last().map(|s| s.as_str())
	}

	pub fn parent(&self) -> Option<RepositoryPath> {
		if self.is_root() {
			return None;
		}
		Some(self.prefix(self.segments.len() - 1))
	}

	/// Child path `self/name`
	pub fn join(&self, name: &str) -> SyncResult<RepositoryPath> {
		if name.is_empty() || name.contains('/') || name == "." || name == ".." {
			return Err(SyncError::invalid_path(name, "not a valid node name"));
		}
		let mut segments = self.segments.clone();
		segments.push(name.to_string());
		Ok(RepositoryPath { segments })
	}

	/// The ancestor made of the first `len` segments
	pub fn prefix(&self, len: usize) -> RepositoryPath {
		let len = len.min(self.segments.len());
		RepositoryPath { segments: self.segments[..len].to_vec() }
	}

	/// Every non-root prefix from shortest to longest, `self` included
	pub fn prefixes(&self) -> impl Iterator<Item = RepositoryPath> + '_ {
		(1..=self.segments.len()).map(move |len| self.prefix(len))
	}

	/// Longest common prefix by segment; at least the root
	pub fn closest_shared_ancestor(&self, other: &RepositoryPath) -> RepositoryPath {
		let shared = self.segments.iter().zip(other.segments.iter()).take_while(|(a, b)| a == b).count();
		self.prefix(shared)
	}

	/// True if `self` is a strict ancestor of `other`
	pub fn is_ancestor_of(&self, other: &RepositoryPath) -> bool {
		self.depth() < other.depth() && other.segments.starts_with(&self.segments)
	}
}

impl fmt::Display for RepositoryPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.segments.is_empty() {
			return write!(f, "/");
		}
		for segment in &self.segments {
			write!(f, "/{}", segment)?;
		}
		Ok(())
	}
}


// vim: ts=4
