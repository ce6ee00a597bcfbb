//! Error types for jcrsync operations

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::path::RepositoryPath;

/// Result type used throughout the synchronization core
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors reported by the synchronization core
#[derive(Debug)]
pub enum SyncError {
	/// A create/delete/set/upload call against the repository failed
	RemoteOperationFailed { operation: &'static str, path: String, source: RepositoryError },

	/// A structured-content descriptor could not be parsed
	DescriptorParseFailed { path: PathBuf, message: String },

	/// A local file vanished or could not be read between event and processing
	LocalIoFailed { path: PathBuf, source: io::Error },

	/// A path could not be mapped into the repository tree
	InvalidPath { path: String, message: String },

	/// Invalid configuration
	InvalidConfig { message: String },

	/// The filesystem watcher failed
	Watch { message: String },
}

impl SyncError {
	/// Wrap a repository failure for `operation` on `path`
	pub fn remote(operation: &'static str, path: &RepositoryPath, source: RepositoryError) -> Self {
		SyncError::RemoteOperationFailed { operation, path: path.to_string(), source }
	}

	pub fn local_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
		SyncError::LocalIoFailed { path: path.into(), source }
	}

	pub fn invalid_path(path: impl Into<String>, message: impl Into<String>) -> Self {
		SyncError::InvalidPath { path: path.into(), message: message.into() }
	}

	pub fn invalid_config(message: impl Into<String>) -> Self {
		SyncError::InvalidConfig { message: message.into() }
	}
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::RemoteOperationFailed { operation, path, source } => {
				write!(f, "Remote {} failed for {}: {}", operation, path, source)
			}
			SyncError::DescriptorParseFailed { path, message } => {
				write!(f, "Failed to parse descriptor {}: {}", path.display(), message)
			}
			SyncError::LocalIoFailed { path, source } => {
				write!(f, "Local I/O error on {}: {}", path.display(), source)
			}
			SyncError::InvalidPath { path, message } => {
				write!(f, "Invalid path {:?}: {}", path, message)
			}
			SyncError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
			SyncError::Watch { message } => write!(f, "Watcher error: {}", message),
		}
	}
}

impl Error for SyncError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			SyncError::RemoteOperationFailed { source, .. } => Some(source),
			SyncError::LocalIoFailed { source, .. } => Some(source),
			_ => None,
		}
	}
}

impl From<notify::Error> for SyncError {
	fn from(e: notify::Error) -> Self {
		SyncError::Watch { message: e.to_string() }
	}
}

/// Errors reported by a repository client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
	/// The node does not exist (only meaningful for existence checks)
	NotFound,

	/// The repository answered with a non-success status
	Status { status: u16, message: String },

	/// Network or transport failure
	Transport(String),

	/// Generic error message
	Other(String),
}

impl fmt::Display for RepositoryError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RepositoryError::NotFound => write!(f, "Node not found"),
			RepositoryError::Status { status, message } => {
				write!(f, "Repository answered {}: {}", status, message)
			}
			RepositoryError::Transport(msg) => write!(f, "Transport error: {}", msg),
			RepositoryError::Other(msg) => write!(f, "{}", msg),
		}
	}
}

impl Error for RepositoryError {}

impl From<reqwest::Error> for RepositoryError {
	fn from(e: reqwest::Error) -> Self {
		match e.status() {
			Some(status) if status == reqwest::StatusCode::NOT_FOUND => RepositoryError::NotFound,
			Some(status) => RepositoryError::Status { status: status.as_u16(), message: e.to_string() },
			None => RepositoryError::Transport(e.to_string()),
		}
	}
}

impl From<String> for RepositoryError {
	fn from(e: String) -> Self {
		RepositoryError::Other(e)
	}
}


// vim: ts=4
