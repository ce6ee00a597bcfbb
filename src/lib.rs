//! # jcrsync - Mirror a local FileVault tree into a JCR repository
//!
//! jcrsync watches a local `jcr_root` directory and pushes every changed
//! file into a Sling-based content repository as it happens. Plain files
//! are uploaded as binaries; `.xml` descriptors are expanded into the node
//! trees they declare.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use jcrsync::{config::Config, repository::SlingClient, watch};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let client = Arc::new(SlingClient::new(&config)?);
//!     watch::run(&config, client).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Uploading one file
//!
//! ```rust,ignore
//! use std::{path::Path, sync::Arc};
//! use jcrsync::{Dispatcher, MemoryRepository, PathLockCoordinator};
//!
//! let repo = Arc::new(MemoryRepository::new());
//! let dispatcher = Dispatcher::new(repo, Arc::new(PathLockCoordinator::new()), "jcr_root");
//! dispatcher.dispatch(Path::new("apps/site/.content.xml")).await?;
//! ```

pub mod config;
pub mod content;
pub mod coordinator;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod exclusion;
pub mod folders;
pub mod logging;
pub mod names;
pub mod path;
pub mod properties;
pub mod repository;
pub mod watch;
mod util;

// Re-export commonly used types and functions
pub use config::Config;
pub use coordinator::{ExclusiveGuard, PartialRelease, PathLockCoordinator, SignalHandle};
pub use dispatch::{classify, Classification, DispatchOutcome, Dispatcher};
pub use error::{RepositoryError, SyncError, SyncResult};
pub use path::RepositoryPath;
pub use properties::{translate_properties, PropertyMap, PropertyValue};
pub use repository::{MemoryRepository, RepositoryClient, SlingClient};

// vim: ts=4
