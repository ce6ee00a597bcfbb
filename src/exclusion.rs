//! Pattern-based exclusion using glob patterns
//!
//! Version-control metadata, dependency caches and hidden files are always
//! excluded. `.content.xml` is the one hidden name that is kept, since it
//! carries the properties of its directory.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Component, Path};

use crate::error::{SyncError, SyncResult};
use crate::names::FOLDER_PROPERTIES_FILE;

/// Pattern matcher using globset for efficient matching
pub struct PatternMatcher {
	/// Always-excluded patterns (built-in)
	always_exclude: GlobSet,

	/// Compiled user exclusion patterns
	exclude_set: GlobSet,
}

impl PatternMatcher {
	pub fn new(exclude_patterns: &[String]) -> SyncResult<Self> {
		let always_exclude = Self::build_always_excluded()?;
		let exclude_set = Self::build_glob_set(exclude_patterns)?;
		Ok(Self { always_exclude, exclude_set })
	}

	fn build_always_excluded() -> SyncResult<GlobSet> {
		let patterns = vec![
			"**/.git",              // Git metadata
			"**/.git/**",           //
			"**/.svn/**",           // Subversion metadata
			"**/.hg/**",            // Mercurial metadata
			"**/node_modules",      // Dependency caches
			"**/node_modules/**",   //
			"**/*.swp",             // Vim swap files
			"**/*~",                // Editor backups
		];

		Self::build_glob_set(&patterns.into_iter().map(String::from).collect::<Vec<_>>())
	}

	fn build_glob_set(patterns: &[String]) -> SyncResult<GlobSet> {
		let mut builder = GlobSetBuilder::new();
		for pattern in patterns {
			let glob = Glob::new(pattern)
				.map_err(|e| SyncError::invalid_config(format!("{}: {}", pattern, e)))?;
			builder.add(glob);
		}
		builder
			.build()
			.map_err(|e| SyncError::invalid_config(format!("Failed to build pattern set: {}", e)))
	}

	/// Check if a path relative to the base directory is excluded
	pub fn is_excluded(&self, relative: &Path) -> bool {
		if is_hidden(relative) {
			return true;
		}
		self.always_exclude.is_match(relative) || self.exclude_set.is_match(relative)
	}
}

/// Any `.`-prefixed component, except a trailing `.content.xml`
fn is_hidden(relative: &Path) -> bool {
	let components: Vec<_> = relative.components().collect();
	components.iter().enumerate().any(|(i, component)| match component {
		Component::Normal(name) => {
			let name = name.to_string_lossy();
			let is_last = i + 1 == components.len();
			name.starts_with('.') && !(is_last && name == FOLDER_PROPERTIES_FILE)
		}
		_ => false,
	})
}


// vim: ts=4
