//! Configuration for jcrsync
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (Config::default())
//! 2. Config file (`--config`, TOML or JSON5 by extension)
//! 3. Environment variables (JCRSYNC_PASSWORD)
//! 4. CLI flags (highest priority)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SyncError, SyncResult};

/// Environment variable overriding the repository password
pub const PASSWORD_ENV: &str = "JCRSYNC_PASSWORD";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	// ========================================================================
	// LOCAL TREE
	// ========================================================================
	/// Local directory mirrored onto the repository root
	pub base: PathBuf,

	/// Glob patterns to exclude on top of the built-in ignore rules
	pub exclude_patterns: Vec<String>,

	/// Capacity of the recently-missing file name ring
	pub missing_log_capacity: usize,

	// ========================================================================
	// REPOSITORY
	// ========================================================================
	pub host: String,

	/// `http` or `https`
	pub protocol: String,

	pub port: u16,

	pub username: String,

	pub password: String,

	/// Per-request timeout in seconds
	pub request_timeout_secs: u64,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			base: PathBuf::from("b2c-view").join("jcr_root"),
			exclude_patterns: vec![],
			missing_log_capacity: 1024,

			host: "localhost".to_string(),
			protocol: "http".to_string(),
			port: 4502,
			username: "admin".to_string(),
			password: "admin".to_string(),
			request_timeout_secs: 30,
		}
	}
}

impl Config {
	/// Load a config file on top of the defaults
	///
	/// `.toml` files are parsed as TOML, everything else as JSON5.
	pub fn from_file(path: &Path) -> SyncResult<Config> {
		let contents = std::fs::read_to_string(path).map_err(|e| SyncError::local_io(path, e))?;
		let is_toml = path.extension().map_or(false, |ext| ext == "toml");
		let parsed: Result<Config, String> = if is_toml {
			toml::from_str(&contents).map_err(|e| e.to_string())
		} else {
			json5::from_str(&contents).map_err(|e| e.to_string())
		};
		parsed.map_err(|e| SyncError::invalid_config(format!("{}: {}", path.display(), e)))
	}

	/// Apply environment overrides from the process environment
	pub fn apply_env(&mut self) {
		self.apply_env_with(|key| std::env::var(key).ok());
	}

	/// Apply environment overrides using `lookup` as the environment
	pub fn apply_env_with<F>(&mut self, lookup: F)
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(password) = lookup(PASSWORD_ENV) {
			self.password = password;
		}
	}

	/// Reject settings the sync loop cannot work with
	pub fn validate(&self) -> SyncResult<()> {
		if self.host.trim().is_empty() {
			return Err(SyncError::invalid_config("host must not be empty"));
		}
		if self.protocol != "http" && self.protocol != "https" {
			return Err(SyncError::invalid_config(format!(
				"protocol must be http or https, got {:?}",
				self.protocol
			)));
		}
		if self.port == 0 {
			return Err(SyncError::invalid_config("port must be greater than 0"));
		}
		if self.request_timeout_secs == 0 {
			return Err(SyncError::invalid_config("request timeout must be greater than 0"));
		}
		if self.missing_log_capacity == 0 {
			return Err(SyncError::invalid_config("missing log capacity must be greater than 0"));
		}
		Ok(())
	}

	/// `protocol://host:port`
	pub fn base_url(&self) -> String {
		format!("{}://{}:{}", self.protocol, self.host, self.port)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_config_default() {
		let config = Config::default();
		assert_eq!(config.base, Path::new("b2c-view/jcr_root"));
		assert_eq!(config.base_url(), "http://localhost:4502");
		assert_eq!(config.username, "admin");
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_config_serialization() {
		let config = Config::default();
		let json = serde_json::to_string(&config).expect("Failed to serialize");
		assert!(json.contains("missingLogCapacity"));
		let deserialized: Config = serde_json::from_str(&json).expect("Failed to deserialize");
		assert_eq!(config, deserialized);
	}

	#[test]
	fn test_env_overrides_password() {
		let mut config = Config::default();
		config.apply_env_with(|key| if key == PASSWORD_ENV { Some("s3cret".to_string()) } else { None });
		assert_eq!(config.password, "s3cret");
	}

	#[test]
	fn test_validate_rejects_bad_values() {
		let mut config = Config::default();
		config.protocol = "ftp".to_string();
		assert!(config.validate().unwrap_err().to_string().contains("protocol"));

		let mut config = Config::default();
		config.port = 0;
		assert!(config.validate().is_err());

		let mut config = Config::default();
		config.host = " ".to_string();
		assert!(config.validate().is_err());

		let mut config = Config::default();
		config.missing_log_capacity = 0;
		assert!(config.validate().is_err());
	}
}

// vim: ts=4
