//! Sling HTTP client
//!
//! Node reads go through the default JSON rendering (`GET /path.json`),
//! writes through the Sling POST servlet:
//!
//! - create: `POST /path` with `jcr:primaryType`
//! - delete: `POST /path` with `:operation=delete`
//! - properties: `POST /path` with one form field per property, plus
//!   `name@TypeHint` for numeric values
//! - files: multipart `POST /parent` with a part named after the node

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use std::path::Path;
use std::time::Duration;

use super::{RepositoryClient, RepositoryResult};
use crate::config::Config;
use crate::error::RepositoryError;
use crate::logging::*;
use crate::path::RepositoryPath;
use crate::properties::PropertyMap;

pub struct SlingClient {
	client: Client,
	base_url: Url,
	username: String,
	password: String,
}

impl SlingClient {
	pub fn new(config: &Config) -> RepositoryResult<Self> {
		let base_url = Url::parse(&config.base_url())
			.map_err(|e| RepositoryError::Other(format!("invalid repository URL: {}", e)))?;
		let client = Client::builder()
			.timeout(Duration::from_secs(config.request_timeout_secs))
			.build()?;
		Ok(SlingClient {
			client,
			base_url,
			username: config.username.clone(),
			password: config.password.clone(),
		})
	}

	/// URL of `path`, with `suffix` appended to the last segment
	fn url(&self, path: &RepositoryPath, suffix: &str) -> RepositoryResult<Url> {
		let mut url = self.base_url.clone();
		{
			let mut segments = url
				.path_segments_mut()
				.map_err(|_| RepositoryError::Other(format!("{} cannot be a base", self.base_url)))?;
			segments.clear();
			match path.segments().split_last() {
				Some((last, init)) => {
					segments.extend(init);
					segments.push(&format!("{}{}", last, suffix));
				}
				None => {
					segments.push(suffix);
				}
			}
		}
		Ok(url)
	}

	async fn send(&self, request: RequestBuilder) -> RepositoryResult<Response> {
		let response =
			request.basic_auth(&self.username, Some(&self.password)).send().await?;
		let status = response.status();
		if status == StatusCode::NOT_FOUND {
			return Err(RepositoryError::NotFound);
		}
		if !status.is_success() {
			let message = response.text().await.unwrap_or_default();
			return Err(RepositoryError::Status { status: status.as_u16(), message: summarize(&message) });
		}
		Ok(response)
	}

	async fn post_form(&self, path: &RepositoryPath, fields: &[(String, String)]) -> RepositoryResult<()> {
		let url = self.url(path, "")?;
		self.send(self.client.post(url).form(fields)).await?;
		Ok(())
	}
}

/// First line of an error page, enough for a log entry
fn summarize(body: &str) -> String {
	let line = body.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
	line.chars().take(200).collect()
}

/// Form fields for a property set, type hints included
fn property_fields(properties: &PropertyMap) -> Vec<(String, String)> {
	let mut fields = Vec::with_capacity(properties.len());
	for (name, value) in properties {
		fields.push((name.clone(), value.to_string()));
		if let Some(hint) = value.type_hint() {
			fields.push((format!("{}@TypeHint", name), hint.to_string()));
		}
	}
	fields
}

#[async_trait]
impl RepositoryClient for SlingClient {
	async fn get_node(&self, path: &RepositoryPath) -> RepositoryResult<()> {
		let url = self.url(path, ".json")?;
		trace!("GET {}", url);
		self.send(self.client.get(url)).await?;
		Ok(())
	}

	async fn create_node(&self, path: &RepositoryPath, primary_type: &str) -> RepositoryResult<()> {
		self.post_form(path, &[("jcr:primaryType".to_string(), primary_type.to_string())]).await
	}

	async fn remove_node(&self, path: &RepositoryPath) -> RepositoryResult<()> {
		self.post_form(path, &[(":operation".to_string(), "delete".to_string())]).await
	}

	async fn set_properties(
		&self,
		path: &RepositoryPath,
		properties: &PropertyMap,
	) -> RepositoryResult<()> {
		self.post_form(path, &property_fields(properties)).await
	}

	async fn upload_file(
		&self,
		path: &RepositoryPath,
		local_file: &Path,
		mime_type: &str,
		overwrite: bool,
	) -> RepositoryResult<()> {
		let (parent, name) = match (path.parent(), path.name()) {
			(Some(parent), Some(name)) => (parent, name.to_string()),
			_ => return Err(RepositoryError::Other("cannot upload a file as the root".to_string())),
		};

		if !overwrite {
			match self.get_node(path).await {
				Ok(()) => {
					return Err(RepositoryError::Status {
						status: 409,
						message: format!("{} already exists", path),
					})
				}
				Err(RepositoryError::NotFound) => {}
				Err(e) => return Err(e),
			}
		}

		let content = tokio::fs::read(local_file).await.map_err(|e| {
			RepositoryError::Other(format!("cannot read {}: {}", local_file.display(), e))
		})?;
		let part = Part::bytes(content).file_name(name.clone()).mime_str(mime_type)?;
		let form = Form::new().part(name.clone(), part).text(format!("{}@TypeHint", name), "nt:file");

		let url = self.url(&parent, "")?;
		self.send(self.client.post(url).multipart(form)).await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::properties::PropertyValue;

	fn client() -> SlingClient {
		SlingClient::new(&Config::default()).unwrap()
	}

	#[test]
	fn test_url_rendering() {
		let client = client();
		let path = RepositoryPath::parse("/apps/x/cq:dialog").unwrap();
		assert_eq!(client.url(&path, ".json").unwrap().as_str(), "http://localhost:4502/apps/x/cq:dialog.json");
		assert_eq!(client.url(&RepositoryPath::root(), ".json").unwrap().as_str(), "http://localhost:4502/.json");
	}

	#[test]
	fn test_url_escapes_segments() {
		let client = client();
		let path = RepositoryPath::parse("/content/my page").unwrap();
		assert_eq!(client.url(&path, "").unwrap().as_str(), "http://localhost:4502/content/my%20page");
	}

	#[test]
	fn test_property_fields_carry_type_hints() {
		let mut props = PropertyMap::new();
		props.insert("count".to_string(), PropertyValue::Long(42));
		props.insert("title".to_string(), PropertyValue::from("Hi"));
		let fields = property_fields(&props);
		assert_eq!(
			fields,
			vec![
				("count".to_string(), "42".to_string()),
				("count@TypeHint".to_string(), "Long".to_string()),
				("title".to_string(), "Hi".to_string()),
			]
		);
	}

	#[test]
	fn test_summarize_error_page() {
		assert_eq!(summarize("\n\n  <html>\n<body>"), "<html>");
		assert_eq!(summarize(""), "");
	}
}

// vim: ts=4
