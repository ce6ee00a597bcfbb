//! Structured-content descriptors
//!
//! A descriptor is a FileVault-style XML file (`.content.xml`,
//! `_cq_dialog.xml`, ...) describing a repository node, its properties and
//! its child nodes. The root element's own name is ignored; child elements
//! keep their qualified tag names in document order.
//!
//! Sibling tags are expected to be unique per parent. The parser keeps
//! duplicates so callers can report them.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::error::{SyncError, SyncResult};
use crate::names::PRIMARY_TYPE;

/// One element of a parsed descriptor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentNode {
	attributes: BTreeMap<String, String>,
	children: Vec<(String, ContentNode)>,
}

impl ContentNode {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builder-style attribute setter
	pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.attributes.insert(name.into(), value.into());
		self
	}

	/// Builder-style child append
	pub fn with_child(mut self, tag: impl Into<String>, child: ContentNode) -> Self {
		self.children.push((tag.into(), child));
		self
	}

	pub fn attributes(&self) -> &BTreeMap<String, String> {
		&self.attributes
	}

	pub fn attribute(&self, name: &str) -> Option<&str> {
		self.attributes.get(name).map(|s| s.as_str())
	}

	/// Declared `jcr:primaryType`, if any
	pub fn primary_type(&self) -> Option<&str> {
		self.attribute(PRIMARY_TYPE).filter(|t| !t.is_empty())
	}

	pub fn children(&self) -> &[(String, ContentNode)] {
		&self.children
	}
}

/// Malformed descriptor content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorError {
	pub message: String,
}

impl DescriptorError {
	fn new(message: impl Into<String>) -> Self {
		DescriptorError { message: message.into() }
	}
}

impl fmt::Display for DescriptorError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.message)
	}
}

impl std::error::Error for DescriptorError {}

/// Parse descriptor XML into a `ContentNode` tree
pub fn parse_descriptor(xml: &str) -> Result<ContentNode, DescriptorError> {
	let mut reader = Reader::from_str(xml);
	reader.config_mut().trim_text(true);

	// Open elements, innermost last
	let mut stack: Vec<(String, ContentNode)> = Vec::new();
	let mut root: Option<ContentNode> = None;

	loop {
		let event = reader.read_event().map_err(|e| {
			DescriptorError::new(format!("{} at position {}", e, reader.buffer_position()))
		})?;
		match event {
			Event::Start(start) => stack.push(element(&start)?),
			Event::Empty(start) => {
				let (tag, node) = element(&start)?;
				attach(&mut stack, &mut root, tag, node)?;
			}
			Event::End(_) => {
				let (tag, node) =
					stack.pop().ok_or_else(|| DescriptorError::new("unexpected closing tag"))?;
				attach(&mut stack, &mut root, tag, node)?;
			}
			Event::Eof => break,
			// Text, comments, CDATA, declarations and processing instructions
			_ => {}
		}
	}

	if let Some((tag, _)) = stack.last() {
		return Err(DescriptorError::new(format!("element <{}> is never closed", tag)));
	}
	root.ok_or_else(|| DescriptorError::new("descriptor has no root element"))
}

fn element(start: &BytesStart<'_>) -> Result<(String, ContentNode), DescriptorError> {
	let tag = std::str::from_utf8(start.name().as_ref())
		.map_err(|e| DescriptorError::new(format!("invalid element name: {}", e)))?
		.to_string();

	let mut node = ContentNode::new();
	for attr in start.attributes() {
		let attr = attr.map_err(|e| DescriptorError::new(format!("<{}>: {}", tag, e)))?;
		let key = std::str::from_utf8(attr.key.as_ref())
			.map_err(|e| DescriptorError::new(format!("invalid attribute name: {}", e)))?
			.to_string();
		let value = attr
			.unescape_value()
			.map_err(|e| DescriptorError::new(format!("<{}> {}: {}", tag, key, e)))?
			.into_owned();
		node.attributes.insert(key, value);
	}
	Ok((tag, node))
}

fn attach(
	stack: &mut Vec<(String, ContentNode)>,
	root: &mut Option<ContentNode>,
	tag: String,
	node: ContentNode,
) -> Result<(), DescriptorError> {
	match stack.last_mut() {
		Some((_, parent)) => {
			parent.children.push((tag, node));
			Ok(())
		}
		None if root.is_none() => {
			*root = Some(node);
			Ok(())
		}
		None => Err(DescriptorError::new(format!("second root element <{}>", tag))),
	}
}

/// Read and parse a descriptor file
pub async fn read_descriptor(path: &Path) -> SyncResult<ContentNode> {
	let xml = tokio::fs::read_to_string(path).await.map_err(|e| SyncError::local_io(path, e))?;
	parse_descriptor(&xml).map_err(|e| SyncError::DescriptorParseFailed {
		path: path.to_path_buf(),
		message: e.message,
	})
}


// vim: ts=4
