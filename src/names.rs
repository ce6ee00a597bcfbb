//! Reserved names and markers
//!
//! FileVault conventions for mapping a local `jcr_root` tree onto
//! repository node names.

/// Attribute carrying a node's primary type
pub const PRIMARY_TYPE: &str = "jcr:primaryType";

/// Metadata keys dropped from every property upload
pub const CREATED: &str = "jcr:created";
pub const CREATED_BY: &str = "jcr:createdBy";
pub const RESERVED_PROPERTIES: [&str; 3] = [CREATED, CREATED_BY, PRIMARY_TYPE];

/// Namespace declarations on descriptor elements
pub const XMLNS_PREFIX: &str = "xmlns:";

/// Type tags whose values are coerced to numbers
pub const NUMERIC_TAGS: [&str; 3] = ["Long", "Double", "Decimal"];

/// Primary type for auto-created folders without a descriptor
pub const DEFAULT_FOLDER_TYPE: &str = "nt:folder";

/// Primary type for descriptor nodes that do not declare one
pub const DEFAULT_NODE_TYPE: &str = "nt:unstructured";

/// File holding the properties of the directory it lives in
pub const FOLDER_PROPERTIES_FILE: &str = ".content.xml";

/// Extension of structured-content descriptors
pub const DESCRIPTOR_EXTENSION: &str = "xml";

/// Local file-name prefix of CQ dialog/config files and its namespace
pub const CQ_FILE_PREFIX: &str = "_cq_";
pub const CQ_NAMESPACE: &str = "cq:";

/// Mime type used for plain file uploads
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Local file name → repository node name (`_cq_dialog` → `cq:dialog`)
pub fn node_name(file_name: &str) -> String {
	match file_name.strip_prefix(CQ_FILE_PREFIX) {
		Some(rest) if !rest.is_empty() => format!("{}{}", CQ_NAMESPACE, rest),
		_ => file_name.to_string(),
	}
}

/// Repository node name → local file name (`cq:dialog` → `_cq_dialog`)
pub fn file_name(node_name: &str) -> String {
	match node_name.strip_prefix(CQ_NAMESPACE) {
		Some(rest) if !rest.is_empty() => format!("{}{}", CQ_FILE_PREFIX, rest),
		_ => node_name.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_node_name_rewrites_cq_prefix() {
		assert_eq!(node_name("_cq_dialog"), "cq:dialog");
		assert_eq!(node_name("_cq_editConfig"), "cq:editConfig");
		assert_eq!(node_name("plain"), "plain");
		assert_eq!(node_name("_cq_"), "_cq_");
	}

	#[test]
	fn test_file_name_inverts_node_name() {
		assert_eq!(file_name("cq:dialog"), "_cq_dialog");
		assert_eq!(file_name("jcr:content"), "jcr:content");
		assert_eq!(file_name(&node_name("_cq_htmlTag")), "_cq_htmlTag");
	}
}

// vim: ts=4
