//! Property translation
//!
//! Turns the raw attribute map of a descriptor node into the property set
//! sent to the repository. Metadata and namespace declarations are
//! filtered, multi-value properties are skipped, and only the numeric type
//! tags (`{Long}`, `{Double}`, `{Decimal}`) coerce a value. Every other
//! `{Type}` tag is stripped and the remainder kept as a string; `{Boolean}`
//! and `{Date}` values are not converted.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::logging::*;
use crate::names::{NUMERIC_TAGS, RESERVED_PROPERTIES, XMLNS_PREFIX};

/// A scalar property value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
	String(String),
	Long(i64),
	Double(f64),
}

impl PropertyValue {
	pub fn is_numeric(&self) -> bool {
		!matches!(self, PropertyValue::String(_))
	}

	/// Sling `@TypeHint` for values that are not plain strings
	pub fn type_hint(&self) -> Option<&'static str> {
		match self {
			PropertyValue::String(_) => None,
			PropertyValue::Long(_) => Some("Long"),
			PropertyValue::Double(_) => Some("Double"),
		}
	}
}

impl fmt::Display for PropertyValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PropertyValue::String(s) => write!(f, "{}", s),
			PropertyValue::Long(n) => write!(f, "{}", n),
			PropertyValue::Double(n) => write!(f, "{}", n),
		}
	}
}

impl From<&str> for PropertyValue {
	fn from(s: &str) -> Self {
		PropertyValue::String(s.to_string())
	}
}

/// Property set for `set_properties`, ordered by name
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// Translate a descriptor attribute map into a repository property set
pub fn translate_properties(attributes: &BTreeMap<String, String>) -> PropertyMap {
	attributes
		.iter()
		.filter(|(name, _)| !is_filtered_name(name))
		.filter_map(|(name, raw)| translate_value(name, raw).map(|value| (name.clone(), value)))
		.collect()
}

fn is_filtered_name(name: &str) -> bool {
	name.starts_with(XMLNS_PREFIX) || RESERVED_PROPERTIES.contains(&name)
}

fn translate_value(name: &str, raw: &str) -> Option<PropertyValue> {
	if is_multi_value(raw) {
		debug!("Skipping multi-value property {}", name);
		return None;
	}

	let (tag, rest) = match split_type_tag(raw) {
		Some(parts) => parts,
		None => return Some(PropertyValue::String(raw.to_string())),
	};

	if is_multi_value(rest) {
		debug!("Skipping multi-value property {} ({{{}}})", name, tag);
		return None;
	}

	if NUMERIC_TAGS.contains(&tag) {
		let number = parse_number(rest);
		if number.is_none() {
			warn!("Property {} is tagged {{{}}} but {:?} is not a number, skipping", name, tag, rest);
		}
		return number;
	}

	Some(PropertyValue::String(rest.to_string()))
}

fn is_multi_value(value: &str) -> bool {
	value.len() >= 2 && value.starts_with('[') && value.ends_with(']')
}

/// Split `{Tag}rest` into `("Tag", "rest")`
///
/// Only alphanumeric tags count, so brace-delimited literals such as JSON
/// snippets pass through untouched.
fn split_type_tag(raw: &str) -> Option<(&str, &str)> {
	let inner = raw.strip_prefix('{')?;
	let close = inner.find('}')?;
	let tag = &inner[..close];
	if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric()) {
		return None;
	}
	Some((tag, &inner[close + 1..]))
}

fn parse_number(value: &str) -> Option<PropertyValue> {
	let value = value.trim();
	if let Ok(n) = value.parse::<i64>() {
		return Some(PropertyValue::Long(n));
	}
	match value.parse::<f64>() {
		Ok(n) if n.is_finite() => Some(PropertyValue::Double(n)),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
		pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
	}

	#[test]
	fn test_numeric_tags_are_coerced() {
		let props = translate_properties(&attrs(&[
			("count", "{Long}42"),
			("ratio", "{Double}0.5"),
			("price", "{Decimal}12.25"),
		]));
		assert_eq!(props["count"], PropertyValue::Long(42));
		assert_eq!(props["ratio"], PropertyValue::Double(0.5));
		assert_eq!(props["price"], PropertyValue::Double(12.25));
		assert!(props.values().all(|v| v.is_numeric()));
	}

	#[test]
	fn test_non_numeric_tags_only_strip_the_tag() {
		let props = translate_properties(&attrs(&[
			("enabled", "{Boolean}true"),
			("title", "{String}Hi"),
			("when", "{Date}2020-01-01T00:00:00.000Z"),
		]));
		assert_eq!(props["enabled"], PropertyValue::from("true"));
		assert_eq!(props["title"], PropertyValue::from("Hi"));
		assert_eq!(props["when"], PropertyValue::from("2020-01-01T00:00:00.000Z"));
	}

	#[test]
	fn test_untagged_values_pass_through() {
		let props = translate_properties(&attrs(&[("plain", "plainValue"), ("json", "{\"a\":1}")]));
		assert_eq!(props["plain"], PropertyValue::from("plainValue"));
		assert_eq!(props["json"], PropertyValue::from("{\"a\":1}"));
	}

	#[test]
	fn test_multi_values_are_dropped() {
		let props =
			translate_properties(&attrs(&[("tags", "[a,b]"), ("ids", "{Long}[1,2]"), ("keep", "x")]));
		assert!(!props.contains_key("tags"));
		assert!(!props.contains_key("ids"));
		assert_eq!(props.len(), 1);
	}

	#[test]
	fn test_metadata_and_namespaces_are_filtered() {
		let props = translate_properties(&attrs(&[
			("xmlns:jcr", "http://www.jcp.org/jcr/1.0"),
			("jcr:primaryType", "nt:unstructured"),
			("jcr:created", "{Date}2020-01-01T00:00:00.000Z"),
			("jcr:createdBy", "admin"),
			("jcr:title", "Kept"),
		]));
		assert_eq!(props.len(), 1);
		assert_eq!(props["jcr:title"], PropertyValue::from("Kept"));
	}

	#[test]
	fn test_unparseable_number_is_skipped() {
		let props = translate_properties(&attrs(&[("count", "{Long}many")]));
		assert!(props.is_empty());
	}

	#[test]
	fn test_type_hint() {
		assert_eq!(PropertyValue::Long(1).type_hint(), Some("Long"));
		assert_eq!(PropertyValue::Double(1.5).type_hint(), Some("Double"));
		assert_eq!(PropertyValue::from("x").type_hint(), None);
	}
}

// vim: ts=4
