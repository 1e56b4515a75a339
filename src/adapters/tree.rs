//! Recursive tree adapter
//!
//! Accepts foreign JSON already shaped like the canonical document but
//! untrusted: unknown fields are dropped, `type` tags are recomputed from
//! depth, and URLs are recanonicalized. A node whose URL cannot be
//! canonicalized keeps its original string and gains a parse warning in its
//! description rather than being dropped.

use std::io::Read;

use serde::Deserialize;

use crate::crawl::url_filter;
use crate::tree::{Node, NodeType};

use super::AdapterError;

/// Foreign node: the canonical fields, everything else silently dropped.
/// The incoming `type` is untrusted and ignored.
#[derive(Debug, Deserialize)]
pub struct RawNode {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub children: Vec<RawNode>,
}

/// Convert a foreign recursive tree JSON document into the canonical tree.
pub fn convert_tree_json(input: impl Read) -> Result<Node, AdapterError> {
    let raw: RawNode = serde_json::from_reader(input)?;
    Ok(sanitize(raw, 0))
}

pub(crate) fn sanitize(raw: RawNode, depth: usize) -> Node {
    let url = raw.url.unwrap_or_default();
    let mut description = raw.description.unwrap_or_default();

    let url = match url_filter::canonicalize_absolute(&url) {
        Some(canonical) => canonical.to_string(),
        None => {
            if !url.is_empty() {
                if description.is_empty() {
                    description = "URL parse warning".to_string();
                } else {
                    description.push_str(" | URL parse warning");
                }
            }
            url
        }
    };

    Node {
        name: raw.name.unwrap_or_else(|| "Untitled".to_string()),
        node_type: NodeType::from_depth(depth),
        description,
        url,
        children: raw
            .children
            .into_iter()
            .map(|child| sanitize(child, depth + 1))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_on_an_already_canonical_tree() {
        let json = r#"{
            "name": "Example",
            "type": "root",
            "description": "URL: http://h.test/",
            "url": "http://h.test/",
            "children": [
                {
                    "name": "A",
                    "type": "category",
                    "description": "URL: http://h.test/a",
                    "url": "http://h.test/a",
                    "children": []
                }
            ]
        }"#;
        let tree = convert_tree_json(json.as_bytes()).unwrap();
        let reserialized = serde_json::to_value(&tree).unwrap();
        let original: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(reserialized, original);
    }

    #[test]
    fn recomputes_types_from_depth() {
        let json = r#"{
            "name": "r", "type": "item", "url": "http://h.test/",
            "children": [
                {"name": "c", "type": "root", "url": "http://h.test/c",
                 "children": [
                    {"name": "s", "type": "root", "url": "http://h.test/s",
                     "children": [
                        {"name": "i", "type": "category", "url": "http://h.test/i"}
                     ]}
                 ]}
            ]
        }"#;
        let tree = convert_tree_json(json.as_bytes()).unwrap();
        assert_eq!(tree.node_type, NodeType::Root);
        assert_eq!(tree.children[0].node_type, NodeType::Category);
        assert_eq!(tree.children[0].children[0].node_type, NodeType::Subcategory);
        assert_eq!(
            tree.children[0].children[0].children[0].node_type,
            NodeType::Item
        );
    }

    #[test]
    fn drops_unknown_fields() {
        let json = r#"{
            "name": "r", "url": "http://h.test/",
            "scraped_via_tor": true, "content_length": 123, "status_code": 200
        }"#;
        let tree = convert_tree_json(json.as_bytes()).unwrap();
        let value = serde_json::to_value(&tree).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["name", "type", "description", "url", "children"]);
    }

    #[test]
    fn uncanonicalizable_url_is_kept_with_a_warning() {
        let json = r#"{
            "name": "r", "url": "http://h.test/",
            "children": [
                {"name": "odd", "description": "something", "url": "onion://ahmia"}
            ]
        }"#;
        let tree = convert_tree_json(json.as_bytes()).unwrap();
        let odd = &tree.children[0];
        assert_eq!(odd.url, "onion://ahmia");
        assert!(odd.description.contains("URL parse warning"));
        assert!(odd.description.starts_with("something"));
    }

    #[test]
    fn empty_url_gets_no_warning() {
        let json = r#"{"name": "r"}"#;
        let tree = convert_tree_json(json.as_bytes()).unwrap();
        assert_eq!(tree.url, "");
        assert_eq!(tree.description, "");
    }

    #[test]
    fn missing_name_becomes_untitled() {
        let json = r#"{"url": "http://h.test/"}"#;
        let tree = convert_tree_json(json.as_bytes()).unwrap();
        assert_eq!(tree.name, "Untitled");
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(convert_tree_json("not json".as_bytes()).is_err());
        assert!(convert_tree_json("[1,2,3]".as_bytes()).is_err());
    }
}
