//! OSINT crawler adapter
//!
//! TorBot's artifact comes in two shapes: a recursive tree (handled like the
//! generic tree adapter) or a flat list of per-URL intelligence entries. The
//! shape is discriminated structurally at the parse boundary and dispatched
//! from a tagged variant rather than probed at runtime.

use std::collections::HashMap;
use std::io::Read;

use serde::Deserialize;

use crate::crawl::url_filter;
use crate::tree::{Node, NodeType};

use super::tree::{sanitize, RawNode};
use super::AdapterError;

/// Synthetic host grouping entries whose URL has no parseable host.
const UNPARSED_HOST: &str = "_unparsed";

/// One flat-shape intelligence entry.
#[derive(Debug, Deserialize)]
pub struct OsintEntry {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub status: Option<serde_json::Value>,
    #[serde(default)]
    pub classification: Option<String>,
}

/// The two artifact shapes, discriminated structurally: a JSON object is a
/// recursive tree, a JSON array is a flat entry list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OsintInput {
    Recursive(RawNode),
    Flat(Vec<OsintEntry>),
}

/// Counters surfaced through the torbot progress endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OsintStats {
    pub links: u64,
    pub emails: u64,
    pub phones: u64,
    pub depth: u64,
}

/// Convert a TorBot artifact into the canonical tree plus progress stats.
pub fn convert_osint_json(
    starting_url: &str,
    input: impl Read,
) -> Result<(Node, OsintStats), AdapterError> {
    let parsed: OsintInput = serde_json::from_reader(input)?;
    Ok(match parsed {
        OsintInput::Recursive(raw) => {
            let tree = sanitize(raw, 0);
            let stats = OsintStats {
                links: tree.count() as u64 - 1,
                emails: 0,
                phones: 0,
                depth: tree_depth(&tree),
            };
            (tree, stats)
        }
        OsintInput::Flat(entries) => convert_flat(starting_url, entries),
    })
}

fn convert_flat(starting_url: &str, entries: Vec<OsintEntry>) -> (Node, OsintStats) {
    let root_url = url_filter::canonicalize_absolute(starting_url)
        .map(|u| u.to_string())
        .unwrap_or_else(|| starting_url.to_string());

    let mut root = Node {
        name: format!("TorBot OSINT Results: {starting_url}"),
        node_type: NodeType::Root,
        description: format!("TorBot OSINT intelligence gathering results from {starting_url}"),
        url: root_url,
        children: Vec::new(),
    };

    let mut stats = OsintStats::default();

    // host -> position among root children, preserving first appearance
    let mut index: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        stats.links += 1;
        stats.emails += entry.emails.len() as u64;
        stats.phones += entry.phones.len() as u64;

        let raw_url = entry.url.clone().unwrap_or_default();
        let (host, url) = match url_filter::canonicalize_absolute(&raw_url) {
            Some(canonical) => (
                canonical.host_str().unwrap_or(UNPARSED_HOST).to_string(),
                canonical.to_string(),
            ),
            None => (UNPARSED_HOST.to_string(), raw_url.clone()),
        };

        let slot = *index.entry(host.clone()).or_insert_with(|| {
            root.children.push(Node {
                name: host.clone(),
                node_type: NodeType::from_depth(1),
                description: format!("Links discovered on {host}"),
                url: format!("torbot://{host}"),
                children: Vec::new(),
            });
            root.children.len() - 1
        });

        let display = if url.is_empty() { raw_url } else { url };
        root.children[slot].children.push(Node {
            name: display.clone(),
            node_type: NodeType::from_depth(2),
            description: describe_entry(&entry, &display),
            url: display,
            children: Vec::new(),
        });
    }

    stats.depth = tree_depth(&root);
    (root, stats)
}

/// Fold entry metadata into a compact description,
/// e.g. `status=200; email=a@b; phone=+1555`.
fn describe_entry(entry: &OsintEntry, url: &str) -> String {
    let mut segments = Vec::new();

    if let Some(status) = &entry.status {
        let rendered = match status {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        segments.push(format!("status={rendered}"));
    }
    if let Some(classification) = &entry.classification {
        segments.push(format!("classification={classification}"));
    }
    if !entry.emails.is_empty() {
        segments.push(format!("email={}", entry.emails.join(",")));
    }
    if !entry.phones.is_empty() {
        segments.push(format!("phone={}", entry.phones.join(",")));
    }

    if segments.is_empty() {
        format!("URL: {url}")
    } else {
        segments.join("; ")
    }
}

fn tree_depth(node: &Node) -> u64 {
    node.children
        .iter()
        .map(|c| 1 + tree_depth(c))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recursive_shape_is_treated_as_a_tree() {
        let json = r#"{
            "name": "root", "url": "http://x.onion/",
            "children": [{"name": "a", "url": "http://x.onion/a"}]
        }"#;
        let (tree, stats) = convert_osint_json("http://x.onion/", json.as_bytes()).unwrap();
        assert_eq!(tree.name, "root");
        assert_eq!(tree.children.len(), 1);
        assert_eq!(stats.links, 1);
        assert_eq!(stats.depth, 1);
    }

    #[test]
    fn flat_shape_groups_by_host() {
        let json = r#"[
            {"url": "http://a.onion/one", "emails": ["x@a.onion"], "status": 200},
            {"url": "http://a.onion/two"},
            {"url": "http://b.onion/", "phones": ["+1555"], "classification": "forum"}
        ]"#;
        let (tree, stats) = convert_osint_json("http://a.onion/", json.as_bytes()).unwrap();

        assert_eq!(tree.url, "http://a.onion/");
        assert_eq!(tree.children.len(), 2);

        let a = &tree.children[0];
        assert_eq!(a.name, "a.onion");
        assert_eq!(a.node_type, NodeType::Category);
        assert_eq!(a.url, "torbot://a.onion");
        assert_eq!(a.children.len(), 2);
        assert_eq!(a.children[0].node_type, NodeType::Subcategory);
        assert_eq!(a.children[0].description, "status=200; email=x@a.onion");

        let b = &tree.children[1];
        assert_eq!(b.children[0].description, "classification=forum; phone=+1555");

        assert_eq!(
            stats,
            OsintStats {
                links: 3,
                emails: 1,
                phones: 1,
                depth: 2
            }
        );
    }

    #[test]
    fn unparseable_entries_land_under_the_synthetic_host() {
        let json = r#"[
            {"url": "not a url"},
            {"emails": ["lost@nowhere"]},
            {"url": "http://ok.onion/page"}
        ]"#;
        let (tree, stats) = convert_osint_json("http://ok.onion/", json.as_bytes()).unwrap();

        let unparsed = tree
            .children
            .iter()
            .find(|c| c.name == UNPARSED_HOST)
            .expect("synthetic host present");
        assert_eq!(unparsed.children.len(), 2);
        assert_eq!(unparsed.url, "torbot://_unparsed");
        assert_eq!(stats.links, 3);
        assert_eq!(stats.emails, 1);
    }

    #[test]
    fn entry_without_metadata_gets_url_description() {
        let json = r#"[{"url": "http://a.onion/x"}]"#;
        let (tree, _) = convert_osint_json("http://a.onion/", json.as_bytes()).unwrap();
        assert_eq!(tree.children[0].children[0].description, "URL: http://a.onion/x");
    }

    #[test]
    fn status_accepts_strings_and_numbers() {
        let json = r#"[
            {"url": "http://a.onion/1", "status": "200 OK"},
            {"url": "http://a.onion/2", "status": 404}
        ]"#;
        let (tree, _) = convert_osint_json("http://a.onion/", json.as_bytes()).unwrap();
        let host = &tree.children[0];
        assert_eq!(host.children[0].description, "status=200 OK");
        assert_eq!(host.children[1].description, "status=404");
    }

    #[test]
    fn scalar_json_is_rejected() {
        assert!(convert_osint_json("http://a.onion/", "42".as_bytes()).is_err());
        assert!(convert_osint_json("http://a.onion/", "\"str\"".as_bytes()).is_err());
    }
}
