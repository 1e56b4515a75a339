//! OnionSearch result adapter
//!
//! Converts the search engine's CSV artifact (`engine,name,url` rows) into
//! a three-level tree: query root, one category per engine in order of
//! first appearance, one subcategory per result row.

use std::collections::HashMap;
use std::io::Read;

use crate::tree::{Node, NodeType};

use super::AdapterError;

/// Convert OnionSearch CSV rows into the canonical tree.
///
/// Rows with an empty URL are dropped. Engine children preserve the order
/// engines first appear in the file; result rows preserve file order.
pub fn convert_search_csv(query: &str, input: impl Read) -> Result<Node, AdapterError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input);

    // engine name -> position in `engines`, preserving first appearance
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut engines: Vec<(String, Vec<(String, String)>)> = Vec::new();

    for record in reader.records() {
        let record = record?;
        if record.len() < 3 {
            continue;
        }
        let engine = record[0].trim().to_string();
        let name = record[1].trim().to_string();
        let url = record[2].trim().to_string();
        if url.is_empty() {
            continue;
        }

        let slot = *index.entry(engine.clone()).or_insert_with(|| {
            engines.push((engine.clone(), Vec::new()));
            engines.len() - 1
        });
        engines[slot].1.push((name, url));
    }

    let mut root = Node {
        name: format!("OnionSearch Results: {query}"),
        node_type: NodeType::Root,
        description: format!("Search results for '{query}' from multiple onion search engines"),
        url: format!("search://{query}"),
        children: Vec::new(),
    };

    for (engine, rows) in engines {
        let mut engine_node = Node {
            name: engine.clone(),
            node_type: NodeType::from_depth(1),
            description: format!("Results from {engine} search engine"),
            url: format!("onion://{}", engine.to_lowercase()),
            children: Vec::new(),
        };
        for (name, url) in rows {
            let name = if name.is_empty() { "Untitled".to_string() } else { name };
            engine_node.children.push(Node {
                name,
                node_type: NodeType::from_depth(2),
                description: format!("Search result from {engine}"),
                url,
                children: Vec::new(),
            });
        }
        root.children.push(engine_node);
    }

    Ok(root)
}
