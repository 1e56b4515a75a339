//! Foreign-format adapters
//!
//! Converters from the three external crawler output schemas into the
//! canonical tree: OnionSearch result CSV, recursive tree JSON, and the
//! OSINT JSON shapes (embedded tree or flat entry list). All adapters
//! recompute node types from depth and drop unknown fields.

pub mod osint;
pub mod search;
pub mod tree;

pub use osint::{convert_osint_json, OsintInput, OsintStats};
pub use search::convert_search_csv;
pub use tree::convert_tree_json;

use thiserror::Error;

/// Why an adapter rejected its input artifact.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
