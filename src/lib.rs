//! LiveGraph: hierarchical web-crawl aggregator
//!
//! Drives several scraping strategies against the clearnet and onion-routed
//! hidden services, normalizes their outputs into a single canonical tree
//! document, and continuously republishes it for a polling visualizer.
//!
//! - HTTP control plane for starting, stopping, and inspecting engines
//! - Breadth-limited hierarchical HTTP crawler (robots-aware, paced)
//! - Subprocess supervision for the TOC, OnionSearch, and TorBot engines
//! - Format unification from CSV / recursive JSON / OSINT JSON artifacts
//! - Atomic publication with a mirrored copy for the visualizer

pub mod adapters;
pub mod config;
pub mod crawl;
pub mod engines;
pub mod publish;
pub mod server;
pub mod tree;

pub use config::Config;
pub use tree::{Node, NodeType};
