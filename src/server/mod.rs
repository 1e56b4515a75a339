//! HTTP control plane
//!
//! JSON API for starting, stopping, and inspecting the engines, plus the
//! manual mirror-sync surface. The visualizer itself never talks to this
//! server; it polls the published mirror document.

pub mod handlers;
pub mod routes;
mod server;
pub mod types;

pub use handlers::AppState;
pub use routes::create_router;
pub use server::HttpServer;
