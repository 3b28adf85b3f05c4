//! HTTP surface of the analysis pipeline.
//!
//! `POST /api/analyze` streams pipeline events as NDJSON; `GET /api/health`
//! is a liveness check. `api_router()` returns a `Router` that can be mounted
//! on any axum server instance.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{start_server_on, AnalysisServer, ServerSession};
pub use types::ApiContext;
