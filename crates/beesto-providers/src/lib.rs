//! Phase endpoint adapters.

/// HTTP phase endpoint.
pub mod http;
/// Scripted phase endpoint for tests.
pub mod scripted;

pub use http::HttpPhaseEndpoint;
pub use scripted::{Reply, ScriptedEndpoint, data_line};
