//! Imagecompat Extender - kube-scheduler extender for image compatibility
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - The extender `filter` verb backed by scheduling plugins
//! - Cache invalidation for operators
//! - Health and readiness probes

pub mod error;
pub mod handlers;
pub mod server;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use error::{ApiError, Result};
pub use server::{Config, ExtenderServer};
pub use state::{AppState, DEFAULT_REQUEST_TIMEOUT};
pub use types::{ExtenderArgs, ExtenderFilterResult, InvalidateRequest, NodeList};
