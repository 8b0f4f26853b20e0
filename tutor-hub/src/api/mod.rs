//! REST API server module.
//!
//! Exposes message delivery, token diagnostics and runtime log control.

pub mod error;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
