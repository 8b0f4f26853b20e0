//! Tutoring center backend.
//!
//! Sends class, assignment and attendance notifications to parents and
//! students through a Zalo Official Account, and exposes the delivery and
//! token state over a small HTTP API.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod notification;

pub use error::{Error, Result};
