//! Web UI HTTP server module.
//!
//! This module provides the HTTP server for the single-page UI and its JSON API.
//! It is started by the `serve` command.

mod server;
pub mod templates;

pub use server::{ReportServer, ServerHandle, build_router, start_server};
