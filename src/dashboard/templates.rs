//! HTML templates for the web UI.
//!
//! Templates are embedded at compile time using `include_str!`.

/// The single page: upload, report month, parameter manager and generation.
pub const INDEX_TEMPLATE: &str = include_str!("templates/index.html");
