//! Report Forge Library
//!
//! Fills `.docx` templates with values computed by SQL queries. This module
//! exports the core components for testing and integration.

pub mod ai;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod docx;
pub mod error;
pub mod logging;
pub mod params;
pub mod report;
pub mod types;
