//! SiteWatch CLI
//!
//! Reads a monitoring sheet, runs it through the check harness and writes
//! the annotated sheet and run report.

pub mod config;
pub mod input;
pub mod output;
