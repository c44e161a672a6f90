//! Time tracker CLI library.
//!
//! Argument definitions, configuration, and plain-text rendering for the
//! `worn` binary. All interactive behavior lives in `main.rs` and is
//! injected into the storage layer as predicates.

mod cli;
mod config;
pub mod render;

pub use cli::{Cli, Commands, ReportForm, ShowWhat};
pub use config::Config;
