//! Diffy command line
//!
//! Library half of the `diffy` binary: configuration loading, capture
//! parsing and the subcommands, kept here so they can be tested directly.

#![warn(unreachable_pub)]

pub mod capture;
pub mod commands;
pub mod config;
pub mod logging;

pub use capture::{CaptureRecord, Captures, Payload, SkippedLine};
pub use commands::{AnalyzeArgs, AnalyzeReport, SummarizeArgs};
pub use config::{ConfigError, ConfigIssue, DiffyConfig};
pub use logging::LogFormat;
