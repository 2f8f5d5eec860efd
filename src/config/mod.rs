//! Application configuration management.
//!
//! `VisorConfig` is read from `config.json` at launch and re-read whenever
//! the file changes. Differences are applied to the running session through
//! its mutators, one field at a time.

pub mod app;

pub use app::{ConfigChange, VisorConfig, CONFIG_ENV_VAR};
