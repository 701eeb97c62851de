//! Logging utilities.
//!
//! Centralizes logger initialization on top of the `log` facade with an
//! `env_logger` backend, plus a helper for warnings that must not repeat every frame.

mod init;
mod once;

pub use init::{init_logging, LoggingConfig, DEFAULT_FILTER};
pub use once::WarnOnce;
