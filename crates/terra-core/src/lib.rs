//! Terra Core - Shared functionality for the Terra CLI
//!
//! Standard on-disk locations, the CLI configuration file, atomic file
//! writes and the error taxonomy every command maps onto an exit code.

pub mod config;
pub mod error;
pub mod files;
pub mod paths;

pub use config::{AppLaunch, CliConfig, RetryConfig};
pub use error::{exit_codes, ErrorKind, Result, TerraError};
pub use paths::Paths;
