//! # checkhost Core
//!
//! Shared building blocks for the checkhost embedded-runtime host.
//!
//! - **Errors**: `CheckHostError` and its sub-enums, serializable for status
//!   output and logging.
//! - **Configuration**: `AppConfig`, loaded from YAML files with optional
//!   `CHECKHOST__*` environment overrides, and validated before use.
//! - **Diagnostics**: credential redaction and status formatting consumed by
//!   external diagnostic-bundle builders.
//!
//! ## Example
//!
//! ```
//! use checkhost_core::config::AppConfig;
//!
//! let config = AppConfig::from_yaml(
//!     r#"
//! runtime:
//!   search_paths: ["/opt/checks"]
//! checks:
//!   - name: disk
//!     module: checks.disk
//! "#,
//! )
//! .unwrap();
//!
//! assert!(config.validate().is_ok());
//! ```

pub mod config;
pub mod error;
pub mod redact;
pub mod status;

pub use config::{AppConfig, CheckConfig, LoggingConfig, RuntimeConfig};
pub use error::{CheckHostError, ConfigError, Result};
pub use redact::{clean_credentials, clean_credentials_bytes};
pub use status::{format_status, CheckStatus, RuntimeStatus};
