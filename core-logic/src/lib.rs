//! # Core Logic - Shared Utilities for Account Bots
//!
//! This crate provides the chain-agnostic pieces every bot in the workspace
//! needs: typed errors, account/proxy loading, bounded retry over an
//! injectable sleeper, and the console + file logger.
//!
//! ## Modules
//!
//! - [`config`] - Account source and proxy configuration
//! - [`error`] - Typed error handling with thiserror
//! - `utils` - Retry, sleeper, key/proxy loading, logger

pub mod config;
pub mod error;
pub(crate) mod utils;

pub use config::{AccountSource, ProxyConfig};
pub use error::{ConfigError, CoreError, NetworkError, WalletError};

pub use utils::{
    setup_logger, with_retry, AccountKey, KeyLoader, ProxyManager, RecordingSleeper, RetryConfig,
    Sleeper, TokioSleeper,
};
