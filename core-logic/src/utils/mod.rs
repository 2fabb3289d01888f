//! # Utilities Module
//!
//! Internal utility modules for the core-logic crate.
//! These modules are marked as `pub(crate)` to enforce API boundaries.

pub(crate) mod clock;
pub(crate) mod key_loader;
pub(crate) mod logger;
pub(crate) mod proxy_manager;
pub(crate) mod retry;

pub use clock::{RecordingSleeper, Sleeper, TokioSleeper};
pub use key_loader::{AccountKey, KeyLoader};
pub use logger::setup_logger;
pub use proxy_manager::ProxyManager;
pub use retry::{with_retry, RetryConfig};
