//! finrag core library
//!
//! Foundations shared by every finrag crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management
//! - Deadline and retry policy for external calls

pub mod config;
pub mod error;
pub mod logging;
pub mod retry;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use retry::RetryPolicy;
