//! Retry policy and the error handler that applies it.
//!
//! The invoker never retries on its own; a consumer wraps handlers in a
//! [`RetryingErrorHandler`] when retries are configured.

pub mod error_handler;
pub mod template;

pub use error_handler::{RetryError, RetryingErrorHandler};
pub use template::{RetryTemplate, RetryTemplateBuilder};
