//! Infrastructure layer for Switchyard.
//!
//! Adapters that touch the outside world: the `switchyard.toml` loader and
//! the tokio polling consumer that drains queue channels into handlers.
//! Processes hosting consumers install logging through the re-exported
//! tracing setup.

pub mod config;
pub mod consumer;

pub use consumer::{PollReport, PollingConsumer};
pub use switchyard_observe::tracing_setup::{
    TracingError, TracingOptions, init_tracing, init_tracing_with, shutdown_tracing,
};
