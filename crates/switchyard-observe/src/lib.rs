//! Observability setup for Switchyard: tracing subscriber initialization and
//! the span and field names shared by instrumented components.

pub mod attrs;
pub mod tracing_setup;
