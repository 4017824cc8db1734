//! Method invocation and interception engine for switchyard.
//!
//! Messages are turned into calls of described methods: argument converters
//! resolve each parameter, around interceptors wrap the call, and the result
//! is wrapped back into a reply message. Endpoints (service activators,
//! transformers) and the retry machinery are built on top of the invoker.
//!
//! Depends only on `switchyard-types`; no IO beyond in-memory channels.

pub mod endpoint;
pub mod handler;
pub mod processor;
pub mod retry;
