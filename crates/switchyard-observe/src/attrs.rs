//! Span names and field keys for messaging instrumentation.
//!
//! Field keys follow the OpenTelemetry messaging semantic conventions where
//! one exists. Span names are usable as the name argument of
//! `tracing::info_span!`; field keys are usable with `Span::record`.

// --- Span names ---

/// One poll of a pollable channel by a consumer.
pub const SPAN_POLL: &str = "messaging.poll";

/// Handling of a single received message.
pub const SPAN_PROCESS: &str = "messaging.process";

// --- Field keys ---

/// Name of the channel being consumed.
pub const MESSAGING_DESTINATION_NAME: &str = "messaging.destination.name";

/// Id of the message being handled.
pub const MESSAGING_MESSAGE_ID: &str = "messaging.message.id";

/// Number of messages received by one poll.
pub const MESSAGING_BATCH_MESSAGE_COUNT: &str = "messaging.batch.message_count";

/// Number of messages of one poll whose handling failed.
pub const MESSAGING_BATCH_FAILED_COUNT: &str = "messaging.batch.failed_count";
