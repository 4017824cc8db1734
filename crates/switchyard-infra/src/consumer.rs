//! Polling consumer: drains a queue channel into a message handler on a
//! tokio task.

use std::sync::Arc;
use std::time::Duration;

use switchyard_core::handler::MessageHandler;
use switchyard_core::handler::channel::{ChannelResolver, PollableChannel, QueueChannel};
use switchyard_core::retry::{RetryTemplate, RetryingErrorHandler};
use switchyard_observe::attrs;
use switchyard_types::config::MessagingConfig;
use switchyard_types::{Message, MessagingError};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, field, info, info_span, warn};

/// What a single poll did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub received: usize,
    pub failed: usize,
}

impl PollReport {
    pub fn succeeded(&self) -> usize {
        self.received - self.failed
    }
}

/// Pulls messages from a [`QueueChannel`] and hands them to a handler.
///
/// A failing message never stops the consumer: with an error handler the
/// message is retried (and possibly dead-lettered), without one the failure
/// is logged and the message dropped.
pub struct PollingConsumer {
    channel: Arc<QueueChannel>,
    handler: Arc<dyn MessageHandler>,
    error_handler: Option<RetryingErrorHandler>,
    config: MessagingConfig,
}

impl PollingConsumer {
    pub fn new(channel: Arc<QueueChannel>, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            channel,
            handler,
            error_handler: None,
            config: MessagingConfig::default(),
        }
    }

    /// Consumer whose retry policy and dead letter channel come from `config`.
    ///
    /// Fails with [`MessagingError::Configuration`] when the batch size or
    /// the retry section is invalid.
    pub fn from_config(
        channel: Arc<QueueChannel>,
        handler: Arc<dyn MessageHandler>,
        config: MessagingConfig,
        channels: Arc<dyn ChannelResolver>,
    ) -> Result<Self, MessagingError> {
        config.validate()?;
        let error_handler = match &config.retry {
            Some(retry) => {
                let mut error_handler = RetryingErrorHandler::new(RetryTemplate::try_from(retry)?, channels);
                if let Some(dead_letter) = &config.dead_letter_channel {
                    error_handler = error_handler.with_dead_letter_channel(dead_letter.clone());
                }
                Some(error_handler)
            }
            None => None,
        };

        Ok(Self {
            channel,
            handler,
            error_handler,
            config,
        })
    }

    pub fn with_error_handler(mut self, error_handler: RetryingErrorHandler) -> Self {
        self.error_handler = Some(error_handler);
        self
    }

    /// Replace the polling settings. A zero batch size is a
    /// [`MessagingError::Configuration`].
    pub fn with_config(mut self, config: MessagingConfig) -> Result<Self, MessagingError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn channel_name(&self) -> &str {
        self.channel.name()
    }

    pub fn config(&self) -> &MessagingConfig {
        &self.config
    }

    /// Handle up to `max_messages_per_poll` buffered messages.
    pub async fn poll_once(&self) -> PollReport {
        let span = info_span!(
            attrs::SPAN_POLL,
            messaging.destination.name = %self.channel.name(),
            messaging.batch.message_count = field::Empty,
            messaging.batch.failed_count = field::Empty,
        );

        async {
            let mut report = PollReport::default();
            while report.received < self.config.max_messages_per_poll {
                let Some(message) = self.channel.receive() else {
                    break;
                };
                report.received += 1;
                if let Err(reason) = self.dispatch(message).await {
                    report.failed += 1;
                    warn!(channel = %self.channel.name(), error = %reason, "message dropped");
                }
            }

            let span = Span::current();
            span.record(attrs::MESSAGING_BATCH_MESSAGE_COUNT, report.received);
            span.record(attrs::MESSAGING_BATCH_FAILED_COUNT, report.failed);
            report
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, message: Message) -> Result<(), String> {
        let span = info_span!(
            attrs::SPAN_PROCESS,
            messaging.message.id = field::Empty,
        );
        if let Some(id) = message.id() {
            span.record(attrs::MESSAGING_MESSAGE_ID, field::display(id));
        }

        async {
            match &self.error_handler {
                Some(error_handler) => error_handler
                    .handle(self.handler.as_ref(), message)
                    .await
                    .map_err(|e| e.to_string()),
                None => self.handler.handle(&message).map_err(|e| e.to_string()),
            }
        }
        .instrument(span)
        .await
    }

    /// Poll until `cancel` fires, sleeping `poll_interval_ms` whenever a poll
    /// leaves the channel drained.
    pub async fn run(&self, cancel: CancellationToken) {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        info!(channel = %self.channel.name(), poll_interval_ms = self.config.poll_interval_ms, "polling consumer started");

        while !cancel.is_cancelled() {
            let report = self.poll_once().await;
            if report.received > 0 {
                debug!(
                    channel = %self.channel.name(),
                    received = report.received,
                    failed = report.failed,
                    "poll completed"
                );
            }
            if !self.channel.is_empty() {
                tokio::task::yield_now().await;
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!(channel = %self.channel.name(), "polling consumer stopped");
    }
}

impl std::fmt::Debug for PollingConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingConsumer")
            .field("channel", &self.channel.name())
            .field("error_handler", &self.error_handler)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
