//! Redelivers failed messages to their handler following a retry template.

use std::collections::VecDeque;
use std::sync::Arc;

use switchyard_types::message::header;
use switchyard_types::{Message, MessageBuilder, MessagingError};
use thiserror::Error;
use tracing::{debug, warn};

use super::template::RetryTemplate;

/// Failures kept for [`RetryError::Exhausted`]; older ones are discarded.
pub const MAX_RECORDED_FAILURES: usize = 10;
use crate::handler::MessageHandler;
use crate::handler::channel::ChannelResolver;

#[derive(Debug, Error)]
pub enum RetryError {
    #[error("message handling failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        /// The last [`MAX_RECORDED_FAILURES`] failures, oldest first.
        failures: Vec<String>,
        #[source]
        source: MessagingError,
    },

    #[error("could not route failed message to dead letter channel '{channel}': {source}")]
    DeadLetter {
        channel: String,
        #[source]
        source: MessagingError,
    },
}

/// Calls a handler, retrying failures with the template's backoff.
///
/// The first call is not a retry: a template allowing `n` attempts calls the
/// handler at most `n + 1` times. Retried messages carry a `retryAttempt`
/// header. When retries are exhausted the message goes to the dead letter
/// channel if one is set, otherwise the last error is returned.
pub struct RetryingErrorHandler {
    template: RetryTemplate,
    channels: Arc<dyn ChannelResolver>,
    dead_letter_channel: Option<String>,
}

impl RetryingErrorHandler {
    pub fn new(template: RetryTemplate, channels: Arc<dyn ChannelResolver>) -> Self {
        Self {
            template,
            channels,
            dead_letter_channel: None,
        }
    }

    pub fn with_dead_letter_channel(mut self, channel: impl Into<String>) -> Self {
        self.dead_letter_channel = Some(channel.into());
        self
    }

    pub fn template(&self) -> &RetryTemplate {
        &self.template
    }

    pub async fn handle(&self, handler: &dyn MessageHandler, message: Message) -> Result<(), RetryError> {
        let mut failures = VecDeque::with_capacity(MAX_RECORDED_FAILURES);
        let mut current = message.clone();
        let mut retry: u32 = 0;

        loop {
            let error = match handler.handle(&current) {
                Ok(()) => {
                    if retry > 0 {
                        debug!(attempt = retry, "message handled after retry");
                    }
                    return Ok(());
                }
                Err(error) => error,
            };

            warn!(
                attempt = retry,
                message_id = ?message.id(),
                error = %error,
                "message handling failed"
            );
            if failures.len() == MAX_RECORDED_FAILURES {
                failures.pop_front();
            }
            failures.push_back(error.to_string());

            let next = retry + 1;
            if !self.template.can_be_called_next_time(next) {
                return self.exhausted(&message, next, failures.into(), error);
            }

            tokio::time::sleep(self.template.next_delay(next)).await;
            current = redelivery(&message, next);
            retry = next;
        }
    }

    fn exhausted(
        &self,
        message: &Message,
        attempts: u32,
        failures: Vec<String>,
        error: MessagingError,
    ) -> Result<(), RetryError> {
        let Some(channel) = &self.dead_letter_channel else {
            return Err(RetryError::Exhausted {
                attempts,
                failures,
                source: error,
            });
        };

        let dead_letter = MessageBuilder::from_message(message)
            .set_header(header::EXCEPTION_MESSAGE, error.to_string())
            .set_header(header::RETRY_ATTEMPT, attempts.saturating_sub(1))
            .build();
        self.channels
            .resolve(channel)
            .and_then(|target| target.send(dead_letter))
            .map_err(|source| RetryError::DeadLetter {
                channel: channel.clone(),
                source,
            })?;

        warn!(channel = %channel, attempts, "retries exhausted, message sent to dead letter channel");
        Ok(())
    }
}

/// The original message again, keeping its id, marked with the retry number.
fn redelivery(message: &Message, retry: u32) -> Message {
    let mut builder = MessageBuilder::from_message(message).set_header(header::RETRY_ATTEMPT, retry);
    if let Some(id) = message.id() {
        builder = builder.set_header(header::ID, id.to_string());
    }
    builder.build()
}

impl std::fmt::Debug for RetryingErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingErrorHandler")
            .field("template", &self.template)
            .field("dead_letter_channel", &self.dead_letter_channel)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::handler::channel::{InMemoryChannelResolver, PollableChannel, QueueChannel};
    use crate::retry::RetryTemplateBuilder;

    /// Fails the first `failures` calls, recording the retry header it saw.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        seen: Mutex<Vec<Option<u64>>>,
    }

    impl Flaky {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl MessageHandler for Flaky {
        fn handle(&self, message: &Message) -> Result<(), MessagingError> {
            self.seen
                .lock()
                .unwrap()
                .push(message.headers().get(header::RETRY_ATTEMPT).and_then(|v| v.as_u64()));
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(MessagingError::Channel(format!("failure {call}")));
            }
            Ok(())
        }
    }

    fn template(max_attempts: u32) -> RetryTemplate {
        RetryTemplateBuilder::fixed_back_off(1)
            .max_retry_attempts(max_attempts)
            .build()
            .unwrap()
    }

    fn no_channels() -> Arc<dyn ChannelResolver> {
        Arc::new(InMemoryChannelResolver::new())
    }

    #[tokio::test]
    async fn succeeds_after_retries() {
        let handler = Flaky::new(2);
        let message = MessageBuilder::with_payload("x").build();

        RetryingErrorHandler::new(template(3), no_channels())
            .handle(&handler, message.clone())
            .await
            .unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(*handler.seen.lock().unwrap(), vec![None, Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn retried_message_keeps_its_id() {
        struct IdCheck {
            ids: Mutex<Vec<Option<uuid::Uuid>>>,
        }
        impl MessageHandler for IdCheck {
            fn handle(&self, message: &Message) -> Result<(), MessagingError> {
                let mut ids = self.ids.lock().unwrap();
                ids.push(message.id());
                if ids.len() < 2 {
                    return Err(MessagingError::Channel("once".into()));
                }
                Ok(())
            }
        }

        let handler = IdCheck { ids: Mutex::new(Vec::new()) };
        let message = MessageBuilder::with_payload("x").build();
        RetryingErrorHandler::new(template(1), no_channels())
            .handle(&handler, message.clone())
            .await
            .unwrap();

        let ids = handler.ids.lock().unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.iter().all(|id| *id == message.id()));
    }

    #[tokio::test]
    async fn exhausted_retries_report_every_failure() {
        let handler = Flaky::new(10);
        let err = RetryingErrorHandler::new(template(2), no_channels())
            .handle(&handler, MessageBuilder::with_payload("x").build())
            .await
            .unwrap_err();

        match err {
            RetryError::Exhausted { attempts, failures, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(failures.len(), 3);
                assert!(failures[0].contains("failure 0"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn only_latest_failures_are_kept() {
        let handler = Flaky::new(100);
        let err = RetryingErrorHandler::new(template(14), no_channels())
            .handle(&handler, MessageBuilder::with_payload("x").build())
            .await
            .unwrap_err();

        match err {
            RetryError::Exhausted { attempts, failures, .. } => {
                assert_eq!(attempts, 15);
                assert_eq!(failures.len(), MAX_RECORDED_FAILURES);
                assert!(failures[0].contains("failure 5"));
                assert!(failures[MAX_RECORDED_FAILURES - 1].contains("failure 14"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausted_message_goes_to_dead_letter() {
        let resolver = Arc::new(InMemoryChannelResolver::new());
        let dead_letters = Arc::new(QueueChannel::new("dead"));
        resolver.register("dead", dead_letters.clone());

        let handler = Flaky::new(10);
        RetryingErrorHandler::new(template(1), resolver)
            .with_dead_letter_channel("dead")
            .handle(&handler, MessageBuilder::with_payload("poison").build())
            .await
            .unwrap();

        let dead = dead_letters.receive().unwrap();
        assert_eq!(dead.payload().as_str(), Some("poison"));
        assert!(
            dead.headers()
                .get_str(header::EXCEPTION_MESSAGE)
                .is_some_and(|m| m.contains("failure 1"))
        );
    }

    #[tokio::test]
    async fn unknown_dead_letter_channel_is_reported() {
        let err = RetryingErrorHandler::new(template(1), no_channels())
            .with_dead_letter_channel("missing")
            .handle(&Flaky::new(10), MessageBuilder::with_payload("x").build())
            .await
            .unwrap_err();
        assert!(matches!(err, RetryError::DeadLetter { ref channel, .. } if channel == "missing"));
    }
}
