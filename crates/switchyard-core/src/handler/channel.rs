//! Message channels and name-based channel resolution.
//!
//! Two variants are provided: [`DirectChannel`] dispatches synchronously to
//! its single subscriber, [`QueueChannel`] buffers messages in an unbounded
//! `mpsc` queue and hands them out on non-blocking `receive`.

use std::sync::{Arc, Mutex, OnceLock};

use dashmap::DashMap;
use switchyard_types::{Message, MessagingError};
use tokio::sync::mpsc;
use tracing::debug;

use super::MessageHandler;

pub trait MessageChannel: Send + Sync {
    fn send(&self, message: Message) -> Result<(), MessagingError>;
}

/// A channel messages can be pulled from.
pub trait PollableChannel: MessageChannel {
    /// Next buffered message, or `None` when the channel is empty.
    fn receive(&self) -> Option<Message>;
}

// ---------------------------------------------------------------------------
// DirectChannel
// ---------------------------------------------------------------------------

/// Point-to-point channel that invokes its subscriber on the sender's thread.
pub struct DirectChannel {
    name: String,
    subscriber: OnceLock<Arc<dyn MessageHandler>>,
}

impl DirectChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscriber: OnceLock::new(),
        }
    }

    /// Attach the handler. A direct channel accepts exactly one subscriber.
    pub fn subscribe(&self, handler: Arc<dyn MessageHandler>) -> Result<(), MessagingError> {
        self.subscriber.set(handler).map_err(|_| {
            MessagingError::Channel(format!("direct channel `{}` already has a subscriber", self.name))
        })
    }
}

impl MessageChannel for DirectChannel {
    fn send(&self, message: Message) -> Result<(), MessagingError> {
        let handler = self.subscriber.get().ok_or_else(|| {
            MessagingError::Channel(format!("direct channel `{}` has no subscriber", self.name))
        })?;
        handler.handle(&message)
    }
}

// ---------------------------------------------------------------------------
// QueueChannel
// ---------------------------------------------------------------------------

/// Unbounded in-memory queue.
pub struct QueueChannel {
    name: String,
    sender: mpsc::UnboundedSender<Message>,
    receiver: Mutex<mpsc::UnboundedReceiver<Message>>,
}

impl QueueChannel {
    pub fn new(name: impl Into<String>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            name: name.into(),
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.receiver
            .lock()
            .map(|receiver| receiver.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessageChannel for QueueChannel {
    fn send(&self, message: Message) -> Result<(), MessagingError> {
        self.sender
            .send(message)
            .map_err(|e| MessagingError::Channel(format!("queue `{}` closed: {e}", self.name)))
    }
}

impl PollableChannel for QueueChannel {
    fn receive(&self) -> Option<Message> {
        let mut receiver = self
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        receiver.try_recv().ok()
    }
}

impl std::fmt::Debug for QueueChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueChannel")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Channel resolution
// ---------------------------------------------------------------------------

/// Resolves channel names (output channels, `replyChannel` headers).
pub trait ChannelResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Arc<dyn MessageChannel>, MessagingError>;
}

#[derive(Default)]
pub struct InMemoryChannelResolver {
    channels: DashMap<String, Arc<dyn MessageChannel>>,
}

impl InMemoryChannelResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, channel: Arc<dyn MessageChannel>) {
        let name = name.into();
        debug!(channel = %name, "registered message channel");
        self.channels.insert(name, channel);
    }
}

impl ChannelResolver for InMemoryChannelResolver {
    fn resolve(&self, name: &str) -> Result<Arc<dyn MessageChannel>, MessagingError> {
        self.channels
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| MessagingError::Channel(format!("channel `{name}` is not registered")))
    }
}

impl std::fmt::Debug for InMemoryChannelResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryChannelResolver")
            .field("channels", &self.channels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use switchyard_types::MessageBuilder;

    struct CountingHandler {
        handled: AtomicUsize,
    }

    impl MessageHandler for CountingHandler {
        fn handle(&self, _message: &Message) -> Result<(), MessagingError> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn queue_channel_is_fifo_and_non_blocking() {
        let queue = QueueChannel::new("orders");
        assert!(queue.receive().is_none());

        queue.send(MessageBuilder::with_payload("first").build()).unwrap();
        queue.send(MessageBuilder::with_payload("second").build()).unwrap();
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.receive().unwrap().payload().as_str(), Some("first"));
        assert_eq!(queue.receive().unwrap().payload().as_str(), Some("second"));
        assert!(queue.is_empty());
    }

    #[test]
    fn direct_channel_dispatches_to_subscriber() {
        let handler = Arc::new(CountingHandler { handled: AtomicUsize::new(0) });
        let channel = DirectChannel::new("input");
        channel.subscribe(handler.clone()).unwrap();

        channel.send(MessageBuilder::with_payload(1).build()).unwrap();
        assert_eq!(handler.handled.load(Ordering::SeqCst), 1);
        assert!(channel.subscribe(handler).is_err());
    }

    #[test]
    fn direct_channel_without_subscriber_fails() {
        let channel = DirectChannel::new("input");
        let err = channel.send(MessageBuilder::with_payload(1).build()).unwrap_err();
        assert!(matches!(err, MessagingError::Channel(_)));
    }

    #[test]
    fn resolver_finds_registered_channels() {
        let resolver = InMemoryChannelResolver::new();
        let queue = Arc::new(QueueChannel::new("replies"));
        resolver.register("replies", queue.clone());

        resolver
            .resolve("replies")
            .unwrap()
            .send(MessageBuilder::with_payload("r").build())
            .unwrap();
        assert_eq!(queue.len(), 1);
        assert!(matches!(resolver.resolve("missing"), Err(MessagingError::Channel(_))));
    }
}
