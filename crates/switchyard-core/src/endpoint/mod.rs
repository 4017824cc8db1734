//! Endpoints: message handlers built around a method invoker.
//!
//! Every endpoint runs the same request/reply cycle:
//!
//! 1. before advice, in precedence order, may rewrite the request;
//! 2. the endpoint's processor produces an optional reply;
//! 3. after advice may rewrite the reply;
//! 4. the reply goes to the output channel, else to the request's
//!    `replyChannel`.

pub mod advice;
pub mod service_activator;
pub mod transformer;

use std::sync::Arc;

use switchyard_types::{Annotation, InterfaceToCall, Message, MessagingError, Value};
use tracing::debug;
use uuid::Uuid;

use self::advice::ResolvedAdvice;
use crate::handler::channel::ChannelResolver;
use crate::handler::{Collaborators, MessageHandler};
use crate::processor::{MessageProcessor, WrapWithMessageBuildProcessor};

pub use advice::MethodInterceptor;
pub use service_activator::ServiceActivatorBuilder;
pub use transformer::TransformerBuilder;

/// Produces the reply, if any, for a request.
pub trait ReplyProcessor: Send + Sync {
    fn process(&self, request: &Message) -> Result<Option<Message>, MessagingError>;

    fn interface(&self) -> &InterfaceToCall;
}

impl<P: MessageProcessor> ReplyProcessor for WrapWithMessageBuildProcessor<P> {
    fn process(&self, request: &Message) -> Result<Option<Message>, MessagingError> {
        self.process_message(request)
    }

    fn interface(&self) -> &InterfaceToCall {
        WrapWithMessageBuildProcessor::interface(self)
    }
}

// ---------------------------------------------------------------------------
// Settings shared by endpoint builders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub(crate) struct EndpointSettings {
    pub(crate) endpoint_id: String,
    pub(crate) input_channel: String,
    pub(crate) output_channel: Option<String>,
    pub(crate) requires_reply: bool,
    pub(crate) before: Vec<MethodInterceptor>,
    pub(crate) after: Vec<MethodInterceptor>,
}

impl EndpointSettings {
    pub(crate) fn new() -> Self {
        Self {
            endpoint_id: Uuid::now_v7().to_string(),
            input_channel: String::new(),
            output_channel: None,
            requires_reply: false,
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    pub(crate) fn describe(&self, kind: &str, interface: &InterfaceToCall) -> String {
        format!(
            "{kind} - {interface} with name `{}` for input channel `{}`",
            self.endpoint_id, self.input_channel
        )
    }

    pub(crate) fn build_producer(
        &self,
        kind: &'static str,
        processor: Box<dyn ReplyProcessor>,
        endpoint_annotations: &[Annotation],
        collaborators: &Collaborators,
    ) -> Result<RequestReplyProducer, MessagingError> {
        let interface = processor.interface().clone();
        let before = resolve_advice(&self.before, &interface, endpoint_annotations, collaborators)?;
        let after = resolve_advice(&self.after, &interface, endpoint_annotations, collaborators)?;

        debug!(
            endpoint = %self.endpoint_id,
            kind,
            target = %interface,
            input_channel = %self.input_channel,
            "built endpoint"
        );

        Ok(RequestReplyProducer {
            kind,
            endpoint_id: self.endpoint_id.clone(),
            input_channel: self.input_channel.clone(),
            output_channel: self.output_channel.clone(),
            requires_reply: self.requires_reply,
            processor,
            before,
            after,
            channels: Arc::clone(&collaborators.channels),
        })
    }
}

fn resolve_advice(
    advice: &[MethodInterceptor],
    target: &InterfaceToCall,
    endpoint_annotations: &[Annotation],
    collaborators: &Collaborators,
) -> Result<Vec<ResolvedAdvice>, MessagingError> {
    let mut ordered: Vec<&MethodInterceptor> = advice.iter().collect();
    ordered.sort_by_key(|a| a.precedence());

    let mut resolved = Vec::with_capacity(ordered.len());
    for interceptor in ordered {
        if let Some(advice) = interceptor.resolve(target, endpoint_annotations, collaborators)? {
            resolved.push(advice);
        }
    }
    Ok(resolved)
}

/// Header entries carried by a map-like result.
pub(crate) fn header_entries(value: &Value) -> Option<Vec<(String, serde_json::Value)>> {
    match value {
        Value::Headers(headers) => Some(
            headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        ),
        Value::Json(serde_json::Value::Object(map)) => Some(
            map.iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        ),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// RequestReplyProducer
// ---------------------------------------------------------------------------

/// The handler every endpoint builder produces.
pub struct RequestReplyProducer {
    kind: &'static str,
    endpoint_id: String,
    input_channel: String,
    output_channel: Option<String>,
    requires_reply: bool,
    processor: Box<dyn ReplyProcessor>,
    before: Vec<ResolvedAdvice>,
    after: Vec<ResolvedAdvice>,
    channels: Arc<dyn ChannelResolver>,
}

impl RequestReplyProducer {
    pub fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    pub fn input_channel(&self) -> &str {
        &self.input_channel
    }

    pub fn interface(&self) -> &InterfaceToCall {
        self.processor.interface()
    }

    /// Run the request/reply cycle and return the reply without sending it.
    pub fn produce(&self, message: &Message) -> Result<Option<Message>, MessagingError> {
        let mut request = message.clone();
        for advice in &self.before {
            request = advice.apply(&request)?;
        }

        let Some(mut reply) = self.processor.process(&request)? else {
            if self.requires_reply {
                return Err(MessagingError::MissingReply {
                    endpoint: self.endpoint_id.clone(),
                });
            }
            return Ok(None);
        };

        for advice in &self.after {
            reply = advice.apply(&reply)?;
        }
        Ok(Some(reply))
    }

    fn send_reply(&self, request: &Message, reply: Message) -> Result<(), MessagingError> {
        let destination = self
            .output_channel
            .as_deref()
            .or_else(|| request.headers().reply_channel());

        match destination {
            Some(channel) => {
                debug!(endpoint = %self.endpoint_id, channel, "sending reply");
                self.channels.resolve(channel)?.send(reply)
            }
            None => {
                debug!(
                    endpoint = %self.endpoint_id,
                    kind = self.kind,
                    "no output or reply channel, dropping reply"
                );
                Ok(())
            }
        }
    }
}

impl MessageHandler for RequestReplyProducer {
    fn handle(&self, message: &Message) -> Result<(), MessagingError> {
        match self.produce(message)? {
            Some(reply) => self.send_reply(message, reply),
            None => {
                debug!(endpoint = %self.endpoint_id, kind = self.kind, "no reply produced");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for RequestReplyProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestReplyProducer")
            .field("kind", &self.kind)
            .field("endpoint_id", &self.endpoint_id)
            .field("input_channel", &self.input_channel)
            .field("output_channel", &self.output_channel)
            .field("requires_reply", &self.requires_reply)
            .finish_non_exhaustive()
    }
}
