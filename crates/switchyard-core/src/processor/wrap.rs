//! Wraps a processor's raw result into a reply message.

use switchyard_types::message::header;
use switchyard_types::{InterfaceToCall, Message, MessageBuilder, MessagingError, TypeDescriptor, Value};

use super::MessageProcessor;
use super::compatibility;

/// Runs a processor and turns its result into a reply.
#[derive(Debug)]
pub struct WrapWithMessageBuildProcessor<P> {
    processor: P,
}

impl<P: MessageProcessor> WrapWithMessageBuildProcessor<P> {
    pub fn new(processor: P) -> Self {
        Self { processor }
    }

    pub fn interface(&self) -> &InterfaceToCall {
        self.processor.interface()
    }

    /// `None` when the processor produced nothing to reply with.
    pub fn process_message(&self, request: &Message) -> Result<Option<Message>, MessagingError> {
        let result = self.processor.process_message(request)?;
        Ok(build_reply(request, self.processor.interface().return_type(), result))
    }
}

/// Build the reply to `request` carrying `result`.
///
/// Null yields no reply and a returned message is used as is. Otherwise the
/// reply copies the request headers, records the request as its parent and
/// gets a content type for the resolved reply type.
pub fn build_reply(request: &Message, declared: &TypeDescriptor, result: Value) -> Option<Message> {
    match result {
        result if result.is_null() => None,
        Value::Message(message) => Some(message),
        result => {
            let content_type = compatibility::reply_media_type(declared, &result);
            let mut builder = MessageBuilder::from_message(request)
                .set_payload(result)
                .set_content_type(&content_type);
            if let Some(id) = request.id() {
                builder = builder
                    .set_header(header::PARENT_ID, id.to_string())
                    .set_header_if_absent(header::CORRELATION_ID, id.to_string());
            }
            Some(builder.build())
        }
    }
}
