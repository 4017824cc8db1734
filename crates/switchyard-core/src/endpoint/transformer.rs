//! Transformer: replaces a message's payload or enriches its headers with
//! the result of a method.

use std::fmt;

use switchyard_types::{
    Annotation, InterfaceParameter, InterfaceToCall, Message, MessageBuilder, MessagingError, Object,
    TypeDescriptor, Value,
};

use super::{EndpointSettings, MethodInterceptor, ReplyProcessor, RequestReplyProducer, header_entries};
use crate::handler::Collaborators;
use crate::processor::compatibility::reply_media_type;
use crate::processor::{
    AroundInterceptorReference, Method, MethodInvoker, MethodInvokerBuilder, ParameterConverter,
};

const KIND: &str = "Transformer";

#[derive(Debug, Clone)]
pub struct TransformerBuilder {
    invoker: MethodInvokerBuilder,
    settings: EndpointSettings,
}

impl TransformerBuilder {
    /// Transform with a method. Its return value becomes the new payload;
    /// a map return is merged into the headers instead.
    pub fn new(method: Method) -> Self {
        Self {
            invoker: MethodInvokerBuilder::new(method),
            settings: EndpointSettings::new(),
        }
    }

    /// Add fixed headers, leaving the payload untouched.
    pub fn header_enricher<I, K, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        let headers: serde_json::Map<String, serde_json::Value> = headers
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();
        let method = Method::new(
            InterfaceToCall::new("HeaderEnricher", "transform").returning(TypeDescriptor::Map),
            move |_| Ok(Value::from(serde_json::Value::Object(headers.clone()))),
        );
        Self::new(method)
    }

    /// Replace the payload with an expression evaluated over
    /// `{payload, headers}`.
    pub fn with_expression(expression: impl Into<String>) -> Self {
        let method = Method::new(
            InterfaceToCall::new("ExpressionTransformer", "transform")
                .with_parameter(InterfaceParameter::new("result", TypeDescriptor::Anything))
                .returning(TypeDescriptor::Anything),
            |args| Ok(args.take("result").unwrap_or_default()),
        );
        Self::new(method).with_converters([ParameterConverter::expression("result", expression)])
    }

    pub fn on_object(mut self, object: Object) -> Self {
        self.invoker = self.invoker.on_object(object);
        self
    }

    pub fn on_reference(mut self, reference: impl Into<String>) -> Self {
        self.invoker = self.invoker.on_reference(reference);
        self
    }

    pub fn with_endpoint_id(mut self, endpoint_id: impl Into<String>) -> Self {
        self.settings.endpoint_id = endpoint_id.into();
        self
    }

    pub fn with_input_channel(mut self, channel: impl Into<String>) -> Self {
        self.settings.input_channel = channel.into();
        self
    }

    pub fn with_output_channel(mut self, channel: impl Into<String>) -> Self {
        self.settings.output_channel = Some(channel.into());
        self
    }

    pub fn with_requires_reply(mut self, requires_reply: bool) -> Self {
        self.settings.requires_reply = requires_reply;
        self
    }

    pub fn with_converters(mut self, converters: impl IntoIterator<Item = ParameterConverter>) -> Self {
        self.invoker = self.invoker.with_converters(converters);
        self
    }

    pub fn with_around_interceptor(mut self, interceptor: AroundInterceptorReference) -> Self {
        self.invoker = self.invoker.with_around_interceptor(interceptor);
        self
    }

    pub fn with_before_interceptor(mut self, interceptor: MethodInterceptor) -> Self {
        self.settings.before.push(interceptor);
        self
    }

    pub fn with_after_interceptor(mut self, interceptor: MethodInterceptor) -> Self {
        self.settings.after.push(interceptor);
        self
    }

    pub fn with_endpoint_annotation(mut self, annotation: Annotation) -> Self {
        self.invoker = self.invoker.with_endpoint_annotation(annotation);
        self
    }

    pub fn build(&self, collaborators: &Collaborators) -> Result<RequestReplyProducer, MessagingError> {
        let interface = self.invoker.interface();
        if !interface.has_return_value() {
            return Err(MessagingError::configuration(format!(
                "transformer {interface} must return a value"
            )));
        }

        let invoker = self.invoker.build(collaborators)?;
        self.settings.build_producer(
            KIND,
            Box::new(TransformerProcessor { invoker }),
            self.invoker.endpoint_annotations(),
            collaborators,
        )
    }
}

impl fmt::Display for TransformerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.settings.describe(KIND, self.invoker.interface()))
    }
}

struct TransformerProcessor {
    invoker: MethodInvoker,
}

impl ReplyProcessor for TransformerProcessor {
    fn process(&self, request: &Message) -> Result<Option<Message>, MessagingError> {
        let result = self.invoker.process_message(request)?;

        let reply = match result {
            result if result.is_null() => return Ok(None),
            Value::Message(message) => message,
            result => match header_entries(&result) {
                Some(entries) => MessageBuilder::from_message(request).set_headers(entries).build(),
                None => {
                    let content_type = reply_media_type(self.invoker.interface().return_type(), &result);
                    MessageBuilder::from_message(request)
                        .set_payload(result)
                        .set_content_type(&content_type)
                        .build()
                }
            },
        };
        Ok(Some(reply))
    }

    fn interface(&self) -> &InterfaceToCall {
        self.invoker.interface()
    }
}
