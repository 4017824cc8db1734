//! Service activator: invokes a method for each message and sends its result
//! on as a reply.

use std::fmt;

use switchyard_types::{Annotation, MessagingError, Object};

use super::{EndpointSettings, MethodInterceptor, RequestReplyProducer};
use crate::handler::Collaborators;
use crate::processor::{
    AroundInterceptorReference, Method, MethodInvokerBuilder, ParameterConverter,
    WrapWithMessageBuildProcessor,
};

const KIND: &str = "Service activator";

#[derive(Debug, Clone)]
pub struct ServiceActivatorBuilder {
    invoker: MethodInvokerBuilder,
    settings: EndpointSettings,
}

impl ServiceActivatorBuilder {
    pub fn new(method: Method) -> Self {
        Self {
            invoker: MethodInvokerBuilder::new(method),
            settings: EndpointSettings::new(),
        }
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

    /// Fail with [`MessagingError::MissingReply`] when the method returns null.
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

    pub fn endpoint_id(&self) -> &str {
        &self.settings.endpoint_id
    }

    pub fn input_channel(&self) -> &str {
        &self.settings.input_channel
    }

    pub fn build(&self, collaborators: &Collaborators) -> Result<RequestReplyProducer, MessagingError> {
        let invoker = self.invoker.build(collaborators)?;
        self.settings.build_producer(
            KIND,
            Box::new(WrapWithMessageBuildProcessor::new(invoker)),
            self.invoker.endpoint_annotations(),
            collaborators,
        )
    }
}

impl fmt::Display for ServiceActivatorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.settings.describe(KIND, self.invoker.interface()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::handler::MessageHandler;
    use crate::handler::channel::{InMemoryChannelResolver, PollableChannel, QueueChannel};
    use crate::handler::reference::InMemoryReferenceSearchService;
    use switchyard_types::message::header;
    use switchyard_types::{
        InterfaceParameter, InterfaceToCall, MediaType, MessageBuilder, TypeDescriptor, Value,
    };

    fn upper() -> Method {
        Method::new(
            InterfaceToCall::new("Text", "upper")
                .with_parameter(InterfaceParameter::new("text", TypeDescriptor::String))
                .returning(TypeDescriptor::String),
            |args| Ok(Value::from(args.str("text")?.to_uppercase())),
        )
    }

    fn channels(names: &[&str]) -> (Collaborators, Vec<Arc<QueueChannel>>) {
        let resolver = Arc::new(InMemoryChannelResolver::new());
        let queues: Vec<Arc<QueueChannel>> = names
            .iter()
            .map(|name| {
                let queue = Arc::new(QueueChannel::new(*name));
                resolver.register(*name, queue.clone());
                queue
            })
            .collect();
        (Collaborators::default().with_channels(resolver), queues)
    }

    #[test]
    fn reply_goes_to_output_channel() {
        let (collaborators, queues) = channels(&["out"]);
        let handler = ServiceActivatorBuilder::new(upper())
            .with_input_channel("in")
            .with_output_channel("out")
            .build(&collaborators)
            .unwrap();

        handler.handle(&MessageBuilder::with_payload("hello").build()).unwrap();

        let reply = queues[0].receive().unwrap();
        assert_eq!(reply.payload().as_str(), Some("HELLO"));
        assert_eq!(
            reply.content_type().map(|m| m.to_string()).as_deref(),
            Some("application/x-rust;type=string")
        );
    }

    #[test]
    fn reply_falls_back_to_reply_channel_header() {
        let (collaborators, queues) = channels(&["replies"]);
        let handler = ServiceActivatorBuilder::new(upper()).build(&collaborators).unwrap();

        let request = MessageBuilder::with_payload("x").set_reply_channel("replies").build();
        handler.handle(&request).unwrap();

        let reply = queues[0].receive().unwrap();
        assert_eq!(reply.payload().as_str(), Some("X"));
        assert_eq!(
            reply.headers().get_str(header::PARENT_ID),
            request.id().map(|id| id.to_string()).as_deref()
        );
    }

    #[test]
    fn missing_reply_is_error_only_when_required() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let void = Method::new(
            InterfaceToCall::new("Sink", "accept")
                .with_parameter(InterfaceParameter::new("payload", TypeDescriptor::Anything)),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            },
        );

        let lenient = ServiceActivatorBuilder::new(void.clone())
            .build(&Collaborators::default())
            .unwrap();
        lenient.handle(&MessageBuilder::with_payload(1).build()).unwrap();

        let strict = ServiceActivatorBuilder::new(void)
            .with_endpoint_id("sink")
            .with_requires_reply(true)
            .build(&Collaborators::default())
            .unwrap();
        let err = strict.handle(&MessageBuilder::with_payload(1).build()).unwrap_err();
        assert!(matches!(err, MessagingError::MissingReply { ref endpoint } if endpoint == "sink"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reply_without_destination_is_dropped() {
        let handler = ServiceActivatorBuilder::new(upper())
            .build(&Collaborators::default())
            .unwrap();
        assert!(handler.handle(&MessageBuilder::with_payload("x").build()).is_ok());
    }

    #[test]
    fn unknown_output_channel_fails_on_send() {
        let handler = ServiceActivatorBuilder::new(upper())
            .with_output_channel("nowhere")
            .build(&Collaborators::default())
            .unwrap();
        let err = handler.handle(&MessageBuilder::with_payload("x").build()).unwrap_err();
        assert!(matches!(err, MessagingError::Channel(_)));
    }

    #[test]
    fn before_and_after_advice_wrap_target() {
        let exclaim = Method::new(
            InterfaceToCall::new("Exclaim", "apply")
                .with_parameter(InterfaceParameter::new("text", TypeDescriptor::String))
                .returning(TypeDescriptor::String),
            |args| Ok(Value::from(format!("{}!", args.str("text")?))),
        );
        let stamp = Method::new(
            InterfaceToCall::new("Stamp", "apply").returning(TypeDescriptor::Map),
            |_| Ok(Value::from(serde_json::json!({"stamped": "yes"}))),
        );

        let handler = ServiceActivatorBuilder::new(upper())
            .with_before_interceptor(MethodInterceptor::new(exclaim))
            .with_after_interceptor(MethodInterceptor::new(stamp).changing_headers())
            .build(&Collaborators::default())
            .unwrap();

        let reply = handler.produce(&MessageBuilder::with_payload("hey").build()).unwrap().unwrap();
        assert_eq!(reply.payload().as_str(), Some("HEY!"));
        assert_eq!(reply.headers().get_str("stamped"), Some("yes"));
    }

    #[test]
    fn before_advice_changing_payload_type_is_converted_for_target() {
        let length = Method::new(
            InterfaceToCall::new("Length", "apply")
                .with_parameter(InterfaceParameter::new("text", TypeDescriptor::String))
                .returning(TypeDescriptor::Int),
            |args| Ok(Value::from(args.str("text")?.len() as i64)),
        );
        let handler = ServiceActivatorBuilder::new(upper())
            .with_before_interceptor(MethodInterceptor::new(length))
            .build(&Collaborators::default())
            .unwrap();

        let request = MessageBuilder::with_payload("abcd")
            .set_content_type(&MediaType::application_x_rust_with_type(&TypeDescriptor::String))
            .build();
        let reply = handler.produce(&request).unwrap().unwrap();
        assert_eq!(reply.payload().as_str(), Some("4"));
    }

    #[test]
    fn around_interceptor_selected_by_endpoint_annotation() {
        let shout = AroundInterceptorReference::new(Method::new(
            InterfaceToCall::new("Shout", "around")
                .with_parameter(InterfaceParameter::new("invocation", TypeDescriptor::MethodInvocation))
                .returning(TypeDescriptor::String),
            |args| {
                let invocation = args.invocation().ok_or_else(|| anyhow::anyhow!("no invocation"))?;
                let result = invocation.proceed()?;
                Ok(Value::from(format!("{}!!", result.as_str().unwrap_or_default())))
            },
        ))
        .with_pointcut("@(Loud)");

        let quiet = ServiceActivatorBuilder::new(upper())
            .with_around_interceptor(shout.clone())
            .build(&Collaborators::default())
            .unwrap();
        let reply = quiet.produce(&MessageBuilder::with_payload("a").build()).unwrap().unwrap();
        assert_eq!(reply.payload().as_str(), Some("A"));

        let loud = ServiceActivatorBuilder::new(upper())
            .with_endpoint_annotation(Annotation::new("Loud"))
            .with_around_interceptor(shout)
            .build(&Collaborators::default())
            .unwrap();
        let reply = loud.produce(&MessageBuilder::with_payload("a").build()).unwrap().unwrap();
        assert_eq!(reply.payload().as_str(), Some("A!!"));
    }

    #[test]
    fn activator_on_reference() {
        struct Counter {
            step: i64,
        }
        let method = Method::on::<Counter, _>(
            InterfaceToCall::new("Counter", "next")
                .with_parameter(InterfaceParameter::new("value", TypeDescriptor::Int))
                .returning(TypeDescriptor::Int),
            |counter, args| {
                let value = args.require("value")?.as_i64().unwrap_or_default();
                Ok(Value::from(value + counter.step))
            },
        );
        let references =
            InMemoryReferenceSearchService::with_objects([("counter", Object::named("Counter", Counter { step: 5 }))]);

        let handler = ServiceActivatorBuilder::new(method)
            .on_reference("counter")
            .build(&Collaborators::new(Arc::new(references)))
            .unwrap();
        let reply = handler.produce(&MessageBuilder::with_payload(10).build()).unwrap().unwrap();
        assert_eq!(reply.payload().as_i64(), Some(15));
    }

    #[test]
    fn describes_itself() {
        let builder = ServiceActivatorBuilder::new(upper())
            .with_endpoint_id("upper")
            .with_input_channel("texts");
        assert_eq!(
            builder.to_string(),
            "Service activator - Text::upper with name `upper` for input channel `texts`"
        );
        assert_eq!(builder.endpoint_id(), "upper");
        assert_eq!(builder.input_channel(), "texts");
    }
}
