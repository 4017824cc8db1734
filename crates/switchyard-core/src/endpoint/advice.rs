//! Before and after advice: methods run on the request before an endpoint's
//! target, or on its reply afterwards.

use switchyard_types::{
    Annotation, InterfaceToCall, Message, MessageBuilder, MessagingError, Object, TypeDescriptor, Value,
};
use tracing::debug;

use super::header_entries;
use crate::handler::Collaborators;
use crate::processor::compatibility::reply_media_type;
use crate::processor::interceptor::DEFAULT_PRECEDENCE;
use crate::processor::{Method, MethodInvoker, MethodInvokerBuilder, ParameterConverter, Pointcut};

/// A method applied to a message passing through an endpoint.
///
/// A null result leaves the message unchanged, a message result replaces it.
/// Any other result becomes the new payload, or with `change_headers` is
/// merged into the headers.
#[derive(Debug, Clone)]
pub struct MethodInterceptor {
    invoker: MethodInvokerBuilder,
    precedence: i32,
    pointcut: Option<String>,
    change_headers: bool,
}

impl MethodInterceptor {
    pub fn new(method: Method) -> Self {
        Self {
            invoker: MethodInvokerBuilder::new(method),
            precedence: DEFAULT_PRECEDENCE,
            pointcut: None,
            change_headers: false,
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

    pub fn with_converters(mut self, converters: impl IntoIterator<Item = ParameterConverter>) -> Self {
        self.invoker = self.invoker.with_converters(converters);
        self
    }

    pub fn with_precedence(mut self, precedence: i32) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn with_pointcut(mut self, pointcut: impl Into<String>) -> Self {
        self.pointcut = Some(pointcut.into());
        self
    }

    /// Merge the returned map into the headers instead of replacing the payload.
    pub fn changing_headers(mut self) -> Self {
        self.change_headers = true;
        self
    }

    pub fn precedence(&self) -> i32 {
        self.precedence
    }

    pub(crate) fn resolve(
        &self,
        target: &InterfaceToCall,
        endpoint_annotations: &[Annotation],
        collaborators: &Collaborators,
    ) -> Result<Option<ResolvedAdvice>, MessagingError> {
        let pointcut = match &self.pointcut {
            Some(expression) => Pointcut::parse(expression)?,
            None => Pointcut::Any,
        };
        if !pointcut.matches(target, endpoint_annotations) {
            return Ok(None);
        }

        let return_type = self.invoker.interface().return_type();
        if self.change_headers && !matches!(return_type, TypeDescriptor::Void) && !return_type.accepts_headers() {
            return Err(MessagingError::configuration(format!(
                "{} changes headers but returns {return_type}",
                self.invoker.interface()
            )));
        }

        Ok(Some(ResolvedAdvice {
            invoker: self.invoker.build(collaborators)?,
            change_headers: self.change_headers,
        }))
    }
}

#[derive(Debug)]
pub(crate) struct ResolvedAdvice {
    invoker: MethodInvoker,
    change_headers: bool,
}

impl ResolvedAdvice {
    pub(crate) fn apply(&self, message: &Message) -> Result<Message, MessagingError> {
        let result = self.invoker.process_message(message)?;
        debug!(advice = %self.invoker.interface(), "applied advice");

        match result {
            result if result.is_null() => Ok(message.clone()),
            Value::Message(replacement) => Ok(replacement),
            result if self.change_headers => {
                let entries = header_entries(&result).ok_or_else(|| {
                    MessagingError::conversion(
                        TypeDescriptor::of_value(&result),
                        TypeDescriptor::Map,
                        format!("{} must return a map of headers", self.invoker.interface()),
                    )
                })?;
                Ok(MessageBuilder::from_message(message).set_headers(entries).build())
            }
            result => {
                let content_type = reply_media_type(self.invoker.interface().return_type(), &result);
                Ok(MessageBuilder::from_message(message)
                    .set_payload(result)
                    .set_content_type(&content_type)
                    .build())
            }
        }
    }
}
