//! The method invoker: turns a message into a call of one target method.
//!
//! Built once from a [`MethodInvokerBuilder`]; every converter, interceptor
//! and reference is resolved at build time, so `process_message` only reads
//! shared state and can run concurrently.

use std::sync::Arc;

use switchyard_types::{
    Annotation, InterfaceToCall, Message, MessagingError, Object, TypeDescriptor, Value,
};
use tracing::{debug, debug_span};

use super::converter::ParameterConverter;
use super::interceptor::AroundInterceptorReference;
use super::invocation::InvocationChain;
use super::method::{Method, TargetObject};
use super::MessageProcessor;
use crate::handler::Collaborators;

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Wiring for a [`MethodInvoker`].
#[derive(Debug, Clone)]
pub struct MethodInvokerBuilder {
    method: Method,
    object: TargetObject,
    converters: Vec<ParameterConverter>,
    interceptors: Vec<AroundInterceptorReference>,
    endpoint_annotations: Vec<Annotation>,
}

impl MethodInvokerBuilder {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            object: TargetObject::Static,
            converters: Vec::new(),
            interceptors: Vec::new(),
            endpoint_annotations: Vec::new(),
        }
    }

    pub fn on_object(mut self, object: Object) -> Self {
        self.object = TargetObject::Instance(object);
        self
    }

    /// Invoke the method on the collaborator registered as `reference`.
    pub fn on_reference(mut self, reference: impl Into<String>) -> Self {
        self.object = TargetObject::Reference(reference.into());
        self
    }

    pub fn with_converter(mut self, converter: ParameterConverter) -> Self {
        self.converters.push(converter);
        self
    }

    pub fn with_converters(mut self, converters: impl IntoIterator<Item = ParameterConverter>) -> Self {
        self.converters.extend(converters);
        self
    }

    pub fn with_around_interceptor(mut self, interceptor: AroundInterceptorReference) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn with_around_interceptors(
        mut self,
        interceptors: impl IntoIterator<Item = AroundInterceptorReference>,
    ) -> Self {
        self.interceptors.extend(interceptors);
        self
    }

    /// Annotations of the endpoint this invoker serves, visible to pointcuts.
    pub fn with_endpoint_annotation(mut self, annotation: Annotation) -> Self {
        self.endpoint_annotations.push(annotation);
        self
    }

    pub fn interface(&self) -> &InterfaceToCall {
        self.method.interface()
    }

    pub fn endpoint_annotations(&self) -> &[Annotation] {
        &self.endpoint_annotations
    }

    pub fn build(&self, collaborators: &Collaborators) -> Result<MethodInvoker, MessagingError> {
        let interface = self.method.interface();
        let object = self.object.resolve(collaborators.references.as_ref())?;
        let converters = bind_converters(interface, &self.converters)?;

        let mut ordered: Vec<&AroundInterceptorReference> = self.interceptors.iter().collect();
        ordered.sort_by_key(|interceptor| interceptor.precedence());

        let mut interceptors = Vec::with_capacity(ordered.len());
        for reference in ordered {
            if let Some(resolved) = reference.resolve(
                interface,
                object.as_ref(),
                &self.endpoint_annotations,
                collaborators,
            )? {
                interceptors.push(resolved);
            }
        }

        debug!(
            target = %interface,
            interceptors = interceptors.len(),
            "built method invoker"
        );

        Ok(MethodInvoker {
            converters,
            chain: Arc::new(InvocationChain {
                target: self.method.clone(),
                object,
                parameter_names: self.method.parameter_names(),
                interceptors,
                collaborators: collaborators.clone(),
            }),
        })
    }
}

/// One converter per parameter, in declaration order.
///
/// Explicit converters win; the rest get implicit defaults: a `Message`
/// parameter receives the message, the first free parameter the payload and
/// the next one that accepts a mapping all headers.
fn bind_converters(
    interface: &InterfaceToCall,
    explicit: &[ParameterConverter],
) -> Result<Vec<ParameterConverter>, MessagingError> {
    let mut bound: Vec<Option<ParameterConverter>> = vec![None; interface.parameters().len()];

    for converter in explicit {
        let parameter = interface.parameter(converter.parameter_name()).ok_or_else(|| {
            MessagingError::configuration(format!(
                "{interface} has no parameter '{}'",
                converter.parameter_name()
            ))
        })?;
        let slot = &mut bound[parameter.position()];
        if slot.is_some() {
            return Err(MessagingError::configuration(format!(
                "{interface} has more than one converter for parameter '{}'",
                parameter.name()
            )));
        }
        converter.validate(parameter)?;
        *slot = Some(converter.clone());
    }

    let mut payload_bound = bound
        .iter()
        .flatten()
        .any(|c| matches!(c, ParameterConverter::Payload { .. }));
    let mut headers_bound = bound
        .iter()
        .flatten()
        .any(|c| matches!(c, ParameterConverter::AllHeaders { .. }));

    for (parameter, slot) in interface.parameters().iter().zip(bound.iter_mut()) {
        if slot.is_some() {
            continue;
        }
        let declared = parameter.type_descriptor();
        let converter = if matches!(declared, TypeDescriptor::Message) {
            ParameterConverter::message(parameter.name())
        } else if !payload_bound {
            payload_bound = true;
            ParameterConverter::payload(parameter.name())
        } else if !headers_bound && declared.accepts_headers() {
            headers_bound = true;
            ParameterConverter::all_headers(parameter.name())
        } else {
            return Err(MessagingError::argument_resolution(
                interface.identity(),
                parameter.name(),
                "no converter specified and no implicit default applies",
            ));
        };
        *slot = Some(converter);
    }

    Ok(bound.into_iter().flatten().collect())
}

// ---------------------------------------------------------------------------
// Invoker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InvocationState {
    Created,
    ArgumentsResolved,
    Invoking,
    Completed,
    Failed,
}

impl InvocationState {
    fn advance(&mut self, next: InvocationState) {
        debug!(from = ?*self, to = ?next, "invocation state");
        *self = next;
    }

    fn fail(&mut self, error: MessagingError) -> MessagingError {
        debug!(from = ?*self, error = %error, "invocation failed");
        *self = InvocationState::Failed;
        error
    }
}

/// Invokes one target method, with its converters and interceptor chain,
/// for each message it is given.
pub struct MethodInvoker {
    converters: Vec<ParameterConverter>,
    chain: Arc<InvocationChain>,
}

impl MethodInvoker {
    pub fn interface(&self) -> &InterfaceToCall {
        self.chain.target.interface()
    }

    /// Number of interceptors wrapping the target after pointcut filtering.
    pub fn interceptor_count(&self) -> usize {
        self.chain.interceptors.len()
    }

    /// Resolve arguments from `message`, run the interceptor chain and the
    /// target, and return the raw result.
    pub fn process_message(&self, message: &Message) -> Result<Value, MessagingError> {
        let interface = self.interface();
        let identity = interface.identity();
        let span = debug_span!("process_message", target = %identity);
        let _entered = span.enter();

        let mut state = InvocationState::Created;
        let arguments = match self.resolve_arguments(message, &identity) {
            Ok(arguments) => arguments,
            Err(error) => return Err(state.fail(error)),
        };
        state.advance(InvocationState::ArgumentsResolved);

        state.advance(InvocationState::Invoking);
        match InvocationChain::proceed_from(&self.chain, 0, arguments, message) {
            Ok(result) => {
                state.advance(InvocationState::Completed);
                Ok(result)
            }
            Err(error) => Err(state.fail(error)),
        }
    }

    fn resolve_arguments(&self, message: &Message, identity: &str) -> Result<Vec<Value>, MessagingError> {
        self.interface()
            .parameters()
            .iter()
            .zip(&self.converters)
            .map(|(parameter, converter)| {
                converter
                    .resolve(message, parameter, &self.chain.collaborators)
                    .map_err(|e| e.into_argument_resolution(identity, parameter.name()))
            })
            .collect()
    }
}

impl MessageProcessor for MethodInvoker {
    fn process_message(&self, message: &Message) -> Result<Value, MessagingError> {
        MethodInvoker::process_message(self, message)
    }

    fn interface(&self) -> &InterfaceToCall {
        MethodInvoker::interface(self)
    }
}

impl std::fmt::Debug for MethodInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodInvoker")
            .field("target", &self.interface().identity())
            .field("converters", &self.converters)
            .field("interceptors", &self.chain.interceptors.len())
            .finish()
    }
}
