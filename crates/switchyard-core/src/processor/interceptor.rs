//! Around interceptors: methods wrapped around a target invocation.
//!
//! An interceptor is resolved against a target once, when the invoker is
//! built. Its pointcut decides whether it applies at all, and each of its
//! parameters is bound to a source (converter, invocation context, request
//! message, intercepted object, annotation, target argument) that is read on
//! every call.

use std::sync::Arc;

use switchyard_types::{
    Annotation, InterfaceParameter, InterfaceToCall, Message, MessagingError, Object,
    TypeDescriptor, Value,
};
use tracing::debug;

use super::converter::ParameterConverter;
use super::invocation::MethodInvocation;
use super::method::{Argument, Arguments, Method, TargetObject};
use super::pointcut::Pointcut;
use crate::handler::Collaborators;

/// Precedence given to interceptors that do not set one.
pub const DEFAULT_PRECEDENCE: i32 = 1;

/// Registration of an around interceptor.
#[derive(Debug, Clone)]
pub struct AroundInterceptorReference {
    target: TargetObject,
    method: Method,
    precedence: i32,
    pointcut: Option<String>,
    converters: Vec<ParameterConverter>,
}

impl AroundInterceptorReference {
    /// An interceptor method that needs no instance.
    pub fn new(method: Method) -> Self {
        Self {
            target: TargetObject::Static,
            method,
            precedence: DEFAULT_PRECEDENCE,
            pointcut: None,
            converters: Vec::new(),
        }
    }

    /// An interceptor invoked on the collaborator registered as `reference`.
    pub fn with_reference(reference: impl Into<String>, method: Method) -> Self {
        Self {
            target: TargetObject::Reference(reference.into()),
            ..Self::new(method)
        }
    }

    pub fn with_object(object: Object, method: Method) -> Self {
        Self {
            target: TargetObject::Instance(object),
            ..Self::new(method)
        }
    }

    /// Lower runs first (outermost).
    pub fn with_precedence(mut self, precedence: i32) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn with_pointcut(mut self, pointcut: impl Into<String>) -> Self {
        self.pointcut = Some(pointcut.into());
        self
    }

    pub fn with_converters(mut self, converters: impl IntoIterator<Item = ParameterConverter>) -> Self {
        self.converters.extend(converters);
        self
    }

    pub fn precedence(&self) -> i32 {
        self.precedence
    }

    pub fn interface(&self) -> &InterfaceToCall {
        self.method.interface()
    }

    /// Bind this interceptor to `target`.
    ///
    /// Returns `None` when the pointcut excludes the target. Invalid wiring
    /// is a [`MessagingError::Configuration`].
    pub(crate) fn resolve(
        &self,
        target: &InterfaceToCall,
        intercepted_object: Option<&Object>,
        endpoint_annotations: &[Annotation],
        collaborators: &Collaborators,
    ) -> Result<Option<ResolvedInterceptor>, MessagingError> {
        let pointcut = match &self.pointcut {
            Some(expression) => Pointcut::parse(expression)?,
            None => Pointcut::Any,
        };
        if !pointcut.matches(target, endpoint_annotations) {
            debug!(interceptor = %self.interface(), target = %target, "pointcut excludes interceptor");
            return Ok(None);
        }

        let interface = self.method.interface();
        let invocation_parameters = interface
            .parameters()
            .iter()
            .filter(|p| matches!(p.type_descriptor(), TypeDescriptor::MethodInvocation))
            .count();
        if invocation_parameters > 1 {
            return Err(MessagingError::configuration(format!(
                "around interceptor {interface} declares more than one invocation parameter"
            )));
        }
        if interface.has_return_value() && invocation_parameters == 0 {
            return Err(MessagingError::configuration(format!(
                "around interceptor {interface} returns {} but has no invocation parameter to proceed with",
                interface.return_type()
            )));
        }
        for converter in &self.converters {
            let parameter = interface.parameter(converter.parameter_name()).ok_or_else(|| {
                MessagingError::configuration(format!(
                    "around interceptor {interface} has no parameter '{}'",
                    converter.parameter_name()
                ))
            })?;
            converter.validate(parameter)?;
        }

        let object = self.target.resolve(collaborators.references.as_ref())?;
        let bindings = self.bind_parameters(target, intercepted_object, endpoint_annotations);

        Ok(Some(ResolvedInterceptor {
            method: self.method.clone(),
            object,
            parameter_names: self.method.parameter_names(),
            bindings,
        }))
    }

    fn bind_parameters(
        &self,
        target: &InterfaceToCall,
        intercepted_object: Option<&Object>,
        endpoint_annotations: &[Annotation],
    ) -> Vec<Binding> {
        let mut claimed = vec![false; target.parameters().len()];

        self.method
            .interface()
            .parameters()
            .iter()
            .map(|parameter| {
                if let Some(converter) = self
                    .converters
                    .iter()
                    .find(|c| c.parameter_name() == parameter.name())
                {
                    return Binding::Converter(converter.clone());
                }

                let declared = parameter.type_descriptor();
                match declared {
                    TypeDescriptor::MethodInvocation => return Binding::Invocation,
                    TypeDescriptor::Message => return Binding::RequestMessage,
                    TypeDescriptor::Class(class) => {
                        if intercepted_object.is_some_and(|o| o.is_instance_of(class)) {
                            return Binding::InterceptedObject;
                        }
                        let annotation = target
                            .annotations()
                            .chain(endpoint_annotations)
                            .find(|a| a.name == *class);
                        if let Some(annotation) = annotation {
                            return Binding::Annotation(Value::Object(Object::named(
                                class.clone(),
                                annotation.clone(),
                            )));
                        }
                    }
                    _ => {}
                }

                if !matches!(declared, TypeDescriptor::Anything) {
                    let position = target
                        .parameters()
                        .iter()
                        .position(|p| !claimed[p.position()] && p.type_descriptor() == declared);
                    if let Some(position) = position {
                        claimed[position] = true;
                        return Binding::TargetArgument(position);
                    }
                }

                Binding::Fallback
            })
            .collect()
    }
}

/// Where one interceptor argument comes from.
#[derive(Debug, Clone)]
pub(crate) enum Binding {
    Converter(ParameterConverter),
    Invocation,
    RequestMessage,
    InterceptedObject,
    Annotation(Value),
    TargetArgument(usize),
    /// Payload, headers or null, whichever the parameter accepts.
    Fallback,
}

/// An interceptor bound to one target.
#[derive(Debug)]
pub(crate) struct ResolvedInterceptor {
    method: Method,
    object: Option<Object>,
    parameter_names: Arc<[String]>,
    bindings: Vec<Binding>,
}

impl ResolvedInterceptor {
    /// Run the interceptor around `invocation`.
    ///
    /// Without an invocation parameter the interceptor only observes the call
    /// and the chain continues once it returns.
    pub(crate) fn invoke(
        &self,
        invocation: MethodInvocation,
        collaborators: &Collaborators,
    ) -> Result<Value, MessagingError> {
        let interface = self.method.interface();
        let identity = interface.identity();

        let mut resolved = Vec::with_capacity(self.bindings.len());
        for (parameter, binding) in interface.parameters().iter().zip(&self.bindings) {
            let value = match binding {
                Binding::Invocation => None,
                Binding::Converter(converter) => Some(
                    converter
                        .resolve(invocation.request_message(), parameter, collaborators)
                        .map_err(|e| e.into_argument_resolution(&identity, parameter.name()))?,
                ),
                Binding::RequestMessage => Some(Value::Message(invocation.request_message().clone())),
                Binding::InterceptedObject => {
                    Some(invocation.intercepted_object().cloned().map(Value::Object).unwrap_or_default())
                }
                Binding::Annotation(annotation) => Some(annotation.clone()),
                Binding::TargetArgument(position) => {
                    Some(invocation.arguments().get(*position).cloned().unwrap_or_default())
                }
                Binding::Fallback => Some(fallback(invocation.request_message(), parameter, &identity)?),
            };
            resolved.push(value);
        }

        let mut pending = Some(invocation);
        let values = resolved
            .into_iter()
            .map(|value| match value {
                Some(value) => Argument::Value(value),
                None => pending
                    .take()
                    .map_or(Argument::Value(Value::Null), Argument::Invocation),
            })
            .collect();
        let mut arguments = Arguments::new(Arc::clone(&self.parameter_names), values);

        debug!(interceptor = %interface, "invoking around interceptor");
        let returned = self
            .method
            .invoke(self.object.as_ref(), &mut arguments)
            .map_err(|e| MessagingError::from_invocation(&identity, e))?;

        match pending {
            Some(mut invocation) => invocation.proceed(),
            None if interface.has_return_value() => Ok(returned),
            None => Ok(arguments
                .into_invocation()
                .and_then(MethodInvocation::into_result)
                .unwrap_or_default()),
        }
    }
}

fn fallback(
    request: &Message,
    parameter: &InterfaceParameter,
    identity: &str,
) -> Result<Value, MessagingError> {
    let declared = parameter.type_descriptor();
    if declared.accepts(request.payload()) {
        return Ok(request.payload().clone());
    }
    if declared.accepts_headers() {
        return Ok(Value::Headers(request.headers().clone()));
    }
    if parameter.is_nullable() {
        return Ok(Value::Null);
    }
    Err(MessagingError::argument_resolution(
        identity,
        parameter.name(),
        format!("nothing available to bind to {declared}"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> InterfaceToCall {
        InterfaceToCall::new("OrderService", "place")
            .with_parameter(InterfaceParameter::new("order", TypeDescriptor::String))
            .with_parameter(InterfaceParameter::new("amount", TypeDescriptor::Int))
            .returning(TypeDescriptor::String)
            .with_annotation(Annotation::new("Transactional"))
    }

    fn noop(interface: InterfaceToCall) -> Method {
        Method::new(interface, |_| Ok(Value::Null))
    }

    #[test]
    fn returning_interceptor_without_invocation_is_rejected() {
        let interceptor = AroundInterceptorReference::new(noop(
            InterfaceToCall::new("Audit", "around").returning(TypeDescriptor::String),
        ));
        let err = interceptor
            .resolve(&target(), None, &[], &Collaborators::default())
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn two_invocation_parameters_are_rejected() {
        let interceptor = AroundInterceptorReference::new(noop(
            InterfaceToCall::new("Audit", "around")
                .with_parameter(InterfaceParameter::new("a", TypeDescriptor::MethodInvocation))
                .with_parameter(InterfaceParameter::new("b", TypeDescriptor::MethodInvocation)),
        ));
        let err = interceptor
            .resolve(&target(), None, &[], &Collaborators::default())
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn converter_for_unknown_parameter_is_rejected() {
        let interceptor = AroundInterceptorReference::new(noop(InterfaceToCall::new("Audit", "around")))
            .with_converters([ParameterConverter::payload("missing")]);
        let err = interceptor
            .resolve(&target(), None, &[], &Collaborators::default())
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn pointcut_miss_resolves_to_nothing() {
        let interceptor = AroundInterceptorReference::new(noop(InterfaceToCall::new("Audit", "around")))
            .with_pointcut("@(Cached)");
        let resolved = interceptor
            .resolve(&target(), None, &[], &Collaborators::default())
            .unwrap();
        assert!(resolved.is_none());
    }

    #[test]
    fn parameters_bind_by_type() {
        let interceptor = AroundInterceptorReference::new(noop(
            InterfaceToCall::new("Audit", "around")
                .with_parameter(InterfaceParameter::new("invocation", TypeDescriptor::MethodInvocation))
                .with_parameter(InterfaceParameter::new("message", TypeDescriptor::Message))
                .with_parameter(InterfaceParameter::new("service", TypeDescriptor::class("OrderService")))
                .with_parameter(InterfaceParameter::new("tx", TypeDescriptor::class("Transactional")))
                .with_parameter(InterfaceParameter::new("amount", TypeDescriptor::Int))
                .with_parameter(InterfaceParameter::new("headers", TypeDescriptor::Map)),
        ));
        let service = Object::named("OrderService", ());

        let resolved = interceptor
            .resolve(&target(), Some(&service), &[], &Collaborators::default())
            .unwrap()
            .unwrap();

        assert!(matches!(resolved.bindings[0], Binding::Invocation));
        assert!(matches!(resolved.bindings[1], Binding::RequestMessage));
        assert!(matches!(resolved.bindings[2], Binding::InterceptedObject));
        assert!(matches!(resolved.bindings[3], Binding::Annotation(_)));
        assert!(matches!(resolved.bindings[4], Binding::TargetArgument(1)));
        assert!(matches!(resolved.bindings[5], Binding::Fallback));
    }

    #[test]
    fn endpoint_annotations_are_bindable() {
        let interceptor = AroundInterceptorReference::new(noop(
            InterfaceToCall::new("Audit", "around")
                .with_parameter(InterfaceParameter::new("logged", TypeDescriptor::class("Logged"))),
        ));
        let resolved = interceptor
            .resolve(&target(), None, &[Annotation::new("Logged")], &Collaborators::default())
            .unwrap()
            .unwrap();

        match &resolved.bindings[0] {
            Binding::Annotation(value) => {
                assert_eq!(value.downcast_ref::<Annotation>().map(|a| a.name.as_str()), Some("Logged"));
            }
            other => panic!("unexpected binding: {other:?}"),
        }
        assert_eq!(resolved.bindings.len(), 1);
    }

    #[test]
    fn missing_reference_fails_at_resolution() {
        let interceptor =
            AroundInterceptorReference::with_reference("audit", noop(InterfaceToCall::new("Audit", "around")));
        let err = interceptor
            .resolve(&target(), None, &[], &Collaborators::default())
            .unwrap_err();
        assert!(matches!(err, MessagingError::ReferenceNotFound(_)));
    }
}
