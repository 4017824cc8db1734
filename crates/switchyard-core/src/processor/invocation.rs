//! The invocation context handed to around interceptors.
//!
//! A chain is an immutable, ordered list of interceptors plus the target
//! method, shared by every call of one invoker. Each in-flight call owns its
//! own [`MethodInvocation`]: the resolved arguments, the request message and
//! the index of the next chain element. `proceed` runs the chain from that
//! index, so concurrent calls never share mutable state.

use std::sync::Arc;

use switchyard_types::{InterfaceToCall, Message, MessagingError, Object, Value};
use tracing::debug;

use super::interceptor::ResolvedInterceptor;
use super::method::{Argument, Arguments, Method};
use crate::handler::Collaborators;

pub(crate) struct InvocationChain {
    pub(crate) target: Method,
    pub(crate) object: Option<Object>,
    pub(crate) parameter_names: Arc<[String]>,
    pub(crate) interceptors: Vec<ResolvedInterceptor>,
    pub(crate) collaborators: Collaborators,
}

impl InvocationChain {
    /// Run the element at `index`: an interceptor, or the target once the
    /// interceptors are exhausted.
    pub(crate) fn proceed_from(
        chain: &Arc<InvocationChain>,
        index: usize,
        arguments: Vec<Value>,
        request: &Message,
    ) -> Result<Value, MessagingError> {
        match chain.interceptors.get(index) {
            Some(interceptor) => {
                let invocation = MethodInvocation {
                    chain: Arc::clone(chain),
                    next: index + 1,
                    arguments,
                    request: request.clone(),
                    result: None,
                };
                interceptor.invoke(invocation, &chain.collaborators)
            }
            None => chain.invoke_target(arguments),
        }
    }

    fn invoke_target(&self, arguments: Vec<Value>) -> Result<Value, MessagingError> {
        let interface = self.target.interface();
        for (parameter, value) in interface.parameters().iter().zip(&arguments) {
            if value.is_null() && !parameter.is_nullable() {
                return Err(MessagingError::argument_resolution(
                    interface.identity(),
                    parameter.name(),
                    "null given for a non-nullable parameter",
                ));
            }
        }

        debug!(target = %interface, "invoking target method");
        let mut arguments = Arguments::new(
            Arc::clone(&self.parameter_names),
            arguments.into_iter().map(Argument::Value).collect(),
        );
        self.target
            .invoke(self.object.as_ref(), &mut arguments)
            .map_err(|source| MessagingError::MethodInvocation {
                target: interface.identity(),
                source: source.into(),
            })
    }
}

/// One in-flight call as seen by an around interceptor.
pub struct MethodInvocation {
    chain: Arc<InvocationChain>,
    next: usize,
    arguments: Vec<Value>,
    request: Message,
    result: Option<Value>,
}

impl MethodInvocation {
    /// Continue with the next interceptor, or the target when none is left,
    /// using the current (possibly replaced) arguments.
    ///
    /// Every call runs the remainder of the chain again from the same point.
    pub fn proceed(&mut self) -> Result<Value, MessagingError> {
        let result =
            InvocationChain::proceed_from(&self.chain, self.next, self.arguments.clone(), &self.request)?;
        self.result = Some(result.clone());
        Ok(result)
    }

    /// Target arguments in declaration order.
    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    pub fn argument(&self, name: &str) -> Option<&Value> {
        let position = self.interface().parameter(name)?.position();
        self.arguments.get(position)
    }

    /// Replace the target argument for parameter `name` before proceeding.
    pub fn replace_argument(&mut self, name: &str, value: impl Into<Value>) -> Result<(), MessagingError> {
        let interface = self.chain.target.interface();
        let parameter = interface.parameter(name).ok_or_else(|| {
            MessagingError::argument_resolution(
                interface.identity(),
                name,
                "no such parameter to replace",
            )
        })?;
        let position = parameter.position();
        if let Some(slot) = self.arguments.get_mut(position) {
            *slot = value.into();
        }
        Ok(())
    }

    /// The intercepted method.
    pub fn interface(&self) -> &InterfaceToCall {
        self.chain.target.interface()
    }

    pub fn intercepted_object(&self) -> Option<&Object> {
        self.chain.object.as_ref()
    }

    pub fn request_message(&self) -> &Message {
        &self.request
    }

    /// Result of the last `proceed`, if it was called.
    pub(crate) fn into_result(self) -> Option<Value> {
        self.result
    }
}

impl std::fmt::Debug for MethodInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodInvocation")
            .field("target", &self.interface().identity())
            .field("next", &self.next)
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}
