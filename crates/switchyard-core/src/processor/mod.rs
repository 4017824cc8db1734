//! The invocation pipeline: argument converters, type compatibility, the
//! around-interceptor chain, the method invoker and the reply wrapper.

pub mod compatibility;
pub mod converter;
pub mod interceptor;
pub mod invocation;
pub mod invoker;
pub mod method;
pub mod pointcut;
pub mod wrap;

pub use converter::ParameterConverter;
pub use interceptor::{AroundInterceptorReference, DEFAULT_PRECEDENCE};
pub use invocation::MethodInvocation;
pub use invoker::{MethodInvoker, MethodInvokerBuilder};
pub use method::{Arguments, Method, TargetObject};
pub use pointcut::Pointcut;
pub use wrap::{WrapWithMessageBuildProcessor, build_reply};

use switchyard_types::{InterfaceToCall, Message, MessagingError, Value};

/// Produces a raw result for a message.
pub trait MessageProcessor: Send + Sync {
    fn process_message(&self, message: &Message) -> Result<Value, MessagingError>;

    /// The method this processor ends up calling.
    fn interface(&self) -> &InterfaceToCall;
}
