//! Callable methods and the argument lists they receive.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use switchyard_types::{InterfaceToCall, MessagingError, Object, Value};

use super::invocation::MethodInvocation;
use crate::handler::reference::ReferenceSearchService;

type MethodBody = dyn Fn(Option<&Object>, &mut Arguments) -> anyhow::Result<Value> + Send + Sync;

/// An interface descriptor paired with the code that implements it.
///
/// The body receives the instance the method is invoked on (if any) and the
/// resolved arguments, in declaration order. Methods returning `void` should
/// return [`Value::Null`].
#[derive(Clone)]
pub struct Method {
    interface: Arc<InterfaceToCall>,
    body: Arc<MethodBody>,
}

impl Method {
    /// A method that does not need the instance it is invoked on.
    pub fn new<F>(interface: InterfaceToCall, body: F) -> Self
    where
        F: Fn(&mut Arguments) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            interface: Arc::new(interface),
            body: Arc::new(move |_object: Option<&Object>, arguments: &mut Arguments| body(arguments)),
        }
    }

    /// A method of `T`. Invoking it on anything but a `T` instance fails.
    pub fn on<T, F>(interface: InterfaceToCall, body: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T, &mut Arguments) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let identity = interface.identity();
        Self {
            interface: Arc::new(interface),
            body: Arc::new(move |object: Option<&Object>, arguments: &mut Arguments| {
                let object =
                    object.with_context(|| format!("{identity} must be invoked on an instance"))?;
                let instance = object.downcast_ref::<T>().with_context(|| {
                    format!("{identity} cannot be invoked on {}", object.type_name())
                })?;
                body(instance, arguments)
            }),
        }
    }

    pub fn interface(&self) -> &InterfaceToCall {
        &self.interface
    }

    pub fn invoke(&self, object: Option<&Object>, arguments: &mut Arguments) -> anyhow::Result<Value> {
        (self.body)(object, arguments)
    }

    pub(crate) fn parameter_names(&self) -> Arc<[String]> {
        self.interface
            .parameters()
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Method").field(&self.interface.identity()).finish()
    }
}

/// The instance a method is invoked on.
#[derive(Debug, Clone, Default)]
pub enum TargetObject {
    /// No instance: the method body needs none.
    #[default]
    Static,
    /// Looked up by name when the invoker is built.
    Reference(String),
    Instance(Object),
}

impl TargetObject {
    pub(crate) fn resolve(
        &self,
        references: &dyn ReferenceSearchService,
    ) -> Result<Option<Object>, MessagingError> {
        match self {
            TargetObject::Static => Ok(None),
            TargetObject::Reference(name) => references.get(name).map(Some),
            TargetObject::Instance(object) => Ok(Some(object.clone())),
        }
    }
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// One resolved argument.
pub enum Argument {
    Value(Value),
    /// The invocation context of an around interceptor.
    Invocation(MethodInvocation),
}

/// Resolved arguments of one call, addressable by parameter name or position.
pub struct Arguments {
    names: Arc<[String]>,
    values: Vec<Argument>,
}

impl Arguments {
    pub(crate) fn new(names: Arc<[String]>, values: Vec<Argument>) -> Self {
        Self { names, values }
    }

    /// Arguments built by hand, mainly for calling a [`Method`] directly.
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let (names, values): (Vec<String>, Vec<Argument>) = values
            .into_iter()
            .map(|(name, value)| (name.into(), Argument::Value(value)))
            .unzip();
        Self::new(names.into(), values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn at(&self, position: usize) -> Option<&Value> {
        match self.values.get(position)? {
            Argument::Value(value) => Some(value),
            Argument::Invocation(_) => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.at(self.position(name)?)
    }

    /// Like [`Arguments::get`], failing for unknown names.
    pub fn require(&self, name: &str) -> anyhow::Result<&Value> {
        self.get(name)
            .with_context(|| format!("no argument named '{name}'"))
    }

    /// String argument, failing when absent or not a string.
    pub fn str(&self, name: &str) -> anyhow::Result<&str> {
        self.require(name)?
            .as_str()
            .with_context(|| format!("argument '{name}' is not a string"))
    }

    /// Move a value out, leaving null in its place.
    pub fn take(&mut self, name: &str) -> Option<Value> {
        let position = self.position(name)?;
        match self.values.get_mut(position)? {
            Argument::Value(value) => Some(std::mem::take(value)),
            Argument::Invocation(_) => None,
        }
    }

    /// The invocation context, when this call is an around interceptor that
    /// declared one.
    pub fn invocation(&mut self) -> Option<&mut MethodInvocation> {
        self.values.iter_mut().find_map(|argument| match argument {
            Argument::Invocation(invocation) => Some(invocation),
            Argument::Value(_) => None,
        })
    }

    pub(crate) fn into_invocation(self) -> Option<MethodInvocation> {
        self.values.into_iter().find_map(|argument| match argument {
            Argument::Invocation(invocation) => Some(invocation),
            Argument::Value(_) => None,
        })
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, argument) in self.names.iter().zip(&self.values) {
            match argument {
                Argument::Value(value) => map.entry(name, value),
                Argument::Invocation(_) => map.entry(name, &"<invocation>"),
            };
        }
        map.finish()
    }
}
