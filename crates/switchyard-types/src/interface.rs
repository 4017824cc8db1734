//! Interface descriptors: the explicit, build-time description of a method
//! that stands in for runtime reflection.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::type_descriptor::TypeDescriptor;

/// Metadata attached to a method, an interface or an endpoint.
///
/// Pointcuts select interceptors by annotation name, and interceptors may
/// declare a parameter typed with the annotation name to receive it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Annotation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }
}

/// One formal parameter of a method.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceParameter {
    name: String,
    type_descriptor: TypeDescriptor,
    nullable: bool,
    position: usize,
}

impl InterfaceParameter {
    pub fn new(name: impl Into<String>, type_descriptor: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            type_descriptor,
            nullable: false,
            position: 0,
        }
    }

    /// A parameter that also accepts null (`?string` style).
    pub fn nullable(name: impl Into<String>, type_descriptor: TypeDescriptor) -> Self {
        Self {
            nullable: true,
            ..Self::new(name, type_descriptor)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_descriptor(&self) -> &TypeDescriptor {
        &self.type_descriptor
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable || self.type_descriptor.allows_null()
    }
}

/// A callable method: owning interface, name, ordered parameters, return
/// type and annotations.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceToCall {
    interface_name: String,
    method_name: String,
    parameters: Vec<InterfaceParameter>,
    return_type: TypeDescriptor,
    method_annotations: Vec<Annotation>,
    interface_annotations: Vec<Annotation>,
}

impl InterfaceToCall {
    /// A method with no parameters returning `void`.
    pub fn new(interface_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            interface_name: interface_name.into(),
            method_name: method_name.into(),
            parameters: Vec::new(),
            return_type: TypeDescriptor::Void,
            method_annotations: Vec::new(),
            interface_annotations: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, mut parameter: InterfaceParameter) -> Self {
        parameter.position = self.parameters.len();
        self.parameters.push(parameter);
        self
    }

    pub fn returning(mut self, return_type: TypeDescriptor) -> Self {
        self.return_type = return_type;
        self
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.method_annotations.push(annotation);
        self
    }

    pub fn with_interface_annotation(mut self, annotation: Annotation) -> Self {
        self.interface_annotations.push(annotation);
        self
    }

    pub fn interface_name(&self) -> &str {
        &self.interface_name
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// `Interface::method`, used in diagnostics and pointcuts.
    pub fn identity(&self) -> String {
        format!("{}::{}", self.interface_name, self.method_name)
    }

    pub fn parameters(&self) -> &[InterfaceParameter] {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&InterfaceParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn return_type(&self) -> &TypeDescriptor {
        &self.return_type
    }

    pub fn has_return_value(&self) -> bool {
        !self.return_type.is_void()
    }

    pub fn method_annotations(&self) -> &[Annotation] {
        &self.method_annotations
    }

    pub fn interface_annotations(&self) -> &[Annotation] {
        &self.interface_annotations
    }

    /// Method annotations first, then interface annotations.
    pub fn annotations(&self) -> impl Iterator<Item = &Annotation> {
        self.method_annotations
            .iter()
            .chain(self.interface_annotations.iter())
    }

    pub fn has_annotation(&self, name: &str) -> bool {
        self.annotations().any(|a| a.name == name)
    }

    pub fn has_parameter_of_type(&self, type_descriptor: &TypeDescriptor) -> bool {
        self.parameters
            .iter()
            .any(|p| p.type_descriptor == *type_descriptor)
    }
}

impl fmt::Display for InterfaceToCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.interface_name, self.method_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_service() -> InterfaceToCall {
        InterfaceToCall::new("OrderService", "place")
            .with_parameter(InterfaceParameter::new("order", TypeDescriptor::class("Order")))
            .with_parameter(InterfaceParameter::nullable("note", TypeDescriptor::String))
            .returning(TypeDescriptor::String)
            .with_annotation(Annotation::new("Transactional").with_attribute("timeout", 5))
            .with_interface_annotation(Annotation::new("Logged"))
    }

    #[test]
    fn parameters_keep_declaration_positions() {
        let interface = order_service();
        assert_eq!(interface.parameters().len(), 2);
        assert_eq!(interface.parameter("note").map(InterfaceParameter::position), Some(1));
        assert!(interface.parameter("missing").is_none());
    }

    #[test]
    fn nullability_comes_from_flag_or_type() {
        let interface = order_service();
        assert!(!interface.parameters()[0].is_nullable());
        assert!(interface.parameters()[1].is_nullable());
        assert!(InterfaceParameter::new("any", TypeDescriptor::Anything).is_nullable());
    }

    #[test]
    fn identity_and_annotations() {
        let interface = order_service();
        assert_eq!(interface.identity(), "OrderService::place");
        assert_eq!(interface.to_string(), "OrderService::place");
        assert!(interface.has_annotation("Transactional"));
        assert!(interface.has_annotation("Logged"));
        assert!(!interface.has_annotation("Cached"));
        assert!(interface.has_return_value());
        assert!(!InterfaceToCall::new("A", "b").has_return_value());
    }
}
