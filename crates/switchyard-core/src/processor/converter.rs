//! Parameter converters: how one argument is produced from a message.

use serde_json::json;
use switchyard_types::{InterfaceParameter, Message, MessagingError, TypeDescriptor, Value};

use super::compatibility;
use crate::handler::Collaborators;

/// Declarative source of a single argument, bound to a parameter by name.
#[derive(Debug, Clone)]
pub enum ParameterConverter {
    /// The payload, converted to the parameter type when needed.
    Payload { parameter: String },
    /// One header. Missing and required fails; missing and optional is null.
    Header {
        parameter: String,
        header: String,
        required: bool,
    },
    /// The whole header mapping.
    AllHeaders { parameter: String },
    /// A constant fixed at build time.
    Value { parameter: String, value: Value },
    /// An expression over `{payload, headers}`.
    PayloadExpression { parameter: String, expression: String },
    /// An expression with `value` bound to one header.
    HeaderExpression {
        parameter: String,
        header: String,
        expression: String,
        required: bool,
    },
    /// A named collaborator. Without a name, the parameter's class name is used.
    Reference {
        parameter: String,
        reference: Option<String>,
    },
    /// The request message itself.
    Message { parameter: String },
}

impl ParameterConverter {
    pub fn payload(parameter: impl Into<String>) -> Self {
        ParameterConverter::Payload {
            parameter: parameter.into(),
        }
    }

    pub fn header(parameter: impl Into<String>, header: impl Into<String>) -> Self {
        ParameterConverter::Header {
            parameter: parameter.into(),
            header: header.into(),
            required: true,
        }
    }

    pub fn optional_header(parameter: impl Into<String>, header: impl Into<String>) -> Self {
        ParameterConverter::Header {
            parameter: parameter.into(),
            header: header.into(),
            required: false,
        }
    }

    pub fn all_headers(parameter: impl Into<String>) -> Self {
        ParameterConverter::AllHeaders {
            parameter: parameter.into(),
        }
    }

    pub fn value(parameter: impl Into<String>, value: impl Into<Value>) -> Self {
        ParameterConverter::Value {
            parameter: parameter.into(),
            value: value.into(),
        }
    }

    pub fn expression(parameter: impl Into<String>, expression: impl Into<String>) -> Self {
        ParameterConverter::PayloadExpression {
            parameter: parameter.into(),
            expression: expression.into(),
        }
    }

    pub fn header_expression(
        parameter: impl Into<String>,
        header: impl Into<String>,
        expression: impl Into<String>,
        required: bool,
    ) -> Self {
        ParameterConverter::HeaderExpression {
            parameter: parameter.into(),
            header: header.into(),
            expression: expression.into(),
            required,
        }
    }

    pub fn reference(parameter: impl Into<String>, reference: impl Into<String>) -> Self {
        ParameterConverter::Reference {
            parameter: parameter.into(),
            reference: Some(reference.into()),
        }
    }

    pub fn reference_by_type(parameter: impl Into<String>) -> Self {
        ParameterConverter::Reference {
            parameter: parameter.into(),
            reference: None,
        }
    }

    pub fn message(parameter: impl Into<String>) -> Self {
        ParameterConverter::Message {
            parameter: parameter.into(),
        }
    }

    pub fn parameter_name(&self) -> &str {
        match self {
            ParameterConverter::Payload { parameter }
            | ParameterConverter::Header { parameter, .. }
            | ParameterConverter::AllHeaders { parameter }
            | ParameterConverter::Value { parameter, .. }
            | ParameterConverter::PayloadExpression { parameter, .. }
            | ParameterConverter::HeaderExpression { parameter, .. }
            | ParameterConverter::Reference { parameter, .. }
            | ParameterConverter::Message { parameter } => parameter,
        }
    }

    /// Build-time check that this converter can feed `parameter`.
    pub fn validate(&self, parameter: &InterfaceParameter) -> Result<(), MessagingError> {
        let declared = parameter.type_descriptor();
        match self {
            ParameterConverter::AllHeaders { .. } if !declared.accepts_headers() => {
                Err(MessagingError::configuration(format!(
                    "parameter '{}' of type {declared} cannot receive all headers",
                    parameter.name()
                )))
            }
            ParameterConverter::Message { .. } if !declared.accepts_message() => {
                Err(MessagingError::configuration(format!(
                    "parameter '{}' of type {declared} cannot receive a message",
                    parameter.name()
                )))
            }
            ParameterConverter::Reference { reference: None, .. }
                if !matches!(declared, TypeDescriptor::Class(_)) =>
            {
                Err(MessagingError::configuration(format!(
                    "reference name for parameter '{}' cannot be inferred from type {declared}",
                    parameter.name()
                )))
            }
            _ => Ok(()),
        }
    }

    /// Produce the argument for `parameter` from `message`.
    pub fn resolve(
        &self,
        message: &Message,
        parameter: &InterfaceParameter,
        collaborators: &Collaborators,
    ) -> Result<Value, MessagingError> {
        match self {
            ParameterConverter::Payload { .. } => compatibility::convert_argument(
                collaborators.conversion.as_ref(),
                message.payload().clone(),
                message.content_type(),
                parameter.type_descriptor(),
            ),
            ParameterConverter::Header {
                header, required, ..
            } => match message.headers().get(header) {
                Some(value) => compatibility::convert_argument(
                    collaborators.conversion.as_ref(),
                    Value::from(value.clone()),
                    None,
                    parameter.type_descriptor(),
                ),
                None if *required => Err(missing_header(parameter, header)),
                None => Ok(Value::Null),
            },
            ParameterConverter::AllHeaders { .. } => Ok(Value::Headers(message.headers().clone())),
            ParameterConverter::Value { value, .. } => Ok(value.clone()),
            ParameterConverter::PayloadExpression { expression, .. } => {
                let context = json!({
                    "payload": message.payload().to_json(),
                    "headers": message.headers().to_json(),
                });
                collaborators
                    .expressions
                    .evaluate(expression, &context)
                    .map(Value::from)
            }
            ParameterConverter::HeaderExpression {
                header,
                expression,
                required,
                ..
            } => {
                let value = match message.headers().get(header) {
                    Some(value) => value.clone(),
                    None if *required => return Err(missing_header(parameter, header)),
                    None => serde_json::Value::Null,
                };
                let context = json!({
                    "value": value,
                    "payload": message.payload().to_json(),
                    "headers": message.headers().to_json(),
                });
                collaborators
                    .expressions
                    .evaluate(expression, &context)
                    .map(Value::from)
            }
            ParameterConverter::Reference { reference, .. } => {
                let name = match (reference, parameter.type_descriptor()) {
                    (Some(name), _) => name.as_str(),
                    (None, TypeDescriptor::Class(class)) => class.as_str(),
                    (None, declared) => {
                        return Err(MessagingError::configuration(format!(
                            "cannot infer reference name from type {declared}"
                        )));
                    }
                };
                collaborators.references.get(name).map(Value::Object)
            }
            ParameterConverter::Message { .. } => Ok(Value::Message(message.clone())),
        }
    }
}

fn missing_header(parameter: &InterfaceParameter, header: &str) -> MessagingError {
    MessagingError::argument_resolution(
        "",
        parameter.name(),
        format!("required header '{header}' is missing"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::handler::conversion::{InMemoryConversionService, JsonConverter};
    use crate::handler::reference::InMemoryReferenceSearchService;
    use serde::{Deserialize, Serialize};
    use switchyard_types::{MediaType, MessageBuilder, Object};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Order {
        id: u32,
    }

    fn collaborators() -> Collaborators {
        let references = InMemoryReferenceSearchService::with_objects([(
            "calculator",
            Object::named("Calculator", 4i64),
        )]);
        Collaborators::new(Arc::new(references)).with_conversion_service(Arc::new(
            InMemoryConversionService::with_defaults().with_converter(JsonConverter::<Order>::named("Order")),
        ))
    }

    fn string_param(name: &str) -> InterfaceParameter {
        InterfaceParameter::new(name, TypeDescriptor::String)
    }

    #[test]
    fn payload_passes_through_when_assignable() {
        let message = MessageBuilder::with_payload("some").build();
        let value = ParameterConverter::payload("p")
            .resolve(&message, &string_param("p"), &collaborators())
            .unwrap();
        assert_eq!(value.as_str(), Some("some"));
    }

    #[test]
    fn payload_is_converted_from_json() {
        let message = MessageBuilder::with_payload(r#"{"id":7}"#)
            .set_content_type(&MediaType::application_json())
            .build();
        let parameter = InterfaceParameter::new("order", TypeDescriptor::class("Order"));

        let value = ParameterConverter::payload("order")
            .resolve(&message, &parameter, &collaborators())
            .unwrap();
        assert_eq!(value.downcast_ref::<Order>(), Some(&Order { id: 7 }));
    }

    #[test]
    fn header_required_and_optional() {
        let message = MessageBuilder::with_payload(1).set_header("token", "123").build();
        let c = collaborators();

        let token = ParameterConverter::header("x", "token")
            .resolve(&message, &string_param("x"), &c)
            .unwrap();
        assert_eq!(token.as_str(), Some("123"));

        let err = ParameterConverter::header("x", "missing")
            .resolve(&message, &string_param("x"), &c)
            .unwrap_err();
        assert!(matches!(err, MessagingError::ArgumentResolution { .. }));

        let absent = ParameterConverter::optional_header("x", "missing")
            .resolve(&message, &InterfaceParameter::nullable("x", TypeDescriptor::String), &c)
            .unwrap();
        assert!(absent.is_null());
    }

    #[test]
    fn header_is_converted_to_declared_scalar() {
        let message = MessageBuilder::with_payload(1).set_header("amount", "15").build();
        let value = ParameterConverter::header("amount", "amount")
            .resolve(&message, &InterfaceParameter::new("amount", TypeDescriptor::Int), &collaborators())
            .unwrap();
        assert_eq!(value.as_i64(), Some(15));
    }

    #[test]
    fn header_expression_binds_value() {
        let message = MessageBuilder::with_payload(1).set_header("token", "100").build();
        let c = collaborators();

        let value = ParameterConverter::header_expression("x", "token", "value|concat('1')", true)
            .resolve(&message, &string_param("x"), &c)
            .unwrap();
        assert_eq!(value.as_str(), Some("1001"));

        let err = ParameterConverter::header_expression("x", "absent", "value|concat('1')", true)
            .resolve(&message, &string_param("x"), &c)
            .unwrap_err();
        assert!(matches!(err, MessagingError::ArgumentResolution { .. }));

        let fallback = ParameterConverter::header_expression("x", "absent", "value|concat('1')", false)
            .resolve(&message, &string_param("x"), &c)
            .unwrap();
        assert_eq!(fallback.as_str(), Some("1"));
    }

    #[test]
    fn payload_expression_reads_payload_and_headers() {
        let message = MessageBuilder::with_payload(13).set_header("bonus", 2).build();
        let value = ParameterConverter::expression("x", "payload + headers.bonus")
            .resolve(&message, &InterfaceParameter::new("x", TypeDescriptor::Float), &collaborators())
            .unwrap();
        assert_eq!(value.as_f64(), Some(15.0));
    }

    #[test]
    fn static_value_ignores_message() {
        let message = MessageBuilder::with_payload("ignored").build();
        let value = ParameterConverter::value("x", 100)
            .resolve(&message, &string_param("x"), &collaborators())
            .unwrap();
        assert_eq!(value.as_i64(), Some(100));
    }

    #[test]
    fn reference_by_name_and_by_type() {
        let message = MessageBuilder::with_payload(1).build();
        let c = collaborators();

        let by_name = ParameterConverter::reference("calc", "calculator")
            .resolve(&message, &InterfaceParameter::new("calc", TypeDescriptor::Anything), &c)
            .unwrap();
        assert_eq!(by_name.downcast_ref::<i64>(), Some(&4));

        let by_type = ParameterConverter::reference_by_type("calc")
            .resolve(&message, &InterfaceParameter::new("calc", TypeDescriptor::class("calculator")), &c)
            .unwrap();
        assert!(by_type.as_object().is_some());

        let err = ParameterConverter::reference("x", "unknown")
            .resolve(&message, &string_param("x"), &c)
            .unwrap_err();
        assert!(matches!(err, MessagingError::ReferenceNotFound(_)));
    }

    #[test]
    fn message_and_all_headers() {
        let message = MessageBuilder::with_payload(1).set_header("a", "b").build();
        let c = collaborators();

        let whole = ParameterConverter::message("m")
            .resolve(&message, &InterfaceParameter::new("m", TypeDescriptor::Message), &c)
            .unwrap();
        assert_eq!(whole.as_message(), Some(&message));

        let headers = ParameterConverter::all_headers("h")
            .resolve(&message, &InterfaceParameter::new("h", TypeDescriptor::Map), &c)
            .unwrap();
        assert_eq!(headers.as_headers().and_then(|h| h.get_str("a")), Some("b"));
    }

    #[test]
    fn validation_rejects_incompatible_parameters() {
        assert!(ParameterConverter::all_headers("x").validate(&string_param("x")).is_err());
        assert!(ParameterConverter::message("x").validate(&string_param("x")).is_err());
        assert!(ParameterConverter::reference_by_type("x").validate(&string_param("x")).is_err());
        assert!(
            ParameterConverter::message("x")
                .validate(&InterfaceParameter::new("x", TypeDescriptor::Anything))
                .is_ok()
        );
    }
}
