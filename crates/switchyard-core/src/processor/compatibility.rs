//! Type and media-type compatibility between messages and method signatures.
//!
//! Inbound: decides whether a value can be passed to a declared parameter as
//! is, must go through the conversion service, or is incompatible.
//! Outbound: picks the type (and so the content type) of a reply.

use switchyard_types::{MediaType, MessagingError, TypeDescriptor, Value};

use crate::handler::conversion::{ConversionPath, ConversionService};

/// Prepare `value` for a parameter declared as `target`.
///
/// `source_media` is the value's content type; `None` means an in-memory
/// value of its runtime type. Resolution order:
/// 1. in-memory value the target already accepts: passed unchanged;
/// 2. a registered converter for the (type, media type) pair: converted;
/// 3. the target accepts the value despite the media type: passed unchanged;
/// 4. otherwise a [`MessagingError::Conversion`].
pub fn convert_argument(
    conversion: &dyn ConversionService,
    value: Value,
    source_media: Option<MediaType>,
    target: &TypeDescriptor,
) -> Result<Value, MessagingError> {
    if value.is_null() {
        return Ok(value);
    }

    let runtime_type = TypeDescriptor::of_value(&value);
    let source_media =
        source_media.unwrap_or_else(|| MediaType::application_x_rust_with_type(&runtime_type));
    let source_type = source_media
        .type_parameter()
        .unwrap_or_else(|| runtime_type.clone());

    if source_media.is_rust_object() && target.accepts(&value) {
        return Ok(value);
    }

    let target_media = MediaType::application_x_rust_with_type(target);
    let path = ConversionPath {
        source_type: &source_type,
        source_media: &source_media,
        target_type: target,
        target_media: &target_media,
    };
    if conversion.can_convert(&path) {
        return conversion.convert(value, &path);
    }

    if target.accepts(&value) {
        return Ok(value);
    }

    Err(MessagingError::conversion(
        &source_media,
        &target_media,
        format!("no converter registered and {runtime_type} is not assignable to {target}"),
    ))
}

/// Type recorded for a reply built from `value`.
///
/// Unions pick their first member accepting the value; a concrete declared
/// type is kept when it accepts the value; otherwise (including `mixed` and
/// any mismatch) the value's runtime type wins.
pub fn resolve_reply_type(declared: &TypeDescriptor, value: &Value) -> TypeDescriptor {
    match declared {
        TypeDescriptor::Union(members) => members
            .iter()
            .find(|member| member.accepts(value))
            .filter(|member| !matches!(member, TypeDescriptor::Anything))
            .cloned()
            .unwrap_or_else(|| TypeDescriptor::of_value(value)),
        TypeDescriptor::Anything | TypeDescriptor::Void => TypeDescriptor::of_value(value),
        concrete if concrete.accepts(value) => concrete.clone(),
        _ => TypeDescriptor::of_value(value),
    }
}

/// Content type of a reply built from `value`.
pub fn reply_media_type(declared: &TypeDescriptor, value: &Value) -> MediaType {
    MediaType::application_x_rust_with_type(&resolve_reply_type(declared, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::conversion::InMemoryConversionService;
    use serde_json::json;
    use switchyard_types::Object;

    fn no_converters() -> InMemoryConversionService {
        InMemoryConversionService::empty()
    }

    #[test]
    fn in_memory_value_of_target_type_passes() {
        let value = convert_argument(&no_converters(), Value::from("some"), None, &TypeDescriptor::String)
            .unwrap();
        assert_eq!(value.as_str(), Some("some"));
    }

    #[test]
    fn interface_instance_passes_for_declared_interface() {
        let order = Object::named("PlaceOrder", ()).with_supertypes(["Command"]);
        let value = convert_argument(
            &no_converters(),
            Value::from(order.clone()),
            None,
            &TypeDescriptor::class("Command"),
        )
        .unwrap();
        assert_eq!(value.as_object(), Some(&order));
    }

    #[test]
    fn compatible_type_with_foreign_media_type_passes() {
        let value = convert_argument(
            &no_converters(),
            Value::from("some"),
            Some(MediaType::application_json()),
            &TypeDescriptor::String,
        )
        .unwrap();
        assert_eq!(value.as_str(), Some("some"));
    }

    #[test]
    fn incompatible_without_converter_fails() {
        let err = convert_argument(
            &no_converters(),
            Value::from(r#"{"id":1}"#),
            Some(MediaType::application_json()),
            &TypeDescriptor::class("Order"),
        )
        .unwrap_err();
        assert!(matches!(err, MessagingError::Conversion { .. }));
    }

    #[test]
    fn converter_is_used_when_registered() {
        let value = convert_argument(
            &InMemoryConversionService::with_defaults(),
            Value::from("12"),
            None,
            &TypeDescriptor::Int,
        )
        .unwrap();
        assert_eq!(value.as_i64(), Some(12));
    }

    #[test]
    fn null_is_left_for_the_nullability_check() {
        let value = convert_argument(&no_converters(), Value::Null, None, &TypeDescriptor::Int).unwrap();
        assert!(value.is_null());
    }

    #[test]
    fn reply_type_picks_first_matching_union_member() {
        let declared: TypeDescriptor = "Order|string".parse().unwrap();
        assert_eq!(resolve_reply_type(&declared, &Value::from("x")), TypeDescriptor::String);

        let fallback: TypeDescriptor = "Order|array".parse().unwrap();
        assert_eq!(resolve_reply_type(&fallback, &Value::from(5)), TypeDescriptor::Int);
    }

    #[test]
    fn reply_type_of_mixed_is_runtime_type() {
        assert_eq!(
            reply_media_type(&TypeDescriptor::Anything, &Value::from("a")).to_string(),
            "application/x-rust;type=string"
        );
        assert_eq!(
            resolve_reply_type(&TypeDescriptor::Anything, &Value::from(json!([1, 2]))),
            TypeDescriptor::Array(None)
        );
        let order = Value::from(Object::named("Order", ()));
        assert_eq!(resolve_reply_type(&TypeDescriptor::String, &order), TypeDescriptor::class("Order"));
    }

    #[test]
    fn reply_type_keeps_precise_declared_type() {
        let declared = TypeDescriptor::array_of(TypeDescriptor::String);
        assert_eq!(resolve_reply_type(&declared, &Value::from(json!(["a"]))), declared);
    }
}
