//! Conversion service: turns a value of one (type, media type) into another.
//!
//! Converters are tried in registration order; the first whose `matches`
//! accepts the path performs the conversion.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use switchyard_types::{MediaType, MessagingError, Object, TypeDescriptor, Value};
use uuid::Uuid;

/// Source and target of a requested conversion.
#[derive(Debug, Clone, Copy)]
pub struct ConversionPath<'a> {
    pub source_type: &'a TypeDescriptor,
    pub source_media: &'a MediaType,
    pub target_type: &'a TypeDescriptor,
    pub target_media: &'a MediaType,
}

pub trait ConversionService: Send + Sync {
    fn can_convert(&self, path: &ConversionPath<'_>) -> bool;

    /// Fails with [`MessagingError::Conversion`] when no converter applies or
    /// the chosen converter rejects the value.
    fn convert(&self, value: Value, path: &ConversionPath<'_>) -> Result<Value, MessagingError>;
}

/// A single conversion strategy.
pub trait Converter: Send + Sync {
    fn matches(&self, path: &ConversionPath<'_>) -> bool;

    fn convert(&self, value: Value, path: &ConversionPath<'_>) -> Result<Value, MessagingError>;
}

// ---------------------------------------------------------------------------
// InMemoryConversionService
// ---------------------------------------------------------------------------

/// Ordered list of converters.
#[derive(Default, Clone)]
pub struct InMemoryConversionService {
    converters: Vec<Arc<dyn Converter>>,
}

impl InMemoryConversionService {
    /// No converters at all: only pass-through compatibility applies.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Scalar parsing and UUID conversion.
    pub fn with_defaults() -> Self {
        Self::empty()
            .with_converter(ScalarConverter)
            .with_converter(StringToUuidConverter)
    }

    pub fn with_converter(mut self, converter: impl Converter + 'static) -> Self {
        self.converters.push(Arc::new(converter));
        self
    }

    fn find(&self, path: &ConversionPath<'_>) -> Option<&Arc<dyn Converter>> {
        self.converters.iter().find(|converter| converter.matches(path))
    }
}

impl ConversionService for InMemoryConversionService {
    fn can_convert(&self, path: &ConversionPath<'_>) -> bool {
        self.find(path).is_some()
    }

    fn convert(&self, value: Value, path: &ConversionPath<'_>) -> Result<Value, MessagingError> {
        match self.find(path) {
            Some(converter) => converter.convert(value, path),
            None => Err(MessagingError::conversion(
                path.source_media,
                path.target_media,
                "no converter registered",
            )),
        }
    }
}

impl std::fmt::Debug for InMemoryConversionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryConversionService")
            .field("converters", &self.converters.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Built-in converters
// ---------------------------------------------------------------------------

/// Parses strings into numbers/booleans and renders numbers as strings.
#[derive(Debug, Clone, Copy)]
pub struct ScalarConverter;

impl Converter for ScalarConverter {
    fn matches(&self, path: &ConversionPath<'_>) -> bool {
        use TypeDescriptor as T;
        matches!(
            (path.source_type, path.target_type),
            (T::String, T::Int | T::Float | T::Bool) | (T::Int | T::Float | T::Bool, T::String)
        )
    }

    fn convert(&self, value: Value, path: &ConversionPath<'_>) -> Result<Value, MessagingError> {
        let fail = |reason: &str| {
            MessagingError::conversion(path.source_type, path.target_type, reason.to_string())
        };

        if let Some(text) = value.as_str() {
            let text = text.trim();
            return match path.target_type {
                TypeDescriptor::Int => text
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|e| fail(&e.to_string())),
                TypeDescriptor::Float => text
                    .parse::<f64>()
                    .map(Value::from)
                    .map_err(|e| fail(&e.to_string())),
                TypeDescriptor::Bool => text
                    .parse::<bool>()
                    .map(Value::from)
                    .map_err(|e| fail(&e.to_string())),
                _ => Err(fail("unsupported scalar target")),
            };
        }

        match value.as_json() {
            Some(json @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_))) => {
                Ok(Value::from(json.to_string()))
            }
            _ => Err(fail("value is not a scalar")),
        }
    }
}

/// Parses a string into a [`Uuid`] object.
#[derive(Debug, Clone, Copy)]
pub struct StringToUuidConverter;

impl Converter for StringToUuidConverter {
    fn matches(&self, path: &ConversionPath<'_>) -> bool {
        *path.source_type == TypeDescriptor::String
            && *path.target_type == TypeDescriptor::class_of::<Uuid>()
    }

    fn convert(&self, value: Value, path: &ConversionPath<'_>) -> Result<Value, MessagingError> {
        let text = value.as_str().ok_or_else(|| {
            MessagingError::conversion(path.source_type, path.target_type, "value is not a string")
        })?;
        let uuid = Uuid::parse_str(text.trim()).map_err(|e| {
            MessagingError::conversion(path.source_type, path.target_type, e.to_string())
        })?;
        Ok(Value::from(Object::new(uuid)))
    }
}

/// Serde based conversion between `application/json` and a typed object.
///
/// Deserializes JSON (a JSON string payload or a structured JSON value) into
/// `T`, and serializes a `T` object back into a JSON string.
pub struct JsonConverter<T> {
    type_name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonConverter<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::named(std::any::type_name::<T>())
    }

    /// Converter for objects registered under a custom type name.
    pub fn named(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            _marker: PhantomData,
        }
    }

    fn is_own_type(&self, type_descriptor: &TypeDescriptor) -> bool {
        matches!(type_descriptor, TypeDescriptor::Class(name) if *name == self.type_name)
    }
}

impl<T> Default for JsonConverter<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Converter for JsonConverter<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn matches(&self, path: &ConversionPath<'_>) -> bool {
        let json = MediaType::application_json();
        let decoding = path.source_media.is_compatible_with(&json) && self.is_own_type(path.target_type);
        let encoding = self.is_own_type(path.source_type) && path.target_media.is_compatible_with(&json);
        decoding || encoding
    }

    fn convert(&self, value: Value, path: &ConversionPath<'_>) -> Result<Value, MessagingError> {
        let fail = |reason: String| {
            MessagingError::conversion(path.source_media, path.target_media, reason)
        };

        if self.is_own_type(path.target_type) {
            let decoded: T = match value {
                Value::Json(serde_json::Value::String(text)) => {
                    serde_json::from_str(&text).map_err(|e| fail(e.to_string()))?
                }
                Value::Json(json) => serde_json::from_value(json).map_err(|e| fail(e.to_string()))?,
                other => return Err(fail(format!("cannot decode {:?} as JSON", TypeDescriptor::of_value(&other)))),
            };
            return Ok(Value::from(Object::named(self.type_name.clone(), decoded)));
        }

        let object = value
            .downcast_ref::<T>()
            .ok_or_else(|| fail(format!("value is not a {}", self.type_name)))?;
        serde_json::to_string(object)
            .map(Value::from)
            .map_err(|e| fail(e.to_string()))
    }
}
