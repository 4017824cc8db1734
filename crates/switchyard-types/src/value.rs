//! Runtime values flowing through the invocation pipeline.
//!
//! Payloads, header-derived arguments, collaborator references and method
//! return values are all carried as [`Value`]. Plain data lives in
//! `serde_json::Value`; anything else (domain objects, services, annotations)
//! is an opaque [`Object`] tagged with its type name.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::message::{Message, MessageHeaders};

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

/// Opaque, shareable instance of an arbitrary Rust type.
///
/// The type name plays the role of a runtime class: type descriptors match
/// objects by name, and `supertypes` lets one object satisfy several declared
/// types (an implementation and the interfaces it fulfils).
#[derive(Clone)]
pub struct Object {
    type_name: Arc<str>,
    supertypes: Arc<[String]>,
    inner: Arc<dyn Any + Send + Sync>,
}

impl Object {
    /// Wrap a value, naming it after its Rust type path.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::named(std::any::type_name::<T>(), value)
    }

    /// Wrap a value under an explicit type name.
    pub fn named<T: Any + Send + Sync>(type_name: impl Into<String>, value: T) -> Self {
        Self::from_arc(type_name, Arc::new(value))
    }

    /// Wrap an already shared instance so callers keep their own handle to it.
    pub fn from_arc<T: Any + Send + Sync>(type_name: impl Into<String>, value: Arc<T>) -> Self {
        let type_name: String = type_name.into();
        Self {
            type_name: Arc::from(type_name),
            supertypes: Arc::from(Vec::new()),
            inner: value,
        }
    }

    /// Declare additional type names this object satisfies.
    pub fn with_supertypes<I, S>(mut self, supertypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let supertypes: Vec<String> = supertypes.into_iter().map(Into::into).collect();
        self.supertypes = Arc::from(supertypes);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn supertypes(&self) -> &[String] {
        &self.supertypes
    }

    /// Whether this object can be passed where `type_name` is declared.
    pub fn is_instance_of(&self, type_name: &str) -> bool {
        *self.type_name == *type_name || self.supertypes.iter().any(|s| s == type_name)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn downcast_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.inner).downcast::<T>().ok()
    }

    /// Identity comparison: both handles point at the same instance.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(&other.inner))
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A payload, argument or return value.
///
/// JSON `null` is always normalised to [`Value::Null`] by the `From`
/// conversions, so `is_null` is the single check callers need.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Json(serde_json::Value),
    Object(Object),
    Message(Message),
    Headers(MessageHeaders),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null | Value::Json(serde_json::Value::Null))
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(json) => Some(json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_json().and_then(serde_json::Value::as_str)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_json().and_then(serde_json::Value::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_json().and_then(serde_json::Value::as_f64)
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Value::Message(message) => Some(message),
            _ => None,
        }
    }

    pub fn as_headers(&self) -> Option<&MessageHeaders> {
        match self {
            Value::Headers(headers) => Some(headers),
            _ => None,
        }
    }

    /// Downcast an object payload to a concrete Rust type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_object().and_then(Object::downcast_ref::<T>)
    }

    /// JSON view used as expression context.
    ///
    /// Objects have no data representation and render as `{"type": name}`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Json(json) => json.clone(),
            Value::Object(object) => serde_json::json!({ "type": object.type_name() }),
            Value::Message(message) => serde_json::json!({
                "payload": message.payload().to_json(),
                "headers": message.headers().to_json(),
            }),
            Value::Headers(headers) => headers.to_json(),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            other => Value::Json(other),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Json(serde_json::Value::String(s.to_string()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Json(serde_json::Value::String(s))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Json(serde_json::Value::Bool(b))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Json(serde_json::Value::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Json(serde_json::Value::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::from(serde_json::Value::from(n))
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

impl From<Message> for Value {
    fn from(message: Message) -> Self {
        Value::Message(message)
    }
}

impl From<MessageHeaders> for Value {
    fn from(headers: MessageHeaders) -> Self {
        Value::Headers(headers)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
