//! Declared types of parameters and return values.
//!
//! A [`TypeDescriptor`] is built once when an interface is described and is
//! then used for two checks: static assignability between declared types
//! ([`TypeDescriptor::is_compatible_with`]) and runtime acceptance of an
//! actual [`Value`] ([`TypeDescriptor::accepts`]).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::value::Value;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid type descriptor '{0}'")]
pub struct TypeParseError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    /// Accepts every value (`mixed`).
    Anything,
    Null,
    /// Return type of methods that produce nothing.
    Void,
    Bool,
    Int,
    Float,
    String,
    /// A list, optionally with a declared element type.
    Array(Option<Box<TypeDescriptor>>),
    /// A string-keyed mapping: JSON objects and message headers.
    Map,
    /// A named runtime type, matched against [`crate::value::Object`] names.
    Class(String),
    Message,
    /// The invocation context handed to around interceptors.
    MethodInvocation,
    /// Any of the members, in declaration order.
    Union(Vec<TypeDescriptor>),
}

impl TypeDescriptor {
    /// Class descriptor named after a Rust type, matching [`crate::value::Object::new`].
    pub fn class_of<T: ?Sized>() -> Self {
        TypeDescriptor::Class(std::any::type_name::<T>().to_string())
    }

    pub fn class(name: impl Into<String>) -> Self {
        TypeDescriptor::Class(name.into())
    }

    pub fn array_of(element: TypeDescriptor) -> Self {
        TypeDescriptor::Array(Some(Box::new(element)))
    }

    /// The runtime type of a value.
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Null => TypeDescriptor::Null,
            Value::Json(json) => Self::of_json(json),
            Value::Object(object) => TypeDescriptor::Class(object.type_name().to_string()),
            Value::Message(_) => TypeDescriptor::Message,
            Value::Headers(_) => TypeDescriptor::Map,
        }
    }

    fn of_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => TypeDescriptor::Null,
            serde_json::Value::Bool(_) => TypeDescriptor::Bool,
            serde_json::Value::Number(n) if n.is_f64() => TypeDescriptor::Float,
            serde_json::Value::Number(_) => TypeDescriptor::Int,
            serde_json::Value::String(_) => TypeDescriptor::String,
            serde_json::Value::Array(_) => TypeDescriptor::Array(None),
            serde_json::Value::Object(_) => TypeDescriptor::Map,
        }
    }

    /// Runtime check: can `value` be passed where this type is declared.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            TypeDescriptor::Anything => true,
            TypeDescriptor::Null | TypeDescriptor::Void => value.is_null(),
            TypeDescriptor::Union(members) => members.iter().any(|member| member.accepts(value)),
            TypeDescriptor::MethodInvocation => false,
            TypeDescriptor::Message => matches!(value, Value::Message(_)),
            TypeDescriptor::Class(name) => {
                matches!(value, Value::Object(object) if object.is_instance_of(name))
            }
            TypeDescriptor::Map => matches!(
                value,
                Value::Headers(_) | Value::Json(serde_json::Value::Object(_))
            ),
            _ => value.as_json().is_some_and(|json| self.accepts_json(json)),
        }
    }

    fn accepts_json(&self, json: &serde_json::Value) -> bool {
        match self {
            TypeDescriptor::Anything => true,
            TypeDescriptor::Null | TypeDescriptor::Void => json.is_null(),
            TypeDescriptor::Bool => json.is_boolean(),
            TypeDescriptor::Int => json.is_i64() || json.is_u64(),
            TypeDescriptor::Float => json.is_number(),
            TypeDescriptor::String => json.is_string(),
            TypeDescriptor::Array(None) => json.is_array(),
            TypeDescriptor::Array(Some(element)) => json
                .as_array()
                .is_some_and(|items| items.iter().all(|item| element.accepts_json(item))),
            TypeDescriptor::Map => json.is_object(),
            TypeDescriptor::Union(members) => members.iter().any(|m| m.accepts_json(json)),
            TypeDescriptor::Class(_) | TypeDescriptor::Message | TypeDescriptor::MethodInvocation => {
                false
            }
        }
    }

    /// Static check: is a value declared as `self` assignable to `target`.
    pub fn is_compatible_with(&self, target: &TypeDescriptor) -> bool {
        use TypeDescriptor as T;

        match (self, target) {
            (_, T::Anything) => true,
            (T::Union(members), _) => members.iter().all(|m| m.is_compatible_with(target)),
            (_, T::Union(members)) => members.iter().any(|m| self.is_compatible_with(m)),
            (T::Int, T::Float) => true,
            (T::Array(_), T::Array(None)) => true,
            (T::Array(Some(source)), T::Array(Some(element))) => source.is_compatible_with(element),
            (source, target) => source == target,
        }
    }

    pub fn allows_null(&self) -> bool {
        match self {
            TypeDescriptor::Anything | TypeDescriptor::Null | TypeDescriptor::Void => true,
            TypeDescriptor::Union(members) => members.iter().any(TypeDescriptor::allows_null),
            _ => false,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeDescriptor::Void)
    }

    /// Whether a full header mapping can be bound to a parameter of this type.
    pub fn accepts_headers(&self) -> bool {
        TypeDescriptor::Map.is_compatible_with(self)
    }

    /// Whether a whole message can be bound to a parameter of this type.
    pub fn accepts_message(&self) -> bool {
        TypeDescriptor::Message.is_compatible_with(self)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Anything => f.write_str("mixed"),
            TypeDescriptor::Null => f.write_str("null"),
            TypeDescriptor::Void => f.write_str("void"),
            TypeDescriptor::Bool => f.write_str("bool"),
            TypeDescriptor::Int => f.write_str("int"),
            TypeDescriptor::Float => f.write_str("float"),
            TypeDescriptor::String => f.write_str("string"),
            TypeDescriptor::Array(None) => f.write_str("array"),
            TypeDescriptor::Array(Some(element)) => write!(f, "array<{element}>"),
            TypeDescriptor::Map => f.write_str("map"),
            TypeDescriptor::Class(name) => f.write_str(name),
            TypeDescriptor::Message => f.write_str("message"),
            TypeDescriptor::MethodInvocation => f.write_str("invocation"),
            TypeDescriptor::Union(members) => {
                for (index, member) in members.iter().enumerate() {
                    if index > 0 {
                        f.write_str("|")?;
                    }
                    write!(f, "{member}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for TypeDescriptor {
    type Err = TypeParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TypeParseError(raw.to_string()));
        }

        let members = split_top_level(raw).ok_or_else(|| TypeParseError(raw.to_string()))?;
        if members.len() > 1 {
            let members = members
                .into_iter()
                .map(str::parse)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(TypeDescriptor::Union(members));
        }

        if let Some(inner) = raw.strip_prefix("array<").and_then(|r| r.strip_suffix('>')) {
            return Ok(TypeDescriptor::array_of(inner.parse()?));
        }

        Ok(match raw {
            "mixed" => TypeDescriptor::Anything,
            "null" => TypeDescriptor::Null,
            "void" => TypeDescriptor::Void,
            "bool" => TypeDescriptor::Bool,
            "int" => TypeDescriptor::Int,
            "float" => TypeDescriptor::Float,
            "string" => TypeDescriptor::String,
            "array" => TypeDescriptor::Array(None),
            "map" => TypeDescriptor::Map,
            "message" => TypeDescriptor::Message,
            "invocation" => TypeDescriptor::MethodInvocation,
            name if name.contains(['<', '>', '|']) => return Err(TypeParseError(raw.to_string())),
            name => TypeDescriptor::Class(name.to_string()),
        })
    }
}

/// Split on `|` outside angle brackets. `None` when brackets are unbalanced.
fn split_top_level(raw: &str) -> Option<Vec<&str>> {
    let mut depth = 0usize;
    let mut start = 0;
    let mut parts = Vec::new();

    for (index, ch) in raw.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.checked_sub(1)?,
            '|' if depth == 0 => {
                parts.push(raw[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    parts.push(raw[start..].trim());
    Some(parts)
}
