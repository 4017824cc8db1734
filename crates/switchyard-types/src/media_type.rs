//! Media types (`type/subtype;key=value`) describing payload encodings.
//!
//! In-memory payloads are described as `application/x-rust;type=<descriptor>`,
//! where the `type` parameter names the [`TypeDescriptor`] of the value.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::type_descriptor::TypeDescriptor;

pub const APPLICATION_JSON: &str = "application/json";
pub const TEXT_PLAIN: &str = "text/plain";
pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";
pub const APPLICATION_X_RUST: &str = "application/x-rust";

const TYPE_PARAMETER: &str = "type";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid media type '{0}'")]
pub struct MediaTypeParseError(pub String);

/// A parsed media type. Type and subtype are lower-cased on parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MediaType {
    primary: String,
    subtype: String,
    parameters: BTreeMap<String, String>,
}

impl MediaType {
    pub fn new(primary: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            primary: primary.into().to_ascii_lowercase(),
            subtype: subtype.into().to_ascii_lowercase(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn application_json() -> Self {
        Self::new("application", "json")
    }

    pub fn text_plain() -> Self {
        Self::new("text", "plain")
    }

    /// In-memory object without a declared type.
    pub fn application_x_rust() -> Self {
        Self::new("application", "x-rust")
    }

    /// In-memory object of the given type, e.g. `application/x-rust;type=string`.
    pub fn application_x_rust_with_type(type_descriptor: &TypeDescriptor) -> Self {
        Self::application_x_rust().with_parameter(TYPE_PARAMETER, type_descriptor.to_string())
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// The `type` parameter as a descriptor, when present and parsable.
    pub fn type_parameter(&self) -> Option<TypeDescriptor> {
        self.parameter(TYPE_PARAMETER)
            .and_then(|raw| raw.parse().ok())
    }

    pub fn is_rust_object(&self) -> bool {
        self.primary == "application" && self.subtype == "x-rust"
    }

    /// Type/subtype match, honouring `*` wildcards. Parameters are ignored.
    pub fn is_compatible_with(&self, other: &MediaType) -> bool {
        let primary = self.primary == "*" || other.primary == "*" || self.primary == other.primary;
        let subtype =
            self.subtype == "*" || other.subtype == "*" || self.subtype == other.subtype;
        primary && subtype
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.primary, self.subtype)?;
        for (name, value) in &self.parameters {
            write!(f, ";{name}={value}")?;
        }
        Ok(())
    }
}

impl FromStr for MediaType {
    type Err = MediaTypeParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || MediaTypeParseError(raw.to_string());
        let mut sections = raw.split(';');

        let essence = sections.next().map(str::trim).unwrap_or_default();
        let (primary, subtype) = essence.split_once('/').ok_or_else(invalid)?;
        if primary.is_empty() || subtype.is_empty() || subtype.contains('/') {
            return Err(invalid());
        }

        let mut media_type = MediaType::new(primary.trim(), subtype.trim());
        for section in sections {
            let section = section.trim();
            if section.is_empty() {
                continue;
            }
            let (name, value) = section.split_once('=').ok_or_else(invalid)?;
            media_type
                .parameters
                .insert(name.trim().to_string(), value.trim().to_string());
        }

        Ok(media_type)
    }
}

impl TryFrom<String> for MediaType {
    type Error = MediaTypeParseError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<MediaType> for String {
    fn from(media_type: MediaType) -> Self {
        media_type.to_string()
    }
}
