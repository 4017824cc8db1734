//! Shared domain types for switchyard.
//!
//! Messages, runtime values, type and media-type descriptors, interface
//! descriptors and the error taxonomy used across the workspace.
//!
//! No infrastructure dependencies: serde, uuid, chrono, thiserror and anyhow
//! (for the error sources of user-supplied method bodies).

pub mod config;
pub mod error;
pub mod interface;
pub mod media_type;
pub mod message;
pub mod type_descriptor;
pub mod value;

pub use error::MessagingError;
pub use interface::{Annotation, InterfaceParameter, InterfaceToCall};
pub use media_type::MediaType;
pub use message::{Message, MessageBuilder, MessageHeaders};
pub use type_descriptor::TypeDescriptor;
pub use value::{Object, Value};
