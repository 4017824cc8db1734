use thiserror::Error;

/// Boxed cause carried by [`MessagingError::MethodInvocation`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while wiring or running message handlers.
///
/// `Configuration` is only ever produced while building an invoker or
/// endpoint; every other variant is a per-message failure.
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("cannot resolve argument '{parameter}' for {target}: {reason}")]
    ArgumentResolution {
        target: String,
        parameter: String,
        reason: String,
        #[source]
        source: Option<Box<MessagingError>>,
    },

    #[error("cannot convert {from} to {to}: {reason}")]
    Conversion {
        from: String,
        to: String,
        reason: String,
    },

    #[error("reference '{0}' was not found")]
    ReferenceNotFound(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("invocation of {target} failed: {source}")]
    MethodInvocation {
        target: String,
        #[source]
        source: BoxError,
    },

    #[error("expression error: {0}")]
    Expression(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("endpoint {endpoint} requires a reply but produced none")]
    MissingReply { endpoint: String },
}

impl MessagingError {
    pub fn argument_resolution(
        target: impl Into<String>,
        parameter: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        MessagingError::ArgumentResolution {
            target: target.into(),
            parameter: parameter.into(),
            reason: reason.into(),
            source: None,
        }
    }

    pub fn conversion(from: impl ToString, to: impl ToString, reason: impl Into<String>) -> Self {
        MessagingError::Conversion {
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        MessagingError::Configuration(reason.into())
    }

    /// Report a converter failure as an argument resolution failure of
    /// `target`/`parameter`, keeping the original error as the source.
    pub fn into_argument_resolution(self, target: &str, parameter: &str) -> Self {
        match self {
            MessagingError::ArgumentResolution { reason, source, .. } => {
                MessagingError::ArgumentResolution {
                    target: target.to_string(),
                    parameter: parameter.to_string(),
                    reason,
                    source,
                }
            }
            other => MessagingError::ArgumentResolution {
                target: target.to_string(),
                parameter: parameter.to_string(),
                reason: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }

    /// Wrap a failure raised by user code running as `target`.
    ///
    /// Engine errors pass through untouched so failures from deeper in an
    /// interceptor chain are not re-wrapped at every level.
    pub fn from_invocation(target: &str, error: anyhow::Error) -> Self {
        match error.downcast::<MessagingError>() {
            Ok(messaging) => messaging,
            Err(other) => MessagingError::MethodInvocation {
                target: target.to_string(),
                source: other.into(),
            },
        }
    }

    /// Whether this error came from build-time wiring.
    pub fn is_configuration(&self) -> bool {
        matches!(self, MessagingError::Configuration(_))
    }
}
