//! Collaborators the invocation engine consumes: reference lookup,
//! conversion, expression evaluation and channels.
//!
//! Each concern is a narrow trait with an in-memory implementation.
//! [`Collaborators`] bundles them for build-time wiring of invokers and
//! endpoints.

pub mod channel;
pub mod conversion;
pub mod expression;
pub mod reference;

use std::sync::Arc;

use switchyard_types::{Message, MessagingError};

use self::channel::{ChannelResolver, InMemoryChannelResolver};
use self::conversion::{ConversionService, InMemoryConversionService};
use self::expression::{ExpressionEvaluationService, JexlExpressionEvaluator};
use self::reference::{InMemoryReferenceSearchService, ReferenceSearchService};

/// Consumes messages delivered by a channel or consumer.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, message: &Message) -> Result<(), MessagingError>;
}

/// Services available while building and running handlers.
#[derive(Clone)]
pub struct Collaborators {
    pub references: Arc<dyn ReferenceSearchService>,
    pub conversion: Arc<dyn ConversionService>,
    pub expressions: Arc<dyn ExpressionEvaluationService>,
    pub channels: Arc<dyn ChannelResolver>,
}

impl Collaborators {
    /// Default conversion, JEXL expressions and an empty channel registry
    /// around the given references.
    pub fn new(references: Arc<dyn ReferenceSearchService>) -> Self {
        Self {
            references,
            conversion: Arc::new(InMemoryConversionService::with_defaults()),
            expressions: Arc::new(JexlExpressionEvaluator::new()),
            channels: Arc::new(InMemoryChannelResolver::new()),
        }
    }

    pub fn with_conversion_service(mut self, conversion: Arc<dyn ConversionService>) -> Self {
        self.conversion = conversion;
        self
    }

    pub fn with_expression_evaluator(
        mut self,
        expressions: Arc<dyn ExpressionEvaluationService>,
    ) -> Self {
        self.expressions = expressions;
        self
    }

    pub fn with_channels(mut self, channels: Arc<dyn ChannelResolver>) -> Self {
        self.channels = channels;
        self
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryReferenceSearchService::new()))
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
