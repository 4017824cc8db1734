//! Tracing subscriber for processes running switchyard endpoints and
//! consumers.
//!
//! Installs a structured `fmt` layer filtered by `RUST_LOG`, falling back to
//! [`DEFAULT_DIRECTIVES`] for the switchyard crates. Spans can additionally
//! be exported through OpenTelemetry under a messaging service name.
//!
//! ```no_run
//! use switchyard_observe::tracing_setup::{TracingOptions, init_tracing_with, shutdown_tracing};
//!
//! init_tracing_with(&TracingOptions::new("order-pipeline").with_otel()).unwrap();
//! // ... run consumers ...
//! shutdown_tracing();
//! ```

use std::sync::OnceLock;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_DIRECTIVES: &str =
    "warn,switchyard_core=info,switchyard_infra=info,switchyard_observe=info";

/// Service name reported to OpenTelemetry when none is given.
pub const DEFAULT_SERVICE_NAME: &str = "switchyard";

static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("tracing is already initialized: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingOptions {
    pub service_name: String,
    pub enable_otel: bool,
    /// Used in place of [`DEFAULT_DIRECTIVES`] when `RUST_LOG` is unset.
    pub default_directives: String,
}

impl TracingOptions {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            enable_otel: false,
            default_directives: DEFAULT_DIRECTIVES.to_string(),
        }
    }

    pub fn with_otel(mut self) -> Self {
        self.enable_otel = true;
        self
    }

    pub fn with_default_directives(mut self, directives: impl Into<String>) -> Self {
        self.default_directives = directives.into();
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_directives))
    }
}

impl Default for TracingOptions {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_NAME)
    }
}

/// Install the global subscriber under [`DEFAULT_SERVICE_NAME`].
pub fn init_tracing(enable_otel: bool) -> Result<(), TracingError> {
    let options = TracingOptions::default();
    init_tracing_with(&if enable_otel { options.with_otel() } else { options })
}

/// Install the global subscriber.
///
/// Fails with [`TracingError::AlreadyInitialized`] when a global subscriber
/// is already set; the earlier one stays in place.
pub fn init_tracing_with(options: &TracingOptions) -> Result<(), TracingError> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);
    let registry = tracing_subscriber::registry()
        .with(options.env_filter())
        .with(fmt_layer);

    if !options.enable_otel {
        registry.try_init()?;
        return Ok(());
    }

    let provider = SdkTracerProvider::builder()
        .with_resource(
            Resource::builder()
                .with_service_name(options.service_name.clone())
                .build(),
        )
        .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
        .build();
    let tracer = provider.tracer(options.service_name.clone());
    registry
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .try_init()?;

    let _ = TRACER_PROVIDER.set(provider.clone());
    opentelemetry::global::set_tracer_provider(provider);
    Ok(())
}

/// Flush pending spans and shut down the OpenTelemetry provider, if any.
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            eprintln!("Warning: OTel tracer provider shutdown error: {e}");
        }
    }
}
