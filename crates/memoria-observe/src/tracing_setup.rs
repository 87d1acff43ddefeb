//! Tracing subscriber initialization for the `memoria` binary.
//!
//! Installs an `EnvFilter` (from `RUST_LOG`, falling back to the level
//! implied by the CLI verbosity flags), a human-readable or JSON `fmt`
//! layer, and optionally an OpenTelemetry layer exporting spans to stdout.

use std::sync::OnceLock;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Kept for flushing on shutdown.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Subscriber settings derived from CLI flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TracingOptions {
    /// Number of `-v` flags.
    pub verbosity: u8,
    /// `--quiet`: errors only.
    pub quiet: bool,
    /// Emit one JSON object per event.
    pub json: bool,
    /// Bridge spans to OpenTelemetry (stdout exporter).
    pub otel: bool,
}

impl TracingOptions {
    /// Filter directive used when `RUST_LOG` is unset.
    pub fn default_directive(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbosity {
            0 => "warn,memoria=info",
            1 => "info,memoria=debug",
            2 => "debug",
            _ => "trace",
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.default_directive()))
    }
}

/// Initialize the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(options: TracingOptions) -> Result<(), Box<dyn std::error::Error>> {
    let otel_layer = if options.otel {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer("memoria");
        let _ = TRACER_PROVIDER.set(provider.clone());
        opentelemetry::global::set_tracer_provider(provider);
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    let registry = tracing_subscriber::registry()
        .with(options.env_filter())
        .with(otel_layer);

    if options.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()?;
    }

    Ok(())
}

/// Flush buffered spans. No-op when OpenTelemetry was not enabled.
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get()
        && let Err(e) = provider.shutdown()
    {
        eprintln!("Warning: OTel tracer provider shutdown error: {e}");
    }
}
