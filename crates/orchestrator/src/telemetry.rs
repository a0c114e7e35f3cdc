//! Telemetry setup for OpenTelemetry integration

use anyhow::Result;

use crate::logging::BoxedLayer;

const ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// OpenTelemetry layer, if configured
///
/// # Environment Variables
///
/// - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (e.g., http://localhost:4317)
/// - `OTEL_SERVICE_NAME`: Service name (default: regwatch)
///
/// # Example
///
/// ```text
/// OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 \
/// OTEL_SERVICE_NAME=regwatch-nightly \
///     regwatch --parallel
/// ```
pub fn layer() -> Result<Option<BoxedLayer>> {
    let Ok(endpoint) = std::env::var(ENDPOINT_VAR) else {
        return Ok(None);
    };

    #[cfg(feature = "telemetry")]
    {
        layer_impl(endpoint).map(Some)
    }

    #[cfg(not(feature = "telemetry"))]
    {
        let _ = endpoint;
        Ok(None)
    }
}

/// Log whether traces are exported (call once the subscriber is installed)
pub fn report_status() {
    if std::env::var(ENDPOINT_VAR).is_err() {
        tracing::debug!("OpenTelemetry not configured ({} not set)", ENDPOINT_VAR);
        return;
    }
    if cfg!(feature = "telemetry") {
        tracing::info!("OpenTelemetry initialized successfully");
    } else {
        tracing::warn!("OpenTelemetry endpoint set but feature 'telemetry' not enabled");
        tracing::warn!("Rebuild with: cargo build --features telemetry");
    }
}

/// Flush pending spans before exit
pub fn shutdown() {
    #[cfg(feature = "telemetry")]
    opentelemetry::global::shutdown_tracer_provider();
}

#[cfg(feature = "telemetry")]
fn layer_impl(endpoint: String) -> Result<BoxedLayer> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;
    use tracing_subscriber::Layer;

    let service_name = std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "regwatch".to_string());

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;
    let provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .build();
    let tracer = provider.tracer(service_name);
    opentelemetry::global::set_tracer_provider(provider);

    Ok(tracing_opentelemetry::layer::<tracing_subscriber::Registry>()
        .with_tracer(tracer)
        .boxed())
}
