#![allow(unused_imports)]
use crate::{Error, Result};
use opentelemetry::trace::{TraceId, TracerProvider};
use tracing_subscriber::{EnvFilter, Layer, Registry, prelude::*};

/// Fetch an opentelemetry::trace::TraceId as hex through the full tracing stack
pub fn get_trace_id() -> TraceId {
    use opentelemetry::trace::TraceContextExt as _;
    use tracing_opentelemetry::OpenTelemetrySpanExt as _;

    tracing::Span::current()
        .context()
        .span()
        .span_context()
        .trace_id()
}

#[cfg(feature = "telemetry")]
fn resource() -> opentelemetry_sdk::Resource {
    use opentelemetry::KeyValue;

    opentelemetry_sdk::Resource::builder()
        .with_service_name(env!("CARGO_PKG_NAME"))
        .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
        .build()
}

#[cfg(feature = "telemetry")]
fn init_tracer() -> Result<opentelemetry_sdk::trace::SdkTracer> {
    use opentelemetry_otlp::WithExportConfig;

    let endpoint = std::env::var("OPENTELEMETRY_ENDPOINT_URL")
        .unwrap_or_else(|_| "http://localhost:4317".to_string());
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| Error::TelemetryError(e.to_string()))?;

    let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_resource(resource())
        .with_batch_exporter(exporter)
        .build();

    opentelemetry::global::set_tracer_provider(provider.clone());
    Ok(provider.tracer("tracing-otel-subscriber"))
}

/// Initialize tracing
///
/// Filtering follows `RUST_LOG` and defaults to `info`. With `json` the
/// log lines are emitted as one JSON object each.
pub fn init(json: bool) -> Result<()> {
    let logger = if json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().compact().boxed()
    };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| Error::TelemetryError(e.to_string()))?;

    let reg = Registry::default().with(env_filter).with(logger);

    #[cfg(feature = "telemetry")]
    let reg = reg.with(tracing_opentelemetry::layer().with_tracer(init_tracer()?));

    reg.try_init()
        .map_err(|e| Error::TelemetryError(e.to_string()))
}

#[cfg(test)]
mod test {
    #[test]
    fn trace_id_is_invalid_without_otel_layer() {
        assert_eq!(super::get_trace_id(), opentelemetry::trace::TraceId::INVALID);
    }
}
