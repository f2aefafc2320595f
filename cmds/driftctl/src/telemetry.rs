//! Logging and trace export.
//!
//! Logs always go to stderr so stdout carries only reports. The level comes
//! from `--log-level`, then `RUST_LOG`, then defaults to `info`. Spans are
//! exported over OTLP when `OTEL_EXPORTER_OTLP_ENDPOINT` or
//! `OTEL_EXPORTER_OTLP_TRACES_ENDPOINT` is set; the usual `OTEL_*` variables
//! configure the exporter and resource.

use std::io::IsTerminal;

use anyhow::{Context, Result};
use clap::ValueEnum;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::{trace::SdkTracerProvider, Resource};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const SERVICE_NAME: &str = "driftctl";

/// Not exported as a constant by opentelemetry_sdk.
const OTEL_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";

/// Shape of log lines on stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
	/// Pretty on a terminal, JSON otherwise
	#[default]
	Auto,
	Pretty,
	Json,
}

impl LogFormat {
	fn resolve(self, stderr_is_terminal: bool) -> Self {
		match self {
			LogFormat::Auto if stderr_is_terminal => LogFormat::Pretty,
			LogFormat::Auto => LogFormat::Json,
			explicit => explicit,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OtlpTransport {
	Grpc,
	Http,
}

impl OtlpTransport {
	fn from_protocol(protocol: Option<&str>) -> Self {
		match protocol.unwrap_or(opentelemetry_otlp::OTEL_EXPORTER_OTLP_PROTOCOL_DEFAULT) {
			"grpc" => OtlpTransport::Grpc,
			_ => OtlpTransport::Http,
		}
	}
}

/// Shuts the tracer provider down, flushing pending spans, when dropped.
pub struct TelemetryGuard {
	tracer_provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
	fn drop(&mut self) {
		if let Some(provider) = self.tracer_provider.take() {
			if let Err(e) = provider.shutdown() {
				eprintln!("Failed to shutdown tracer provider: {e}");
			}
		}
	}
}

fn level_filter(log_level: Option<Level>) -> EnvFilter {
	match log_level {
		Some(level) => EnvFilter::new(level.as_str()),
		None => EnvFilter::builder()
			.with_default_directive(Level::INFO.into())
			.from_env_lossy(),
	}
}

fn otlp_configured() -> bool {
	[
		opentelemetry_otlp::OTEL_EXPORTER_OTLP_ENDPOINT,
		opentelemetry_otlp::OTEL_EXPORTER_OTLP_TRACES_ENDPOINT,
	]
	.iter()
	.any(|var| std::env::var_os(var).is_some())
}

fn otlp_tracer_provider() -> Result<SdkTracerProvider> {
	let builder = Resource::builder();
	// the builder already reads OTEL_SERVICE_NAME and OTEL_RESOURCE_ATTRIBUTES
	let resource = if std::env::var_os(OTEL_SERVICE_NAME).is_some() {
		builder.build()
	} else {
		builder.with_service_name(SERVICE_NAME).build()
	};

	let protocol = std::env::var(opentelemetry_otlp::OTEL_EXPORTER_OTLP_PROTOCOL).ok();
	let exporter = match OtlpTransport::from_protocol(protocol.as_deref()) {
		OtlpTransport::Grpc => opentelemetry_otlp::SpanExporter::builder()
			.with_tonic()
			.build(),
		OtlpTransport::Http => opentelemetry_otlp::SpanExporter::builder()
			.with_http()
			.build(),
	}
	.context("failed to build OTLP span exporter")?;

	Ok(SdkTracerProvider::builder()
		.with_resource(resource)
		.with_batch_exporter(exporter)
		.build())
}

/// Install the global subscriber. Keep the guard alive until exit.
pub fn init(log_level: Option<Level>, format: LogFormat) -> Result<TelemetryGuard> {
	let fmt_layer = match format.resolve(std::io::stderr().is_terminal()) {
		LogFormat::Pretty => tracing_subscriber::fmt::layer()
			.with_writer(std::io::stderr)
			.pretty()
			.boxed(),
		_ => tracing_subscriber::fmt::layer()
			.with_writer(std::io::stderr)
			.json()
			.boxed(),
	};

	let tracer_provider = if otlp_configured() {
		Some(otlp_tracer_provider()?)
	} else {
		None
	};
	let otel_layer = tracer_provider.as_ref().map(|provider| {
		tracing_opentelemetry::layer()
			.with_error_records_to_exceptions(true)
			.with_tracer(provider.tracer(SERVICE_NAME))
	});

	tracing_subscriber::registry()
		.with(level_filter(log_level))
		.with(fmt_layer)
		.with(otel_layer)
		.init();

	if let Some(provider) = &tracer_provider {
		opentelemetry::global::set_tracer_provider(provider.clone());
	}

	Ok(TelemetryGuard { tracer_provider })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_auto_format_follows_terminal() {
		assert_eq!(LogFormat::Auto.resolve(true), LogFormat::Pretty);
		assert_eq!(LogFormat::Auto.resolve(false), LogFormat::Json);
		assert_eq!(LogFormat::Json.resolve(true), LogFormat::Json);
		assert_eq!(LogFormat::Pretty.resolve(false), LogFormat::Pretty);
	}

	#[test]
	fn test_otlp_transport_from_protocol() {
		assert_eq!(OtlpTransport::from_protocol(Some("grpc")), OtlpTransport::Grpc);
		assert_eq!(OtlpTransport::from_protocol(Some("http/protobuf")), OtlpTransport::Http);
		assert_eq!(OtlpTransport::from_protocol(Some("http/json")), OtlpTransport::Http);
	}
}
