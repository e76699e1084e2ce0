use anyhow::Context;
use opentelemetry::trace::TracerProvider;
use opentelemetry::KeyValue;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::{trace as sdktrace, Resource};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
    pub otlp_endpoint: String,
}

/// Resource key for the deployment stage (`production`, `staging`, ...).
const DEPLOYMENT_ENVIRONMENT: &str = "deployment.environment.name";

impl TelemetryConfig {
    fn resource_attributes(&self) -> Vec<KeyValue> {
        vec![
            KeyValue::new(SERVICE_NAME, self.service_name.clone()),
            KeyValue::new(SERVICE_VERSION, self.service_version.clone()),
            KeyValue::new(DEPLOYMENT_ENVIRONMENT, self.environment.clone()),
        ]
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "appointment-notifier".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "production".to_string(),
            otlp_endpoint: "http://localhost:4317".to_string(),
        }
    }
}

/// Flushes exported spans when dropped.
pub struct TelemetryGuard {
    provider: Option<sdktrace::SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("failed to shut down tracer provider: {e}");
            }
        }
    }
}

/// Installs the JSON log subscriber, plus OTLP span export when `export` is
/// set.
pub fn init(
    config: &TelemetryConfig,
    env_filter: EnvFilter,
    export: bool,
) -> anyhow::Result<TelemetryGuard> {
    let provider = if export {
        Some(tracer_provider(config)?)
    } else {
        None
    };

    let otel_layer = provider
        .as_ref()
        .map(|p| OpenTelemetryLayer::new(p.tracer(config.service_name.clone())));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .with(otel_layer)
        .try_init()?;

    if provider.is_some() {
        tracing::info!(
            service = %config.service_name,
            endpoint = %config.otlp_endpoint,
            "OpenTelemetry initialized"
        );
    }

    Ok(TelemetryGuard { provider })
}

fn tracer_provider(config: &TelemetryConfig) -> anyhow::Result<sdktrace::SdkTracerProvider> {
    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otlp_endpoint)
        .build()
        .with_context(|| format!("building OTLP exporter for {}", config.otlp_endpoint))?;

    let provider = sdktrace::SdkTracerProvider::builder()
        .with_resource(
            Resource::builder_empty()
                .with_attributes(config.resource_attributes())
                .build(),
        )
        .with_batch_exporter(exporter)
        .build();

    opentelemetry::global::set_tracer_provider(provider.clone());
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_attributes_describe_the_service() {
        let config = TelemetryConfig {
            environment: "staging".to_string(),
            ..TelemetryConfig::default()
        };

        let attributes: Vec<(String, String)> = config
            .resource_attributes()
            .into_iter()
            .map(|kv| (kv.key.as_str().to_string(), kv.value.to_string()))
            .collect();

        assert_eq!(
            attributes,
            vec![
                (SERVICE_NAME.to_string(), "appointment-notifier".to_string()),
                (SERVICE_VERSION.to_string(), env!("CARGO_PKG_VERSION").to_string()),
                (DEPLOYMENT_ENVIRONMENT.to_string(), "staging".to_string()),
            ]
        );
    }
}
