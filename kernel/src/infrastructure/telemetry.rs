//! Logging, trace export and the Prometheus recorder for the daemon.
//!
//! Logs are JSON lines filtered by `RUST_LOG`, or by the configured level
//! when it is unset. Spans are exported over OTLP only when an endpoint is
//! configured. The exported resource names the service, its version and
//! whatever instance attributes the caller adds (sync config path, webhook
//! state).

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::trace::TracerProvider;
use opentelemetry::{Key, KeyValue, Value};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{BatchSpanProcessor, Sampler, SdkTracerProvider};
use opentelemetry_sdk::{propagation::TraceContextPropagator, Resource};
use opentelemetry_semantic_conventions::resource;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use super::config::TelemetrySettings;

/// Configures the global subscriber, the optional span exporter and the
/// metrics recorder.
pub struct TelemetryBuilder {
    service_name: String,
    service_version: String,
    otlp_endpoint: Option<String>,
    log_level: String,
    sampling_ratio: f64,
    metrics: bool,
    attributes: Vec<KeyValue>,
}

impl TelemetryBuilder {
    /// Starts a builder that only logs, at `info` unless `RUST_LOG` says otherwise.
    pub fn new(service_name: impl Into<String>, service_version: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: service_version.into(),
            otlp_endpoint: None,
            log_level: "info".to_string(),
            sampling_ratio: 1.0,
            metrics: false,
            attributes: Vec::new(),
        }
    }

    /// Builder for the configured service: name, level, sampling and, when
    /// present, the OTLP endpoint.
    pub fn from_settings(settings: &TelemetrySettings, service_version: impl Into<String>) -> Self {
        let builder = Self::new(settings.service_name.clone(), service_version)
            .with_log_level(settings.log_level.clone())
            .with_sampling_ratio(settings.sampling_ratio);
        match &settings.otlp_endpoint {
            Some(endpoint) => builder.with_tracing(endpoint.clone()),
            None => builder,
        }
    }

    /// Exports spans to the OTLP collector at `endpoint`.
    #[must_use]
    pub fn with_tracing(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = Some(endpoint.into());
        self
    }

    /// Installs the Prometheus recorder on [`TelemetryBuilder::init`].
    #[must_use]
    pub fn with_metrics(mut self) -> Self {
        self.metrics = true;
        self
    }

    /// Filter used when `RUST_LOG` is unset.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Ratio of root traces that are sampled, clamped to `0.0..=1.0`.
    #[must_use]
    pub fn with_sampling_ratio(mut self, ratio: f64) -> Self {
        self.sampling_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Adds an attribute to the exported resource.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<Key>, value: impl Into<Value>) -> Self {
        self.attributes.push(KeyValue::new(key, value));
        self
    }

    fn resource(&self) -> Resource {
        let mut attributes = vec![
            KeyValue::new(resource::SERVICE_NAME, self.service_name.clone()),
            KeyValue::new(resource::SERVICE_VERSION, self.service_version.clone()),
        ];
        attributes.extend(self.attributes.iter().cloned());
        Resource::builder().with_attributes(attributes).build()
    }

    fn tracer_provider(&self, endpoint: &str) -> Result<SdkTracerProvider> {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .context("Failed to build OTLP span exporter")?;

        Ok(SdkTracerProvider::builder()
            .with_span_processor(BatchSpanProcessor::builder(exporter).build())
            .with_resource(self.resource())
            .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                self.sampling_ratio,
            ))))
            .build())
    }

    /// Installs the global subscriber and, if enabled, the span exporter and
    /// the metrics recorder.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The OTLP span exporter cannot be built
    /// - A global subscriber is already installed
    /// - The metrics recorder cannot be installed
    pub fn init(self) -> Result<Telemetry> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level));
        let fmt_layer = fmt::layer().json().with_span_events(FmtSpan::CLOSE).boxed();

        let tracer_provider = match self.otlp_endpoint.as_deref() {
            Some(endpoint) => {
                opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());
                let provider = self.tracer_provider(endpoint)?;
                opentelemetry::global::set_tracer_provider(provider.clone());
                Some(provider)
            }
            None => None,
        };
        let otel_layer = tracer_provider.as_ref().map(|provider| {
            tracing_opentelemetry::layer().with_tracer(provider.tracer(self.service_name.clone()))
        });

        Registry::default()
            .with(env_filter)
            .with(fmt_layer)
            .with(otel_layer)
            .try_init()
            .context("Failed to init subscriber")?;

        let metrics = if self.metrics {
            Some(
                PrometheusBuilder::new()
                    .install_recorder()
                    .context("Failed to install Prometheus recorder")?,
            )
        } else {
            None
        };

        Ok(Telemetry {
            metrics,
            tracer_provider,
        })
    }
}

/// What [`TelemetryBuilder::init`] installed.
pub struct Telemetry {
    metrics: Option<PrometheusHandle>,
    tracer_provider: Option<SdkTracerProvider>,
}

impl Telemetry {
    /// Handle rendering the `/metrics` page, when metrics are enabled.
    #[must_use]
    pub fn metrics_handle(&self) -> Option<PrometheusHandle> {
        self.metrics.clone()
    }

    /// Flushes pending spans and stops the exporter.
    pub fn shutdown(self) {
        if let Some(provider) = self.tracer_provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "Span exporter shutdown failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(otlp_endpoint: Option<&str>) -> TelemetrySettings {
        TelemetrySettings {
            service_name: "gitsync".into(),
            otlp_endpoint: otlp_endpoint.map(Into::into),
            sampling_ratio: 0.25,
            log_level: "debug".into(),
        }
    }

    #[test]
    fn from_settings_copies_level_ratio_and_endpoint() {
        let builder = TelemetryBuilder::from_settings(&settings(Some("http://otel:4317")), "1.2.3");
        assert_eq!(builder.service_name, "gitsync");
        assert_eq!(builder.log_level, "debug");
        assert!((builder.sampling_ratio - 0.25).abs() < f64::EPSILON);
        assert_eq!(builder.otlp_endpoint.as_deref(), Some("http://otel:4317"));

        let local = TelemetryBuilder::from_settings(&settings(None), "1.2.3");
        assert!(local.otlp_endpoint.is_none());
    }

    #[test]
    fn sampling_ratio_is_clamped() {
        let builder = TelemetryBuilder::new("gitsync", "0.1.0").with_sampling_ratio(4.0);
        assert!((builder.sampling_ratio - 1.0).abs() < f64::EPSILON);
        let builder = builder.with_sampling_ratio(-1.0);
        assert!(builder.sampling_ratio.abs() < f64::EPSILON);
    }

    #[test]
    fn resource_carries_service_and_instance_attributes() {
        let resource = TelemetryBuilder::new("gitsync", "1.2.3")
            .with_attribute("gitsync.sync_config", "/etc/gitsync/sync-config.yml")
            .with_attribute("gitsync.webhook_enabled", true)
            .resource();
        let attributes: Vec<(String, String)> = resource
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.to_string()))
            .collect();

        for expected in [
            ("service.name", "gitsync"),
            ("service.version", "1.2.3"),
            ("gitsync.sync_config", "/etc/gitsync/sync-config.yml"),
            ("gitsync.webhook_enabled", "true"),
        ] {
            assert!(
                attributes
                    .iter()
                    .any(|(k, v)| k == expected.0 && v == expected.1),
                "missing {expected:?} in {attributes:?}"
            );
        }
    }
}
