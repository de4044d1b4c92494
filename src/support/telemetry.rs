//! Structured logging, plus optional OpenTelemetry export behind the
//! `telemetry` feature (spec §1 ambient additions), grounded on the
//! teacher's `src/telemetry.rs`.

#[cfg(not(feature = "telemetry"))]
pub struct Telemetry;

#[cfg(not(feature = "telemetry"))]
impl Telemetry {
    pub fn new(_service_name: &'static str) -> Self {
        tracing_subscriber::fmt::init();
        Telemetry
    }
}

#[cfg(feature = "telemetry")]
pub use enabled::Telemetry;

#[cfg(feature = "telemetry")]
mod enabled {
    use std::env;

    use opentelemetry::{global, trace::TracerProvider as _, KeyValue};
    use opentelemetry_sdk::metrics::{MeterProviderBuilder, PeriodicReader, SdkMeterProvider};
    use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, SdkTracerProvider};
    use opentelemetry_sdk::Resource;
    use opentelemetry_semantic_conventions::attribute::{DEPLOYMENT_ENVIRONMENT_NAME, SERVICE_VERSION};
    use opentelemetry_semantic_conventions::SCHEMA_URL;
    use tracing_opentelemetry::{MetricsLayer, OpenTelemetryLayer};
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    fn otel_enabled() -> bool {
        env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() || env::var("OTEL_EXPORTER_OTLP_PROTOCOL").is_ok()
    }

    fn resource(service_name: &'static str) -> Resource {
        let deployment_env = env::var("DEPLOYMENT_ENV").unwrap_or_else(|_| "develop".to_string());
        Resource::builder()
            .with_service_name(service_name)
            .with_schema_url(
                [
                    KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
                    KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, deployment_env),
                ],
                SCHEMA_URL,
            )
            .build()
    }

    /// Wraps the OpenTelemetry providers so shutdown happens on drop.
    pub struct Telemetry {
        tracer_provider: Option<SdkTracerProvider>,
        meter_provider: Option<SdkMeterProvider>,
    }

    impl Telemetry {
        pub fn new(service_name: &'static str) -> Self {
            if !otel_enabled() {
                tracing_subscriber::registry().with(tracing_subscriber::fmt::layer()).init();
                tracing::info!("OpenTelemetry export is not configured");
                return Telemetry { tracer_provider: None, meter_provider: None };
            }

            let res = resource(service_name);

            let span_exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .build()
                .expect("failed to build OTLP span exporter");
            let tracer_provider = SdkTracerProvider::builder()
                .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(1.0))))
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(res.clone())
                .with_batch_exporter(span_exporter)
                .build();
            let tracer = tracer_provider.tracer("nuwa-payment-channel");

            let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
                .with_tonic()
                .with_temporality(opentelemetry_sdk::metrics::Temporality::default())
                .build()
                .expect("failed to build OTLP metric exporter");
            let reader = PeriodicReader::builder(metric_exporter).with_interval(std::time::Duration::from_secs(30)).build();
            let meter_provider = MeterProviderBuilder::default().with_resource(res).with_reader(reader).build();
            global::set_meter_provider(meter_provider.clone());

            tracing_subscriber::registry()
                .with(tracing_subscriber::filter::LevelFilter::INFO)
                .with(tracing_subscriber::fmt::layer())
                .with(MetricsLayer::new(meter_provider.clone()))
                .with(OpenTelemetryLayer::new(tracer))
                .init();

            tracing::info!("OpenTelemetry tracing and metrics export enabled");
            Telemetry { tracer_provider: Some(tracer_provider), meter_provider: Some(meter_provider) }
        }
    }

    impl Drop for Telemetry {
        fn drop(&mut self) {
            if let Some(provider) = self.tracer_provider.as_ref() {
                if let Err(err) = provider.shutdown() {
                    eprintln!("{err:?}");
                }
            }
            if let Some(provider) = self.meter_provider.as_ref() {
                if let Err(err) = provider.shutdown() {
                    eprintln!("{err:?}");
                }
            }
        }
    }
}
