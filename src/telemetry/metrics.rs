use std::time::Duration;

use opentelemetry::metrics::{Counter, Histogram, Meter, MeterProvider};
use opentelemetry::{InstrumentationScope, KeyValue};
use opentelemetry_otlp::{MetricExporter, WithExportConfig};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::Resource;
use tracing::info;

use super::scrape::PrometheusMetrics;
use crate::error::ObservabilityError;
use crate::settings::ObservabilityConfig;
use crate::Result;

/// 创建 meter provider，按 `export_interval_secs` 周期推送到 collector
pub fn build_meter_provider(
    config: &ObservabilityConfig,
    resource: Resource,
) -> Result<SdkMeterProvider> {
    let endpoint = config.metrics_endpoint();
    info!(
        endpoint,
        interval_secs = config.metrics.export_interval_secs,
        custom_meters = ?config.metrics.custom_meter_names,
        "Initializing OTLP meter provider"
    );

    let exporter = MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| ObservabilityError::Exporter(format!("metric exporter: {e}")))?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(Duration::from_secs(config.metrics.export_interval_secs))
        .build();

    let mut builder = SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader);

    if config.enable_console_exporter {
        let console = PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default())
            .with_interval(Duration::from_secs(config.metrics.export_interval_secs))
            .build();
        builder = builder.with_reader(console);
    }

    Ok(builder.build())
}

pub fn named_meter(provider: &SdkMeterProvider, name: &str) -> Meter {
    provider.meter_with_scope(InstrumentationScope::builder(name.to_owned()).build())
}

/// HTTP 请求指标
///
/// - `http_requests_total`: 请求总数 (method, endpoint, status_code)
/// - `http_request_duration_seconds`: 请求耗时 (method, endpoint)
/// - `errors_total`: 未处理的失败 (error_type, operation)
///
/// endpoint 应为路由模板（如 `/orders/{id}`），不要传原始 path。
#[derive(Clone)]
pub struct RequestMetrics {
    requests: Counter<u64>,
    duration: Histogram<f64>,
    errors: Counter<u64>,
    prometheus: Option<PrometheusMetrics>,
}

impl RequestMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            requests: meter
                .u64_counter("http_requests_total")
                .with_description("Total number of HTTP requests")
                .build(),
            duration: meter
                .f64_histogram("http_request_duration_seconds")
                .with_unit("s")
                .with_description("Duration of HTTP requests")
                .build(),
            errors: meter
                .u64_counter("errors_total")
                .with_description("Total number of errors")
                .build(),
            prometheus: None,
        }
    }

    /// 同时写入 Prometheus registry
    pub fn with_prometheus(mut self, prometheus: PrometheusMetrics) -> Self {
        self.prometheus = Some(prometheus);
        self
    }

    pub fn record_request(
        &self,
        method: &str,
        endpoint: &str,
        status_code: Option<u16>,
        elapsed: Duration,
    ) {
        let mut attributes = vec![
            KeyValue::new("method", method.to_owned()),
            KeyValue::new("endpoint", endpoint.to_owned()),
        ];
        self.duration.record(elapsed.as_secs_f64(), &attributes);

        if let Some(code) = status_code {
            attributes.push(KeyValue::new("status_code", code as i64));
        }
        self.requests.add(1, &attributes);

        if let Some(prometheus) = &self.prometheus {
            prometheus.record_request(method, endpoint, status_code, elapsed);
        }
    }

    pub fn record_error(&self, error_type: &str, operation: &str) {
        self.errors.add(
            1,
            &[
                KeyValue::new("error_type", error_type.to_owned()),
                KeyValue::new("operation", operation.to_owned()),
            ],
        );

        if let Some(prometheus) = &self.prometheus {
            prometheus.record_error(error_type, operation);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{attrs, MetricsHarness};
    use super::*;

    #[test]
    fn requests_and_errors_are_recorded_with_attributes() {
        let harness = MetricsHarness::new();
        let metrics = harness.request_metrics();

        metrics.record_request("GET", "/orders/{id}", Some(200), Duration::from_millis(12));
        metrics.record_request("GET", "/orders/{id}", Some(200), Duration::from_millis(8));
        metrics.record_request("POST", "/orders", None, Duration::from_millis(3));
        metrics.record_error("InsufficientStock", "POST /orders");

        let mut requests = harness.counter("http_requests_total");
        requests.sort();
        let mut expected = vec![
            (
                attrs(&[("method", "GET"), ("endpoint", "/orders/{id}"), ("status_code", "200")]),
                2,
            ),
            (attrs(&[("method", "POST"), ("endpoint", "/orders")]), 1),
        ];
        expected.sort();
        assert_eq!(requests, expected);

        let mut durations = harness.histogram("http_request_duration_seconds");
        durations.sort();
        let mut expected = vec![
            (attrs(&[("method", "GET"), ("endpoint", "/orders/{id}")]), 2),
            (attrs(&[("method", "POST"), ("endpoint", "/orders")]), 1),
        ];
        expected.sort();
        assert_eq!(durations, expected);

        assert_eq!(
            harness.counter("errors_total"),
            vec![(
                attrs(&[("error_type", "InsufficientStock"), ("operation", "POST /orders")]),
                1
            )]
        );
    }

    #[test]
    fn prometheus_registry_receives_the_same_requests() {
        let harness = MetricsHarness::new();
        let prometheus = PrometheusMetrics::new().unwrap();
        let metrics = harness.request_metrics().with_prometheus(prometheus.clone());

        metrics.record_request("GET", "/ping", Some(503), Duration::ZERO);
        metrics.record_error("Timeout", "GET /ping");

        let text = prometheus.encode().unwrap();
        assert!(text.contains("status_code=\"503\""));
        assert!(text.contains("operation=\"GET /ping\""));
        assert_eq!(harness.counter("http_requests_total").len(), 1);
    }
}
