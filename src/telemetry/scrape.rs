//! Prometheus 拉取端点
//!
//! OTLP 推送之外，请求指标同时写入独立的 prometheus registry，
//! 由 `metrics.prometheus_endpoint` 以 text 格式暴露。

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::error;

use crate::Result;

// 失败或取消的请求没有状态码
const NO_STATUS: &str = "none";

#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    requests: IntCounterVec,
    duration: HistogramVec,
    errors: IntCounterVec,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "endpoint", "status_code"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "Duration of HTTP requests in seconds",
            ),
            &["method", "endpoint"],
        )?;
        let errors = IntCounterVec::new(
            Opts::new("errors_total", "Total number of errors"),
            &["error_type", "operation"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(errors.clone()))?;

        Ok(Self {
            registry,
            requests,
            duration,
            errors,
        })
    }

    pub fn record_request(
        &self,
        method: &str,
        endpoint: &str,
        status_code: Option<u16>,
        elapsed: Duration,
    ) {
        let status = status_code.map(|code| code.to_string());
        self.requests
            .with_label_values(&[method, endpoint, status.as_deref().unwrap_or(NO_STATUS)])
            .inc();
        self.duration
            .with_label_values(&[method, endpoint])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_error(&self, error_type: &str, operation: &str) {
        self.errors.with_label_values(&[error_type, operation]).inc();
    }

    /// 以 Prometheus text 格式输出当前所有指标
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

pub fn prometheus_router(metrics: PrometheusMetrics, path: &str) -> Router {
    Router::new()
        .route(path, get(metrics_handler))
        .with_state(Arc::new(metrics))
}

async fn metrics_handler(State(metrics): State<Arc<PrometheusMetrics>>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        ),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain; charset=utf-8")],
                format!("Failed to encode metrics: {e}"),
            )
        }
    }
}
