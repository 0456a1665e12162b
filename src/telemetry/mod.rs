//! OpenTelemetry provider 的构建与生命周期管理。
//!
//! [`Telemetry::init`] 根据配置创建 tracer / meter / logger provider，
//! 返回的句柄由调用方持有并按引用传递；[`Telemetry::shutdown`] 负责 flush
//! 和关闭。全局只安装 tracing subscriber 与 propagator（见 [`Telemetry::install`]）。

pub mod logs;
pub mod metrics;
pub mod scrape;
pub mod traces;

use std::sync::Arc;

use opentelemetry::metrics::Meter;
use opentelemetry::KeyValue;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::SERVICE_VERSION;
use tracing::{error, info};

use crate::error::ObservabilityError;
use crate::server::RequestTaggerLayer;
use crate::settings::ObservabilityConfig;
use crate::Result;

pub use metrics::RequestMetrics;
pub use scrape::{prometheus_router, PrometheusMetrics};
pub use traces::SdkTracer;

// 手动定义语义常量，部分仍属于 experimental
const DEPLOYMENT_ENVIRONMENT: &str = "deployment.environment";
const SERVICE_NAMESPACE: &str = "service.namespace";
const SERVICE_INSTANCE_ID: &str = "service.instance.id";

/// 创建资源描述符
pub fn build_resource(config: &ObservabilityConfig) -> Resource {
    let mut attributes = vec![
        KeyValue::new(SERVICE_VERSION, config.service_version.clone()),
        KeyValue::new(DEPLOYMENT_ENVIRONMENT, config.environment.clone()),
        KeyValue::new(SERVICE_INSTANCE_ID, uuid::Uuid::new_v4().to_string()),
    ];
    if let Some(namespace) = &config.service_namespace {
        attributes.push(KeyValue::new(SERVICE_NAMESPACE, namespace.clone()));
    }
    attributes.extend(
        config
            .resource_attributes
            .iter()
            .map(|(key, value)| KeyValue::new(key.clone(), value.clone())),
    );

    Resource::builder()
        .with_service_name(config.service_name.clone())
        .with_attributes(attributes)
        .build()
}

/// 进程级的 telemetry 句柄
pub struct Telemetry {
    config: Arc<ObservabilityConfig>,
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
    logger_provider: Option<SdkLoggerProvider>,
    custom_meters: Vec<(String, Meter)>,
    request_metrics: Option<RequestMetrics>,
    prometheus: Option<PrometheusMetrics>,
}

impl Telemetry {
    /// 按配置构建所有启用的 provider，需要在 tokio runtime 中调用
    pub fn init(config: ObservabilityConfig) -> Result<Self> {
        let resource = build_resource(&config);

        let tracer_provider = if config.tracing.enabled {
            Some(traces::build_tracer_provider(&config, resource.clone())?)
        } else {
            info!("Tracing disabled");
            None
        };

        let meter_provider = if config.metrics.enabled {
            Some(metrics::build_meter_provider(&config, resource.clone())?)
        } else {
            info!("Metrics disabled");
            None
        };

        let logger_provider = if config.logging.enabled && config.logging.otlp_export {
            Some(logs::build_logger_provider(&config, resource)?)
        } else {
            None
        };

        let prometheus = if config.metrics.enabled && config.metrics.prometheus_enabled {
            info!(
                endpoint = %config.metrics.prometheus_endpoint,
                "Prometheus scrape endpoint enabled"
            );
            Some(PrometheusMetrics::new()?)
        } else {
            None
        };

        let (custom_meters, request_metrics) = match &meter_provider {
            Some(provider) => {
                let custom_meters = config
                    .metrics
                    .custom_meter_names
                    .iter()
                    .map(|name| (name.clone(), metrics::named_meter(provider, name)))
                    .collect();
                let service_meter = metrics::named_meter(provider, &config.service_name);
                let request_metrics = RequestMetrics::new(&service_meter);
                let request_metrics = match &prometheus {
                    Some(prometheus) => request_metrics.with_prometheus(prometheus.clone()),
                    None => request_metrics,
                };
                (custom_meters, Some(request_metrics))
            }
            None => (Vec::new(), None),
        };

        Ok(Self {
            config: Arc::new(config),
            tracer_provider,
            meter_provider,
            logger_provider,
            custom_meters,
            request_metrics,
            prometheus,
        })
    }

    pub fn config(&self) -> &ObservabilityConfig {
        &self.config
    }

    /// tracing 关闭时返回 None
    pub fn tracer(&self) -> Option<SdkTracer> {
        self.tracer_provider
            .as_ref()
            .map(|provider| traces::service_tracer(provider, &self.config))
    }

    /// 按名称获取 meter：优先返回配置中声明的 custom meter
    pub fn meter(&self, name: &str) -> Option<Meter> {
        if let Some((_, meter)) = self.custom_meters.iter().find(|(n, _)| n == name) {
            return Some(meter.clone());
        }
        self.meter_provider
            .as_ref()
            .map(|provider| metrics::named_meter(provider, name))
    }

    /// 按配置顺序返回 custom meter
    pub fn custom_meters(&self) -> impl Iterator<Item = (&str, &Meter)> {
        self.custom_meters
            .iter()
            .map(|(name, meter)| (name.as_str(), meter))
    }

    pub fn logger_provider(&self) -> Option<&SdkLoggerProvider> {
        self.logger_provider.as_ref()
    }

    pub fn request_metrics(&self) -> Option<RequestMetrics> {
        self.request_metrics.clone()
    }

    /// Prometheus 拉取端点使用的 registry，未启用时为 None
    pub fn prometheus(&self) -> Option<PrometheusMetrics> {
        self.prometheus.clone()
    }

    /// 基于当前配置创建请求打点中间件
    pub fn request_tagger(&self) -> RequestTaggerLayer {
        let layer = RequestTaggerLayer::from_config(self.tracer(), &self.config.tracing);
        match self.request_metrics() {
            Some(metrics) => layer.with_metrics(metrics),
            None => layer,
        }
    }

    /// 安装全局 subscriber，见 [`logs::init_subscriber`]
    pub fn install(&self) -> Result<()> {
        logs::init_subscriber(self)
    }

    /// flush 并关闭所有 provider，返回所有失败信息
    pub fn shutdown(self) -> Result<()> {
        let mut failures = Vec::new();

        if let Some(provider) = self.tracer_provider {
            match provider.shutdown() {
                Ok(()) => info!("Tracer provider shutdown successfully"),
                Err(e) => {
                    error!("Failed to shutdown tracer provider: {:?}", e);
                    failures.push(format!("tracer provider: {e}"));
                }
            }
        }

        if let Some(provider) = self.meter_provider {
            match provider.shutdown() {
                Ok(()) => info!("Meter provider shutdown successfully"),
                Err(e) => {
                    error!("Failed to shutdown meter provider: {:?}", e);
                    failures.push(format!("meter provider: {e}"));
                }
            }
        }

        if let Some(provider) = self.logger_provider {
            match provider.shutdown() {
                Ok(()) => info!("Logger provider shutdown successfully"),
                Err(e) => {
                    error!("Failed to shutdown logger provider: {:?}", e);
                    failures.push(format!("logger provider: {e}"));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ObservabilityError::Shutdown(failures.join("; ")))
        }
    }
}
