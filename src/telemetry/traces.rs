use opentelemetry::trace::TracerProvider;
use opentelemetry::InstrumentationScope;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::trace::{
    BatchConfig, BatchConfigBuilder, BatchSpanProcessor, Sampler, SdkTracerProvider,
};
use opentelemetry_sdk::Resource;
use tracing::info;

use crate::error::ObservabilityError;
use crate::settings::{BatchExportConfig, ObservabilityConfig};
use crate::Result;

/// SDK tracer 类型，由 [`SdkTracerProvider`] 创建
pub type SdkTracer = <SdkTracerProvider as TracerProvider>::Tracer;

/// 根据采样率选择 sampler，并尊重上游的采样决定
pub fn sampler(ratio: f64) -> Sampler {
    let root = if ratio >= 1.0 {
        Sampler::AlwaysOn
    } else if ratio <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(ratio)
    };

    Sampler::ParentBased(Box::new(root))
}

pub fn batch_config(batch: &BatchExportConfig) -> BatchConfig {
    BatchConfigBuilder::default()
        .with_max_queue_size(batch.max_queue_size as usize)
        .with_scheduled_delay(batch.scheduled_delay())
        .with_max_export_batch_size(batch.max_export_batch_size as usize)
        .build()
}

/// 创建 tracer provider：OTLP gRPC exporter + batch processor，
/// 可选 stdout exporter 用于本地调试
pub fn build_tracer_provider(
    config: &ObservabilityConfig,
    resource: Resource,
) -> Result<SdkTracerProvider> {
    let endpoint = config.tracing_endpoint();
    info!(
        endpoint,
        sampling_ratio = config.tracing.sampling_ratio,
        "Initializing OTLP tracer"
    );

    // exporter timeout 由 exporter 自己控制，batch processor 只负责调度
    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_timeout(config.tracing.batch.exporter_timeout())
        .build()
        .map_err(|e| ObservabilityError::Exporter(format!("span exporter: {e}")))?;

    let processor = BatchSpanProcessor::builder(exporter)
        .with_batch_config(batch_config(&config.tracing.batch))
        .build();

    let mut builder = SdkTracerProvider::builder()
        .with_resource(resource)
        .with_sampler(sampler(config.tracing.sampling_ratio))
        .with_span_processor(processor);

    if config.enable_console_exporter {
        builder = builder.with_simple_exporter(opentelemetry_stdout::SpanExporter::default());
    }

    Ok(builder.build())
}

/// 以服务名作为 instrumentation scope 创建 tracer
pub fn service_tracer(provider: &SdkTracerProvider, config: &ObservabilityConfig) -> SdkTracer {
    let scope = InstrumentationScope::builder(config.service_name.clone())
        .with_version(config.service_version.clone())
        .build();

    provider.tracer_with_scope(scope)
}
