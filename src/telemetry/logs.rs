use opentelemetry::global;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, WithExportConfig};
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::Resource;
use tracing::{info, Metadata};
use tracing_subscriber::{
    filter::{filter_fn, EnvFilter, LevelFilter},
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    Layer, Registry,
};

use super::Telemetry;
use crate::error::ObservabilityError;
use crate::settings::{LogLevel, LoggingConfig, ObservabilityConfig};
use crate::Result;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

// exporter 自身的日志不能再回流到 OTLP，否则会形成循环
const EXPORTER_TARGETS: [&str; 5] = ["hyper", "h2", "tonic", "tower", "opentelemetry"];

pub fn build_logger_provider(
    config: &ObservabilityConfig,
    resource: Resource,
) -> Result<SdkLoggerProvider> {
    let endpoint = config.logging_endpoint();
    info!(endpoint, "Initializing OTLP log exporter");

    let exporter = LogExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| ObservabilityError::Exporter(format!("log exporter: {e}")))?;

    let mut builder = SdkLoggerProvider::builder()
        .with_resource(resource)
        .with_batch_exporter(exporter);

    if config.enable_console_exporter {
        builder = builder.with_simple_exporter(opentelemetry_stdout::LogExporter::default());
    }

    Ok(builder.build())
}

pub fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Trace => LevelFilter::TRACE,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Information => LevelFilter::INFO,
        LogLevel::Warning => LevelFilter::WARN,
        LogLevel::Error | LogLevel::Critical => LevelFilter::ERROR,
        LogLevel::None => LevelFilter::OFF,
    }
}

/// 控制台输出层
fn console_layer<W>(logging: &LoggingConfig, writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    if logging.structured {
        fmt::layer()
            .with_writer(writer)
            .json()
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_target(false)
            .with_level(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_current_span(logging.include_scopes)
            .with_span_list(logging.include_scopes)
            .flatten_event(logging.include_formatted_message)
            .boxed()
    } else {
        let span_events = if logging.include_scopes {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        fmt::layer()
            .with_writer(writer)
            .with_span_events(span_events)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_target(false)
            .with_level(true)
            .boxed()
    }
}

fn is_application_event(metadata: &Metadata<'_>) -> bool {
    !EXPORTER_TARGETS
        .iter()
        .any(|target| metadata.target().starts_with(target))
}

/// 安装全局 tracing subscriber 和 W3C trace context propagator
///
/// RUST_LOG 优先，否则使用配置中的 `minimum_level`。只能调用一次。
pub fn init_subscriber(telemetry: &Telemetry) -> Result<()> {
    let config = telemetry.config();
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if let Some(tracer) = telemetry.tracer() {
        layers.push(
            tracing_opentelemetry::layer()
                .with_error_records_to_exceptions(true)
                .with_tracer(tracer)
                .boxed(),
        );
    }

    if config.logging.enabled {
        if let Some(provider) = telemetry.logger_provider() {
            layers.push(
                OpenTelemetryTracingBridge::new(provider)
                    .with_filter(filter_fn(is_application_event))
                    .boxed(),
            );
        }
        layers.push(console_layer(&config.logging, std::io::stdout));
    }

    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter(config.logging.minimum_level).into())
        .from_env_lossy();

    Registry::default()
        .with(layers.with_filter(env_filter))
        .try_init()
        .map_err(|e| ObservabilityError::Subscriber(e.to_string()))?;

    global::set_text_map_propagator(TraceContextPropagator::new());

    info!(
        service_name = %config.service_name,
        service_version = %config.service_version,
        environment = %config.environment,
        sampling_ratio = %config.tracing.sampling_ratio,
        "Telemetry initialized successfully"
    );

    Ok(())
}
