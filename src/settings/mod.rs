mod loader;
mod model;
mod validate;

pub use loader::{DEFAULT_CONFIG_PATH, ENV_PREFIX};
pub use model::{
    AppConfig, BatchExportConfig, HealthChecksConfig, LogLevel, LoggingConfig, MetricsConfig,
    ObservabilityConfig, ServerConfig, TracingConfig,
};
