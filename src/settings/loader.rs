use std::path::Path;

use ::config::{Config, Environment, File, FileFormat, Map};
use tracing::{debug, info};

use super::AppConfig;
use crate::Result;

/// 默认配置文件路径，不存在时忽略
pub const DEFAULT_CONFIG_PATH: &str = "config/observability.toml";

/// 环境变量前缀，例如 `APP__OBSERVABILITY__TRACING__SAMPLING_RATIO=0.5`
pub const ENV_PREFIX: &str = "APP";

const LIST_KEYS: [&str; 3] = [
    "observability.tracing.ignore_paths",
    "observability.tracing.ignore_hosts",
    "observability.metrics.custom_meter_names",
];

impl AppConfig {
    /// 从多个来源加载配置
    ///
    /// 优先级从低到高：结构体默认值、配置文件、环境变量。
    pub fn load(file_path: Option<&str>) -> Result<Self> {
        let path = file_path.unwrap_or(DEFAULT_CONFIG_PATH);
        // 显式指定的文件必须存在
        let required = file_path.is_some();

        let mut builder = Config::builder();
        if required || Path::new(path).exists() {
            info!(path, "loading configuration file");
            builder = builder.add_source(File::with_name(path).required(required));
        } else {
            debug!(path, "configuration file not found, using defaults");
        }

        let config = builder.add_source(environment(None)).build()?;
        Ok(config.try_deserialize()?)
    }

    /// 从字符串内容加载，环境变量由调用方给出
    pub fn from_str_with_env(
        content: &str,
        format: FileFormat,
        env: Option<Map<String, String>>,
    ) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(content, format))
            .add_source(environment(env))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

fn environment(source: Option<Map<String, String>>) -> Environment {
    let env = Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(",");

    LIST_KEYS
        .iter()
        .fold(env, |env, key| env.with_list_parse_key(key))
        .source(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::LogLevel;

    const SAMPLE: &str = r#"
[server]
addr = "127.0.0.1"
port = 9000

[observability]
service_name = "orders"
environment = "staging"
collector_endpoint = "http://otel-collector:4317"

[observability.tracing]
sampling_ratio = 0.25
ignore_paths = ["/health", "/internal"]

[observability.tracing.batch]
max_queue_size = 4096

[observability.metrics]
custom_meter_names = ["orders.checkout", "orders.inventory"]

[observability.logging]
minimum_level = "Warning"
"#;

    #[test]
    fn file_values_override_defaults() {
        let cfg = AppConfig::from_str_with_env(SAMPLE, FileFormat::Toml, Some(Map::new())).unwrap();

        assert_eq!(cfg.server.bind_addr(), "127.0.0.1:9000");
        let obs = &cfg.observability;
        assert_eq!(obs.service_name, "orders");
        assert_eq!(obs.environment, "staging");
        assert_eq!(obs.tracing.sampling_ratio, 0.25);
        assert!(obs.tracing.ignore_paths.contains("/internal"));
        assert_eq!(obs.tracing.batch.max_queue_size, 4096);
        // 未配置的字段保留默认值
        assert_eq!(obs.tracing.batch.max_export_batch_size, 512);
        assert_eq!(
            obs.metrics.custom_meter_names,
            vec!["orders.checkout".to_string(), "orders.inventory".to_string()]
        );
        assert_eq!(obs.logging.minimum_level, LogLevel::Warning);
        assert!(obs.health_checks.enabled);
        assert!(obs.validate().is_empty());
    }

    #[test]
    fn environment_overrides_file() {
        let mut env = Map::new();
        env.insert(
            "APP__OBSERVABILITY__TRACING__SAMPLING_RATIO".to_string(),
            "0.75".to_string(),
        );
        env.insert(
            "APP__OBSERVABILITY__SERVICE_NAME".to_string(),
            "orders-canary".to_string(),
        );
        env.insert(
            "APP__OBSERVABILITY__TRACING__IGNORE_HOSTS".to_string(),
            "internal.local,monitor".to_string(),
        );

        let cfg = AppConfig::from_str_with_env(SAMPLE, FileFormat::Toml, Some(env)).unwrap();

        assert_eq!(cfg.observability.service_name, "orders-canary");
        assert_eq!(cfg.observability.tracing.sampling_ratio, 0.75);
        assert_eq!(cfg.observability.tracing.ignore_hosts.len(), 2);
        assert!(cfg.observability.tracing.ignore_hosts.contains("monitor"));
    }

    #[test]
    fn empty_source_yields_defaults() {
        let cfg = AppConfig::from_str_with_env("", FileFormat::Toml, Some(Map::new())).unwrap();

        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.observability.service_name, "unknown-service");
        assert_eq!(cfg.observability.tracing_endpoint(), "http://localhost:4317");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(AppConfig::load(Some("does/not/exist.toml")).is_err());
    }
}
