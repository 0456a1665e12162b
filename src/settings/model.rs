use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 应用配置，对应配置文件的顶层结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn new(addr: String, port: u16) -> Self {
        Self { addr, port }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// 可观测性配置
///
/// 启动时加载一次，之后由 [`crate::Telemetry`] 持有并只读共享。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// 服务名称
    pub service_name: String,
    /// 服务版本
    pub service_version: String,
    /// 服务命名空间
    pub service_namespace: Option<String>,
    /// 服务环境 (development, staging, production)
    pub environment: String,
    /// OTLP collector endpoint，各 pipeline 未单独配置时使用
    pub collector_endpoint: String,
    /// 是否同时输出到 stdout exporter
    pub enable_console_exporter: bool,
    /// 额外的 resource 属性
    pub resource_attributes: BTreeMap<String, String>,

    pub tracing: TracingConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
    pub health_checks: HealthChecksConfig,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown-service".to_string(),
            service_version: "1.0.0".to_string(),
            service_namespace: None,
            environment: "development".to_string(),
            collector_endpoint: "http://localhost:4317".to_string(),
            enable_console_exporter: false,
            resource_attributes: BTreeMap::new(),
            tracing: TracingConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
            health_checks: HealthChecksConfig::default(),
        }
    }
}

/// 各 pipeline 实际使用的 endpoint，已去掉首尾空白
impl ObservabilityConfig {
    pub fn tracing_endpoint(&self) -> &str {
        self.tracing
            .collector_endpoint
            .as_deref()
            .unwrap_or(&self.collector_endpoint)
            .trim()
    }

    pub fn metrics_endpoint(&self) -> &str {
        self.metrics
            .collector_endpoint
            .as_deref()
            .unwrap_or(&self.collector_endpoint)
            .trim()
    }

    pub fn logging_endpoint(&self) -> &str {
        self.logging
            .collector_endpoint
            .as_deref()
            .unwrap_or(&self.collector_endpoint)
            .trim()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    pub enabled: bool,
    /// 采样率 (0.0-1.0)
    pub sampling_ratio: f64,
    /// 请求失败时是否记录 exception 事件
    pub record_exceptions: bool,
    /// 不创建 span 的路径前缀（按路径段匹配，忽略大小写）
    pub ignore_paths: BTreeSet<String>,
    /// 不创建 span 的 Host（子串匹配，忽略大小写）
    pub ignore_hosts: BTreeSet<String>,
    pub collector_endpoint: Option<String>,
    pub batch: BatchExportConfig,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sampling_ratio: 1.0,
            record_exceptions: true,
            ignore_paths: ["/health", "/metrics", "/ready", "/live"]
                .into_iter()
                .map(String::from)
                .collect(),
            ignore_hosts: BTreeSet::new(),
            collector_endpoint: None,
            batch: BatchExportConfig::default(),
        }
    }
}

/// Batch span processor 参数，原样转交给 SDK
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchExportConfig {
    pub max_queue_size: u32,
    pub scheduled_delay_ms: u32,
    pub exporter_timeout_ms: u32,
    pub max_export_batch_size: u32,
}

impl Default for BatchExportConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 2048,
            scheduled_delay_ms: 5000,
            exporter_timeout_ms: 30000,
            max_export_batch_size: 512,
        }
    }
}

impl BatchExportConfig {
    pub fn scheduled_delay(&self) -> Duration {
        Duration::from_millis(self.scheduled_delay_ms as u64)
    }

    pub fn exporter_timeout(&self) -> Duration {
        Duration::from_millis(self.exporter_timeout_ms as u64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// 需要单独创建的 meter 名称，按配置顺序
    pub custom_meter_names: Vec<String>,
    pub collector_endpoint: Option<String>,
    /// 导出间隔（秒）
    pub export_interval_secs: u64,
    /// 是否提供 Prometheus 拉取端点
    pub prometheus_enabled: bool,
    pub prometheus_endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            custom_meter_names: Vec::new(),
            collector_endpoint: None,
            export_interval_secs: 15,
            prometheus_enabled: true,
            prometheus_endpoint: "/metrics".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    /// JSON 输出时把 message 放到顶层而不是嵌在 fields 中
    pub include_formatted_message: bool,
    /// 输出当前 span 及 span 列表
    pub include_scopes: bool,
    pub minimum_level: LogLevel,
    /// 是否使用 JSON 格式
    pub structured: bool,
    /// 是否通过 OTLP 导出日志
    pub otlp_export: bool,
    pub collector_endpoint: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            include_formatted_message: true,
            include_scopes: true,
            minimum_level: LogLevel::Information,
            structured: true,
            otlp_export: true,
            collector_endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogLevel {
    #[serde(alias = "trace")]
    Trace,
    #[serde(alias = "debug")]
    Debug,
    #[default]
    #[serde(alias = "information", alias = "info")]
    Information,
    #[serde(alias = "warning", alias = "warn")]
    Warning,
    #[serde(alias = "error")]
    Error,
    #[serde(alias = "critical")]
    Critical,
    #[serde(alias = "none", alias = "off")]
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthChecksConfig {
    pub enabled: bool,
    /// 健康检查根路径，ready/live 挂在其下
    pub endpoint_path: String,
    /// 单个检查的超时时间（秒）
    pub timeout_secs: u64,
}

impl Default for HealthChecksConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint_path: "/health".to_string(),
            timeout_secs: 5,
        }
    }
}

impl HealthChecksConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
