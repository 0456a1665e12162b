use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// 健康状态，按严重程度排序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// 汇总多个状态，取最差的一个；没有检查项时为 Healthy
    pub fn aggregate<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = HealthStatus>,
    {
        statuses.into_iter().max().unwrap_or(HealthStatus::Healthy)
    }
}

/// 单个检查项的结果
#[derive(Debug, Clone, PartialEq)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub description: Option<String>,
    pub error: Option<String>,
    pub data: BTreeMap<String, Value>,
}

impl HealthCheckResult {
    pub fn healthy(description: impl Into<String>) -> Self {
        Self::new(HealthStatus::Healthy, description)
    }

    pub fn degraded(description: impl Into<String>) -> Self {
        Self::new(HealthStatus::Degraded, description)
    }

    pub fn unhealthy(description: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(HealthStatus::Unhealthy, description)
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    fn new(status: HealthStatus, description: impl Into<String>) -> Self {
        Self {
            status,
            description: Some(description.into()),
            error: None,
            data: BTreeMap::new(),
        }
    }
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self) -> HealthCheckResult;
}

/// 进程存活检查，只要能响应就是 Healthy
#[derive(Debug, Default)]
pub struct SelfCheck;

#[async_trait]
impl HealthCheck for SelfCheck {
    async fn check(&self) -> HealthCheckResult {
        HealthCheckResult::healthy("process is alive")
    }
}

/// 报告哪些 telemetry pipeline 已启用
#[derive(Debug, Clone)]
pub struct TelemetryCheck {
    tracing: bool,
    metrics: bool,
    logging: bool,
}

impl TelemetryCheck {
    pub fn new(tracing: bool, metrics: bool, logging: bool) -> Self {
        Self {
            tracing,
            metrics,
            logging,
        }
    }
}

#[async_trait]
impl HealthCheck for TelemetryCheck {
    async fn check(&self) -> HealthCheckResult {
        let result = if self.tracing || self.metrics || self.logging {
            HealthCheckResult::healthy("telemetry pipelines initialized")
        } else {
            HealthCheckResult::degraded("all telemetry pipelines are disabled")
        };

        result
            .with_data("tracing", self.tracing)
            .with_data("metrics", self.metrics)
            .with_data("logging", self.logging)
    }
}
