use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::check::{HealthCheck, HealthCheckResult, HealthStatus, SelfCheck, TelemetryCheck};
use crate::telemetry::Telemetry;

#[derive(Clone)]
struct Registration {
    name: String,
    tags: Vec<String>,
    check: Arc<dyn HealthCheck>,
}

/// 已注册的健康检查集合
#[derive(Clone)]
pub struct HealthRegistry {
    checks: Vec<Registration>,
    timeout: Duration,
}

impl HealthRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            checks: Vec::new(),
            timeout,
        }
    }

    /// 内置 `self`（存活）和 `telemetry`（就绪）两项检查
    pub fn with_defaults(telemetry: &Telemetry) -> Self {
        let config = telemetry.config();
        Self::new(config.health_checks.timeout())
            .register("self", &["self"], SelfCheck)
            .register(
                "telemetry",
                &["ready"],
                TelemetryCheck::new(
                    telemetry.tracer().is_some(),
                    telemetry.request_metrics().is_some(),
                    config.logging.enabled,
                ),
            )
    }

    pub fn register<C>(mut self, name: impl Into<String>, tags: &[&str], check: C) -> Self
    where
        C: HealthCheck + 'static,
    {
        let registration = Registration {
            name: name.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            check: Arc::new(check),
        };
        self.checks.push(registration);
        self
    }

    /// 并发执行检查；`tag` 为 None 时执行全部
    ///
    /// 检查失败、panic 和超时都记为 Unhealthy，不会让调用方出错。
    pub async fn run(&self, tag: Option<&str>) -> HealthReport {
        let started = Instant::now();

        let selected = self
            .checks
            .iter()
            .filter(|r| tag.map_or(true, |tag| r.tags.iter().any(|t| t == tag)));
        let entries = join_all(selected.map(|r| self.run_one(r))).await;

        HealthReport {
            status: HealthStatus::aggregate(entries.iter().map(|e| e.status)),
            total_duration_ms: millis(started.elapsed()),
            checks: entries,
        }
    }

    async fn run_one(&self, registration: &Registration) -> HealthEntry {
        let started = Instant::now();
        let check = AssertUnwindSafe(registration.check.check()).catch_unwind();

        let result = match tokio::time::timeout(self.timeout, check).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => HealthCheckResult::unhealthy(
                "health check panicked",
                format!("{} panicked", registration.name),
            ),
            Err(_) => HealthCheckResult::unhealthy(
                "health check timed out",
                format!("timed out after {}ms", self.timeout.as_millis()),
            ),
        };

        if result.status != HealthStatus::Healthy {
            warn!(
                check = %registration.name,
                status = ?result.status,
                error = ?result.error,
                "Health check not healthy"
            );
        }

        HealthEntry {
            name: registration.name.clone(),
            status: result.status,
            description: result.description,
            duration_ms: millis(started.elapsed()),
            error_message: result.error,
            data: result.data,
        }
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// 健康检查响应体
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub total_duration_ms: f64,
    pub checks: Vec<HealthEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthEntry {
    pub name: String,
    pub status: HealthStatus,
    pub description: Option<String>,
    pub duration_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub data: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Failing;

    #[async_trait]
    impl HealthCheck for Failing {
        async fn check(&self) -> HealthCheckResult {
            HealthCheckResult::unhealthy("database", "connection refused")
        }
    }

    struct Slow;

    #[async_trait]
    impl HealthCheck for Slow {
        async fn check(&self) -> HealthCheckResult {
            tokio::time::sleep(Duration::from_secs(5)).await;
            HealthCheckResult::healthy("eventually")
        }
    }

    struct Exploding;

    #[async_trait]
    impl HealthCheck for Exploding {
        async fn check(&self) -> HealthCheckResult {
            panic!("boom")
        }
    }

    #[tokio::test]
    async fn tags_select_checks() {
        let registry = HealthRegistry::new(Duration::from_secs(1))
            .register("self", &["self"], SelfCheck)
            .register("db", &["ready"], Failing);

        let all = registry.run(None).await;
        assert_eq!(all.checks.len(), 2);
        assert_eq!(all.status, HealthStatus::Unhealthy);

        let live = registry.run(Some("self")).await;
        assert_eq!(live.checks.len(), 1);
        assert_eq!(live.status, HealthStatus::Healthy);

        let ready = registry.run(Some("ready")).await;
        assert_eq!(ready.checks[0].error_message.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn empty_selection_is_healthy() {
        let registry = HealthRegistry::new(Duration::from_secs(1));
        let report = registry.run(Some("ready")).await;
        assert!(report.checks.is_empty());
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn timeouts_and_panics_become_unhealthy() {
        let registry = HealthRegistry::new(Duration::from_millis(20))
            .register("slow", &[], Slow)
            .register("exploding", &[], Exploding)
            .register("self", &["self"], SelfCheck);

        let report = registry.run(None).await;
        let status = |name: &str| {
            report
                .checks
                .iter()
                .find(|c| c.name == name)
                .map(|c| c.status)
        };

        assert_eq!(status("slow"), Some(HealthStatus::Unhealthy));
        assert_eq!(status("exploding"), Some(HealthStatus::Unhealthy));
        assert_eq!(status("self"), Some(HealthStatus::Healthy));
        assert_eq!(report.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn report_serializes_camel_case() {
        let report = HealthReport {
            status: HealthStatus::Degraded,
            total_duration_ms: 1.5,
            checks: vec![HealthEntry {
                name: "telemetry".to_string(),
                status: HealthStatus::Degraded,
                description: Some("all telemetry pipelines are disabled".to_string()),
                duration_ms: 0.5,
                error_message: None,
                data: BTreeMap::new(),
            }],
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "Degraded");
        assert_eq!(json["totalDurationMs"], 1.5);
        assert_eq!(json["checks"][0]["durationMs"], 0.5);
        assert!(json["checks"][0].get("errorMessage").is_none());
        assert!(json["checks"][0]["data"].is_object());
    }
}
