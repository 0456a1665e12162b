//! 健康检查：注册表、内置检查项和 HTTP 路由

mod check;
mod registry;
mod router;

pub use check::{HealthCheck, HealthCheckResult, HealthStatus, SelfCheck, TelemetryCheck};
pub use registry::{HealthEntry, HealthRegistry, HealthReport};
pub use router::health_router;
