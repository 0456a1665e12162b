use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};

use super::check::HealthStatus;
use super::registry::HealthRegistry;

const READY_TAG: &str = "ready";
const LIVE_TAG: &str = "self";

/// 健康检查路由：`{base}`（全部）、`{base}/ready`、`{base}/live`
pub fn health_router(registry: Arc<HealthRegistry>, base_path: &str) -> Router {
    let base = normalize_base(base_path);

    Router::new()
        .route(&base, get(all_handler))
        .route(&format!("{}/ready", base.trim_end_matches('/')), get(ready_handler))
        .route(&format!("{}/live", base.trim_end_matches('/')), get(live_handler))
        .with_state(registry)
}

fn normalize_base(base_path: &str) -> String {
    let trimmed = base_path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/health".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

async fn all_handler(State(registry): State<Arc<HealthRegistry>>) -> impl IntoResponse {
    respond(&registry, None).await
}

async fn ready_handler(State(registry): State<Arc<HealthRegistry>>) -> impl IntoResponse {
    respond(&registry, Some(READY_TAG)).await
}

async fn live_handler(State(registry): State<Arc<HealthRegistry>>) -> impl IntoResponse {
    respond(&registry, Some(LIVE_TAG)).await
}

async fn respond(registry: &HealthRegistry, tag: Option<&str>) -> impl IntoResponse {
    let report = registry.run(tag).await;
    let code = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(report))
}
