/*
 * @Description
 * http server: 业务路由 + 健康检查 + 请求打点，支持 graceful shutdown
*/

use std::sync::Arc;

use axum::Router;
use tracing::info;

use super::middleware::RequestTaggerLayer;
use crate::{
    error::ObservabilityError, health::HealthRegistry, settings::ServerConfig,
    telemetry::{PrometheusMetrics, Telemetry},
    Result,
};

pub struct HttpServer {
    pub cfg: Arc<ServerConfig>,
    pub(super) routes: Router,
    pub(super) health: Option<(Arc<HealthRegistry>, String)>,
    pub(super) metrics: Option<(PrometheusMetrics, String)>,
    pub(super) tagger: RequestTaggerLayer,
}

impl HttpServer {
    /// 使用 telemetry 配置创建 server：打点中间件、健康检查和 Prometheus 端点按配置启用
    pub fn new(cfg: Arc<ServerConfig>, routes: Router, telemetry: &Telemetry) -> Self {
        let health_checks = &telemetry.config().health_checks;
        let health = health_checks.enabled.then(|| {
            (
                Arc::new(HealthRegistry::with_defaults(telemetry)),
                health_checks.endpoint_path.clone(),
            )
        });

        let metrics = telemetry
            .prometheus()
            .map(|prometheus| (prometheus, telemetry.config().metrics.prometheus_endpoint.clone()));

        Self {
            cfg,
            routes,
            health,
            metrics,
            tagger: telemetry.request_tagger(),
        }
    }

    pub fn with_tagger(mut self, tagger: RequestTaggerLayer) -> Self {
        self.tagger = tagger;
        self
    }

    pub async fn run_with_shutdown(
        self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.cfg.bind_addr()).await?;
        info!("Server is running on {}", listener.local_addr()?);

        let app = self.create_router();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ObservabilityError::Server(e.to_string()))?;

        Ok(())
    }
}
