use axum::Router;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use super::server::HttpServer;
use crate::health::health_router;
use crate::telemetry::prometheus_router;

impl HttpServer {
    /// 业务路由 + 健康检查 + Prometheus 端点，外层依次是 request id 和请求打点
    ///
    /// 打点中间件通过 `Router::layer` 挂在每个路由（包括 fallback）上，
    /// 这样才能拿到 `MatchedPath` 作为指标的 endpoint。
    pub fn create_router(&self) -> Router {
        let mut router = self.routes.clone();
        if let Some((registry, base_path)) = &self.health {
            router = router.merge(health_router(registry.clone(), base_path));
        }
        if let Some((metrics, path)) = &self.metrics {
            router = router.merge(prometheus_router(metrics.clone(), path));
        }

        router
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(self.tagger.clone())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }
}
