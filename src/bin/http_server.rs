use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use observability::{init_env, server::HttpServer, AppConfig, Telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_env();

    // 加载配置
    let config_path = std::env::var("OBSERVABILITY_CONFIG").ok();
    let config = AppConfig::load(config_path.as_deref()).context("failed to load configuration")?;
    if let Err(e) = config.observability.ensure_valid() {
        eprintln!("{}", e);
        return Err(e.into());
    }

    // 初始化 telemetry，subscriber 安装后才有日志输出
    let telemetry = Telemetry::init(config.observability.clone())?;
    telemetry.install()?;

    // graceful shutdown
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutting down...");
        cancel_token.cancel();
    });

    let server = HttpServer::new(Arc::new(config.server.clone()), routes(), &telemetry);

    let served = server
        .run_with_shutdown(async move { shutdown_token.cancelled().await })
        .await;
    if let Err(e) = &served {
        error!("Server error: {}", e);
    }

    // tonic exporter 的 shutdown 会阻塞等待 runtime，放到独立线程执行
    let flushed = tokio::task::spawn_blocking(move || telemetry.shutdown()).await?;
    if let Err(e) = &flushed {
        eprintln!("telemetry shutdown: {}", e);
    }

    served?;
    info!("Server shutdown complete");
    Ok(())
}

fn routes() -> Router {
    Router::new()
        .route("/ping", get(|| async { "ok" }))
        .route("/orders/{id}", get(get_order))
        .route("/orders", post(create_order))
}

#[derive(Debug, Serialize)]
struct Order {
    id: u64,
    sku: String,
    quantity: u32,
}

#[derive(Debug, Deserialize)]
struct CreateOrder {
    sku: String,
    quantity: u32,
}

enum OrderError {
    NotFound(u64),
    InsufficientStock,
}

impl IntoResponse for OrderError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            OrderError::NotFound(id) => (StatusCode::NOT_FOUND, format!("order {} not found", id)),
            OrderError::InsufficientStock => {
                (StatusCode::CONFLICT, "InsufficientStock".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

async fn get_order(Path(id): Path<u64>) -> Result<Json<Order>, OrderError> {
    if id == 0 {
        return Err(OrderError::NotFound(id));
    }
    Ok(Json(Order {
        id,
        sku: "SKU-1".to_string(),
        quantity: 1,
    }))
}

async fn create_order(Json(body): Json<CreateOrder>) -> Result<Json<Order>, OrderError> {
    if body.quantity > 100 {
        warn!(sku = %body.sku, quantity = body.quantity, "Not enough stock");
        return Err(OrderError::InsufficientStock);
    }
    info!(sku = %body.sku, quantity = body.quantity, "Order created");
    Ok(Json(Order {
        id: 42,
        sku: body.sku,
        quantity: body.quantity,
    }))
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                _ => {
                    warn!("Failed to install signal handlers, falling back to CTRL+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
            _ = sigint.recv() => info!("Received SIGINT, shutting down..."),
            _ = tokio::signal::ctrl_c() => info!("Received CTRL+C, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received CTRL+C, shutting down...");
        }
    }
}
