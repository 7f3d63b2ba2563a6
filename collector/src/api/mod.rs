//! Web API
//!
//! 暴露的端点：
//! - POST /report     - 接收 probe 上报的流量事件
//! - POST /api/auth   - 仪表板登录换取凭证
//! - GET  /api/stats  - 当日聚合统计

use axum::routing::{get, post};
use axum::{Extension, Router};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::AppState;

pub mod handlers;

/// 启动 Web 服务
pub fn start_web_server(app_state: AppState) -> tokio::task::JoinHandle<()> {
    let listen_port = app_state.config_manager.snapshot().listen_port;

    tokio::spawn(async move {
        let api_routes = Router::new()
            .route("/auth", post(handlers::auth))
            .route("/stats", get(handlers::get_stats));

        let app = Router::new()
            .route("/report", post(handlers::report))
            .nest("/api", api_routes)
            .layer(CorsLayer::permissive())
            .layer(Extension(app_state));

        let web_addr = format!("0.0.0.0:{}", listen_port);
        match tokio::net::TcpListener::bind(web_addr.clone()).await {
            Ok(listener) => {
                info!("🌐 流量统计服务: http://{}", web_addr);
                if let Err(err) = axum::serve(listener, app).await {
                    tracing::error!("Web服务错误：{}", err);
                }
            }
            Err(err) => {
                tracing::error!("Web服务启动失败：{}", err);
            }
        }
    })
}
