use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use common::protocol::report::TrafficEvent;
use common::utils::format_bytes;

use crate::ingest::persist_event;
use crate::migration::get_connection;
use crate::reconcile::latest_snapshots;
use crate::stats::{device_stats, node_ranking, today_start, traffic_summary, DeviceUsage, NodeUsage, TrafficSummary};
use crate::AppState;

/// 校验 `Authorization: Bearer <token>` 头
fn verify_bearer(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v == token)
        .unwrap_or(false)
}

/// POST /report - 接收单个流量事件
///
/// 认证先于请求体校验：凭证无效时返回 401，不关心请求体是否合法。
pub async fn report(
    Extension(app_state): Extension<AppState>,
    headers: HeaderMap,
    payload: Result<Json<TrafficEvent>, JsonRejection>,
) -> impl IntoResponse {
    let config = app_state.config_manager.snapshot();

    if !verify_bearer(&headers, &config.report_token) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "无效的上报凭证" })),
        );
    }

    let Json(event) = match payload {
        Ok(json) => json,
        Err(e) => {
            warn!("上报请求体解析失败: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": "无效的请求体" })),
            );
        }
    };

    let db = get_connection().await;
    match persist_event(db, &event).await {
        Ok(record) => {
            debug!(
                "收到上报: {} {} {}",
                record.device_id,
                record.node_name,
                format_bytes(record.up_delta + record.down_delta)
            );
            (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
        }
        Err(e) => {
            error!("流量事件入库失败: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "入库失败" })),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    pub username: String,
    pub password: String,
}

/// POST /api/auth - 仪表板登录
pub async fn auth(
    Extension(app_state): Extension<AppState>,
    Json(req): Json<AuthRequest>,
) -> impl IntoResponse {
    let config = app_state.config_manager.snapshot();

    // 未配置用户名时禁用登录
    if config.dashboard_user.is_empty()
        || req.username != config.dashboard_user
        || req.password != config.report_token
    {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "用户名或密码错误" })),
        );
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({ "token": config.report_token })),
    )
}

/// 订阅源展示视图
#[derive(Debug, Serialize)]
pub struct SubStat {
    pub sub_url: String,
    pub date: String,
    pub used: i64,
    pub total: i64,
    pub remaining: i64,
    pub expire: i64,
    pub formatted_used: String,
    pub formatted_total: String,
}

/// GET /api/stats 的完整响应
#[derive(Debug, Serialize)]
pub struct DailyStats {
    pub date: String,
    pub summary: TrafficSummary,
    pub node_stats: Vec<NodeUsage>,
    pub device_stats: Vec<DeviceUsage>,
    pub sub_stats: Vec<SubStat>,
}

/// GET /api/stats - 当日聚合统计
pub async fn get_stats(
    Extension(app_state): Extension<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let config = app_state.config_manager.snapshot();

    if !verify_bearer(&headers, &config.report_token) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "无效的凭证" })),
        )
            .into_response();
    }

    let db = get_connection().await;
    let since = today_start();
    let now = Utc::now().naive_utc();

    let result = async {
        let summary = traffic_summary(db, since).await?;
        let node_stats = node_ranking(db, since).await?;
        let devices = device_stats(db, since, now).await?;
        let snapshots = latest_snapshots(db, &config.sub_urls).await?;
        anyhow::Ok((summary, node_stats, devices, snapshots))
    }
    .await;

    match result {
        Ok((summary, node_stats, devices, snapshots)) => {
            let sub_stats = snapshots
                .into_iter()
                .map(|s| SubStat {
                    remaining: (s.total - s.used).max(0),
                    formatted_used: format_bytes(s.used),
                    formatted_total: format_bytes(s.total),
                    sub_url: s.sub_url,
                    date: s.date,
                    used: s.used,
                    total: s.total,
                    expire: s.expire,
                })
                .collect();

            let stats = DailyStats {
                date: Utc::now().format("%Y-%m-%d").to_string(),
                summary,
                node_stats,
                device_stats: devices,
                sub_stats,
            };
            (StatusCode::OK, Json(stats)).into_response()
        }
        Err(e) => {
            error!("统计查询失败: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "统计查询失败" })),
            )
                .into_response()
        }
    }
}
