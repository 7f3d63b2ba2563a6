//! 连接快照采样
//!
//! 按固定周期从本地代理接口拉取活跃连接列表。

use anyhow::{Context, Result};
use reqwest::StatusCode;
use std::time::Duration;

use common::protocol::agent::{Connection, ConnectionsResponse};

use crate::config::Config;

/// 拉取当前活跃连接及其累计计数器
pub async fn fetch_connections(
    http: &reqwest::Client,
    config: &Config,
) -> Result<Vec<Connection>> {
    let url = format!("{}/connections", config.agent_addr.trim_end_matches('/'));

    let resp = http
        .get(&url)
        .header("Authorization", format!("Bearer {}", config.agent_secret))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .with_context(|| format!("无法访问代理接口: {}", url))?;

    if resp.status() != StatusCode::OK {
        anyhow::bail!(
            "代理接口鉴权失败，状态码: {} (请检查 agent_secret)",
            resp.status()
        );
    }

    let body: ConnectionsResponse = resp
        .json()
        .await
        .with_context(|| "解析连接列表 JSON 失败")?;

    Ok(body.connections)
}
