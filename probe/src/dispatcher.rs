//! 事件分发
//!
//! 把每个非零的节点聚合封装为流量事件，先追加到本地日志，再上报给
//! collector。上报是尽力而为：网络或鉴权失败只记录日志，事件不会
//! 重试、不会排队，也不会阻塞后续采样周期。

use std::fs::{create_dir_all, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::StatusCode;
use tracing::{error, info, warn};

use common::node::is_proxy_node;
use common::protocol::report::TrafficEvent;
use common::utils::format_bytes;

use crate::config::Config;
use crate::delta::NodeAggregate;

/// 分发一个采样周期的全部节点聚合
pub async fn dispatch_all(
    http: &reqwest::Client,
    config: &Config,
    aggregates: Vec<NodeAggregate>,
) {
    let timestamp = Utc::now().timestamp();

    for aggregate in aggregates {
        let event = TrafficEvent {
            timestamp,
            device_id: config.device_id.clone(),
            node_name: aggregate.node_name.clone(),
            up_delta: aggregate.up_delta,
            down_delta: aggregate.down_delta,
            is_proxy: is_proxy_node(&aggregate.node_name),
        };

        // 本地日志失败不影响上报，也不影响后续周期
        if let Err(e) = append_local(&config.local_log_file, &event) {
            warn!("写入本地事件日志失败: {:#}", e);
        }

        send_remote(http, config, &event).await;
    }
}

/// 把事件以 JSON 行的形式追加到本地日志
fn append_local(path: &str, event: &TrafficEvent) -> Result<()> {
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)
                .with_context(|| format!("无法创建日志目录: {}", parent.display()))?;
        }
    }

    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("无法打开事件日志: {}", path.display()))?;

    let line = serde_json::to_string(event)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

/// 上报单个事件（至多一次，失败即丢弃）
async fn send_remote(http: &reqwest::Client, config: &Config, event: &TrafficEvent) {
    if config.collector_url.is_empty() {
        return;
    }

    let result = http
        .post(&config.collector_url)
        .header("Authorization", format!("Bearer {}", config.report_token))
        .json(event)
        .timeout(Duration::from_secs(5))
        .send()
        .await;

    match result {
        Ok(resp) if resp.status() == StatusCode::OK => {
            info!(
                "已上报 | 节点: {:<15} ↑{:<10} ↓{:<10}",
                event.node_name,
                format_bytes(event.up_delta),
                format_bytes(event.down_delta)
            );
        }
        Ok(resp) if resp.status() == StatusCode::UNAUTHORIZED => {
            error!("上报被拒绝: 凭证无效 (请检查 report_token)");
        }
        Ok(resp) => {
            error!("上报失败: 服务器返回状态码 {}", resp.status());
        }
        Err(e) => {
            error!("上报失败: 网络错误: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;

    #[test]
    fn append_local_writes_one_json_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let path_str = path.to_str().unwrap();

        let event = TrafficEvent {
            timestamp: 1_700_000_000,
            device_id: "dev".to_string(),
            node_name: "nodeX".to_string(),
            up_delta: 500,
            down_delta: 500,
            is_proxy: true,
        };

        append_local(path_str, &event).unwrap();
        append_local(path_str, &event).unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let lines: Vec<String> = std::io::BufReader::new(file)
            .lines()
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines.len(), 2);

        let parsed: TrafficEvent = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn append_local_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/events.jsonl");

        let event = TrafficEvent {
            timestamp: 0,
            device_id: "dev".to_string(),
            node_name: "DIRECT".to_string(),
            up_delta: 1,
            down_delta: 0,
            is_proxy: false,
        };

        append_local(path.to_str().unwrap(), &event).unwrap();
        assert!(path.exists());
    }
}
