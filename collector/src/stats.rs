//! 聚合统计引擎
//!
//! 对已持久化的流量记录做只读聚合。所有结果都只由记录集推导，
//! 不依赖任何运行期累加器，任何时刻重算得到相同结果。

use std::collections::HashMap;

use anyhow::Result;
use chrono::{NaiveDateTime, NaiveTime, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::Serialize;

use common::utils::format_bytes;

use crate::entity::{traffic_record, TrafficRecord};

/// 今日（UTC）零点
pub fn today_start() -> NaiveDateTime {
    Utc::now().date_naive().and_time(NaiveTime::MIN)
}

/// 单节点当日用量（按总量降序排名）
#[derive(Debug, Serialize, PartialEq)]
pub struct NodeUsage {
    pub node_name: String,
    pub total: i64,
    pub is_proxy: bool,
}

/// 代理 / 直连分方向汇总
#[derive(Debug, Default, Serialize, PartialEq)]
pub struct TrafficSummary {
    pub proxy_up: i64,
    pub proxy_down: i64,
    pub direct_up: i64,
    pub direct_down: i64,
}

/// 设备在单个节点上的当日用量
#[derive(Debug, Serialize)]
pub struct DeviceNodeUsage {
    pub name: String,
    pub up: i64,
    pub down: i64,
    pub formatted_total: String,
}

/// 单设备统计
#[derive(Debug, Serialize)]
pub struct DeviceUsage {
    pub device_id: String,
    /// 自首次上报以来的秒数
    pub uptime_secs: i64,
    pub today_up: i64,
    pub today_down: i64,
    pub total_up: i64,
    pub total_down: i64,
    pub node_usage: Vec<DeviceNodeUsage>,
}

async fn records_since(
    db: &DatabaseConnection,
    since: NaiveDateTime,
) -> Result<Vec<traffic_record::Model>> {
    let records = TrafficRecord::find()
        .filter(traffic_record::Column::Timestamp.gte(since))
        .all(db)
        .await?;
    Ok(records)
}

/// 当日各节点用量排行（总量降序）
pub async fn node_ranking(db: &DatabaseConnection, since: NaiveDateTime) -> Result<Vec<NodeUsage>> {
    let mut per_node: HashMap<String, (i64, bool)> = HashMap::new();
    for record in records_since(db, since).await? {
        let entry = per_node
            .entry(record.node_name)
            .or_insert((0, record.is_proxy));
        entry.0 += record.up_delta + record.down_delta;
    }

    let mut ranking: Vec<NodeUsage> = per_node
        .into_iter()
        .map(|(node_name, (total, is_proxy))| NodeUsage {
            node_name,
            total,
            is_proxy,
        })
        .collect();
    ranking.sort_by(|a, b| b.total.cmp(&a.total));
    Ok(ranking)
}

/// 当日代理 / 直连分方向汇总
pub async fn traffic_summary(
    db: &DatabaseConnection,
    since: NaiveDateTime,
) -> Result<TrafficSummary> {
    let mut summary = TrafficSummary::default();
    for record in records_since(db, since).await? {
        if record.is_proxy {
            summary.proxy_up += record.up_delta;
            summary.proxy_down += record.down_delta;
        } else {
            summary.direct_up += record.up_delta;
            summary.direct_down += record.down_delta;
        }
    }
    Ok(summary)
}

/// 当日本地代理流量总和（上传+下载），对账用
pub async fn proxy_total(db: &DatabaseConnection, since: NaiveDateTime) -> Result<i64> {
    let summary = traffic_summary(db, since).await?;
    Ok(summary.proxy_up + summary.proxy_down)
}

/// 各设备统计：当日与累计用量、当日分节点明细、观测在线时长
pub async fn device_stats(
    db: &DatabaseConnection,
    since: NaiveDateTime,
    now: NaiveDateTime,
) -> Result<Vec<DeviceUsage>> {
    struct Acc {
        first_seen: NaiveDateTime,
        today_up: i64,
        today_down: i64,
        total_up: i64,
        total_down: i64,
        per_node: HashMap<String, (i64, i64)>,
    }

    let records = TrafficRecord::find().all(db).await?;

    let mut per_device: HashMap<String, Acc> = HashMap::new();
    for record in records {
        let acc = per_device.entry(record.device_id).or_insert(Acc {
            first_seen: record.timestamp,
            today_up: 0,
            today_down: 0,
            total_up: 0,
            total_down: 0,
            per_node: HashMap::new(),
        });

        if record.timestamp < acc.first_seen {
            acc.first_seen = record.timestamp;
        }
        acc.total_up += record.up_delta;
        acc.total_down += record.down_delta;

        if record.timestamp >= since {
            acc.today_up += record.up_delta;
            acc.today_down += record.down_delta;
            let node = acc.per_node.entry(record.node_name).or_insert((0, 0));
            node.0 += record.up_delta;
            node.1 += record.down_delta;
        }
    }

    let mut devices: Vec<DeviceUsage> = per_device
        .into_iter()
        .map(|(device_id, acc)| {
            let mut node_usage: Vec<DeviceNodeUsage> = acc
                .per_node
                .into_iter()
                .map(|(name, (up, down))| DeviceNodeUsage {
                    formatted_total: format_bytes(up + down),
                    name,
                    up,
                    down,
                })
                .collect();
            node_usage.sort_by(|a, b| (b.up + b.down).cmp(&(a.up + a.down)));

            DeviceUsage {
                device_id,
                uptime_secs: (now - acc.first_seen).num_seconds().max(0),
                today_up: acc.today_up,
                today_down: acc.today_down,
                total_up: acc.total_up,
                total_down: acc.total_down,
                node_usage,
            }
        })
        .collect();
    devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));

    Ok(devices)
}
