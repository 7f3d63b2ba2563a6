//! 订阅对账与日报
//!
//! 每天在配置的时刻抓取各订阅源的上游用量，与本地代理流量合计做
//! 差额比对。差额同时超过绝对阈值和相对阈值才判定为疑似泄漏，
//! 避免计费口径差异造成的常态性小差额触发误报。

use anyhow::Result;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, NotSet, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{error, info, warn};

use common::utils::format_bytes;

use crate::config::{Config, ConfigManager};
use crate::entity::{sub_snapshot, SubSnapshot};
use crate::migration::get_connection;
use crate::notify::Notifier;
use crate::stats::{proxy_total, today_start};
use crate::subscription::{fetch_subscription, SubscriptionUsage};

/// 单次对账结论
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationResult {
    pub date: String,
    /// 本地当日代理流量合计（字节）
    pub local_proxy_total: i64,
    /// 上游当日消耗合计（字节）
    pub upstream_total: i64,
    /// 两者差额的绝对值
    pub divergence: i64,
    pub leaked: bool,
}

/// 泄漏判定：差额须同时超过绝对下限与本地总量的相对比例
pub fn check_leak(local_total: i64, upstream_total: i64, config: &Config) -> (i64, bool) {
    let divergence = (upstream_total - local_total).abs();
    let leaked = divergence > config.leak_floor_bytes
        && (divergence as f64) > (local_total as f64) * config.leak_ratio;
    (divergence, leaked)
}

/// 按昨日快照估算当日上游消耗，无基线时整份已用量计入当日
pub fn daily_consumption(today_used: i64, prior_used: Option<i64>) -> i64 {
    match prior_used {
        Some(prior) => (today_used - prior).max(0),
        None => today_used,
    }
}

/// 按当日消耗速率估算剩余天数，当日零消耗时无法估算
pub fn days_left_estimate(remaining: i64, daily: i64) -> Option<i64> {
    if daily <= 0 {
        None
    } else {
        Some(remaining / daily)
    }
}

fn display_url(url: &str) -> String {
    let short: String = url.chars().take(40).collect();
    if short.len() < url.len() {
        format!("{}...", short)
    } else {
        short
    }
}

/// 写入（或覆盖）某源当日快照
pub async fn upsert_today_snapshot(
    db: &DatabaseConnection,
    sub_url: &str,
    date: &str,
    usage: &SubscriptionUsage,
) -> Result<sub_snapshot::Model> {
    let existing = SubSnapshot::find()
        .filter(sub_snapshot::Column::SubUrl.eq(sub_url))
        .filter(sub_snapshot::Column::Date.eq(date))
        .one(db)
        .await?;

    let now = Utc::now().naive_utc();
    let model = match existing {
        Some(model) => {
            let mut active: sub_snapshot::ActiveModel = model.into();
            active.used = Set(usage.used());
            active.total = Set(usage.total);
            active.expire = Set(usage.expire);
            active.update(db).await?
        }
        None => {
            sub_snapshot::ActiveModel {
                id: NotSet,
                date: Set(date.to_string()),
                sub_url: Set(sub_url.to_string()),
                used: Set(usage.used()),
                total: Set(usage.total),
                expire: Set(usage.expire),
                created_at: Set(now),
            }
            .insert(db)
            .await?
        }
    };
    Ok(model)
}

/// 取某源在指定日期之前最近一次的快照
pub async fn latest_prior_snapshot(
    db: &DatabaseConnection,
    sub_url: &str,
    before_date: &str,
) -> Result<Option<sub_snapshot::Model>> {
    // 日期是 %Y-%m-%d 字符串，字典序即时间序
    let snapshot = SubSnapshot::find()
        .filter(sub_snapshot::Column::SubUrl.eq(sub_url))
        .filter(sub_snapshot::Column::Date.lt(before_date))
        .order_by_desc(sub_snapshot::Column::Date)
        .order_by_desc(sub_snapshot::Column::Id)
        .one(db)
        .await?;
    Ok(snapshot)
}

/// 各配置源的最近一次快照（仪表板展示用）
pub async fn latest_snapshots(
    db: &DatabaseConnection,
    sub_urls: &[String],
) -> Result<Vec<sub_snapshot::Model>> {
    let mut snapshots = Vec::new();
    for url in sub_urls {
        let snapshot = SubSnapshot::find()
            .filter(sub_snapshot::Column::SubUrl.eq(url.as_str()))
            .order_by_desc(sub_snapshot::Column::Date)
            .order_by_desc(sub_snapshot::Column::Id)
            .one(db)
            .await?;
        if let Some(snapshot) = snapshot {
            snapshots.push(snapshot);
        }
    }
    Ok(snapshots)
}

/// 启动回填：立即抓一轮各源当日快照，保证重启当天也有对账基线
pub async fn update_snapshots(
    db: &DatabaseConnection,
    http: &reqwest::Client,
    config: &Config,
) -> Result<()> {
    let date = Utc::now().format("%Y-%m-%d").to_string();
    for url in &config.sub_urls {
        match fetch_subscription(http, url).await {
            Ok(usage) => {
                upsert_today_snapshot(db, url, &date, &usage).await?;
                info!(
                    "订阅快照已更新: {} 已用 {}",
                    display_url(url),
                    format_bytes(usage.used())
                );
            }
            Err(e) => {
                warn!("订阅快照更新失败: {} {:#}", display_url(url), e);
            }
        }
    }
    Ok(())
}

/// 执行一次日报：抓取各源、对账、组装报告并通知
pub async fn run_daily_report(
    db: &DatabaseConnection,
    http: &reqwest::Client,
    config: &Config,
    notifier: &dyn Notifier,
) -> Result<ReconciliationResult> {
    let date = Utc::now().format("%Y-%m-%d").to_string();
    let local = proxy_total(db, today_start()).await?;

    let mut upstream_total: i64 = 0;
    let mut source_lines = Vec::new();

    for url in &config.sub_urls {
        let usage = match fetch_subscription(http, url).await {
            Ok(usage) => usage,
            Err(e) => {
                // 单个源失败不影响其余源的对账
                warn!("订阅源抓取失败: {} {:#}", display_url(url), e);
                continue;
            }
        };
        upsert_today_snapshot(db, url, &date, &usage).await?;

        let prior = latest_prior_snapshot(db, url, &date).await?;
        let daily = daily_consumption(usage.used(), prior.map(|p| p.used));
        upstream_total += daily;

        let days_left = days_left_estimate(usage.remaining(), daily)
            .map(|d| format!("约 {} 天", d))
            .unwrap_or_else(|| "无法估算".to_string());
        source_lines.push(format!(
            "- {}\n  今日消耗 {}，剩余 {}，可用 {}",
            display_url(url),
            format_bytes(daily),
            format_bytes(usage.remaining()),
            days_left
        ));
    }

    let (divergence, leaked) = check_leak(local, upstream_total, config);
    let result = ReconciliationResult {
        date: date.clone(),
        local_proxy_total: local,
        upstream_total,
        divergence,
        leaked,
    };

    let mut body = format!(
        "日期: {}\n本地代理流量: {}\n上游今日消耗: {}\n差额: {}\n",
        date,
        format_bytes(local),
        format_bytes(upstream_total),
        format_bytes(divergence)
    );
    if leaked {
        body.push_str("警告: 差额超过阈值，存在疑似泄漏流量\n");
    }
    if !source_lines.is_empty() {
        body.push_str("\n订阅源明细:\n");
        body.push_str(&source_lines.join("\n"));
    }

    let subject = if leaked {
        format!("[流量日报] {} 疑似泄漏", date)
    } else {
        format!("[流量日报] {}", date)
    };
    if let Err(e) = notifier.notify(&subject, &body).await {
        error!("日报通知发送失败: {:#}", e);
    }

    Ok(result)
}

/// 距下一次 UTC `hour:minute` 的时长
pub fn duration_until(hour: u32, minute: u32) -> std::time::Duration {
    let now = Utc::now();
    let today = now
        .date_naive()
        .and_hms_opt(hour, minute, 0)
        .unwrap_or_else(|| now.date_naive().and_hms_opt(23, 55, 0).unwrap());
    let target = if today > now.naive_utc() {
        today
    } else {
        today + chrono::Duration::days(1)
    };
    (target - now.naive_utc())
        .to_std()
        .unwrap_or(std::time::Duration::from_secs(60))
}

/// 日报后台任务：每天在配置时刻触发一次
pub fn start_daily_report_task(
    config_manager: Arc<ConfigManager>,
    http: reqwest::Client,
    notifier: Arc<dyn Notifier>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let config = config_manager.snapshot();
            let wait = duration_until(config.report_hour, config.report_minute);
            info!("下一次日报将在 {} 秒后触发", wait.as_secs());
            sleep(wait).await;

            // 触发时重新取快照，热更新的阈值即时生效
            let config = config_manager.snapshot();
            let db = get_connection().await;
            match run_daily_report(db, &http, &config, notifier.as_ref()).await {
                Ok(result) if result.leaked => {
                    warn!(
                        "对账发现疑似泄漏: 差额 {}",
                        format_bytes(result.divergence)
                    );
                }
                Ok(result) => {
                    info!("日报完成: 差额 {}", format_bytes(result.divergence));
                }
                Err(e) => {
                    error!("日报执行失败: {:#}", e);
                }
            }
        }
    })
}
