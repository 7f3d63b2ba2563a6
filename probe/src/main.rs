mod config;
mod delta;
mod dispatcher;
mod sampler;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::ConfigManager;
use crate::delta::DeltaTracker;

#[derive(Parser)]
#[command(name = "probe", version, about = "边缘代理流量采集客户端")]
struct Cli {
    /// 配置文件路径
    #[arg(long, default_value = "probe.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化 tracing 日志系统
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let manager = ConfigManager::load(&cli.config)?;
    manager.start_reload_task();

    let config = manager.snapshot();
    info!("流量采集启动 [{}]", config.device_id);
    info!("代理接口: {}", config.agent_addr);

    run_ticker(manager).await
}

/// 采样主循环
///
/// 采样、差分、分发在同一个周期任务里串行执行；周期错过时跳过而非
/// 追赶，保证同一时刻只有一个周期在操作连接跟踪表。
async fn run_ticker(manager: Arc<ConfigManager>) -> Result<()> {
    let mut tracker = DeltaTracker::new();
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    // 基线建立（静默模式）：只记录当前累计值，不产生任何事件
    info!("正在初始化连接快照 (静默模式)...");
    let config = manager.snapshot();
    match sampler::fetch_connections(&http, &config).await {
        Ok(connections) => {
            tracker.tick(&connections);
            info!("初始化完成，已跟踪 {} 条连接，开始正式监控", tracker.tracked());
        }
        Err(e) => {
            // 基线建立失败不致命，下一周期会当作首个周期处理
            error!("初始化连接快照失败: {:#}", e);
        }
    }

    let interval_secs = config.interval_secs.max(1);
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // 第一次 tick 立即完成，跳过它避免和基线采样背靠背
    interval.tick().await;

    loop {
        interval.tick().await;

        // 每个周期开始时取一次配置快照，整个周期内使用同一份
        let config = manager.snapshot();

        let connections = match sampler::fetch_connections(&http, &config).await {
            Ok(connections) => connections,
            Err(e) => {
                error!("采样失败，跳过本周期: {:#}", e);
                continue;
            }
        };

        debug!("活跃连接数: {}", connections.len());

        let aggregates = tracker.tick(&connections);
        if !aggregates.is_empty() {
            dispatcher::dispatch_all(&http, &config, aggregates).await;
        }
    }
}
