mod api;
mod config;
mod entity;
mod ingest;
mod migration;
mod notify;
mod reconcile;
mod stats;
mod subscription;

use anyhow::Result;
use clap::Parser;
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::ConfigManager;
use crate::migration::{get_connection, init_sqlite};
use crate::notify::Notifier;

#[derive(Parser, Debug)]
#[command(author, version, about = "流量统计服务端")]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "collector.toml")]
    config: String,
}

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub config_manager: Arc<ConfigManager>,
    pub notifier: Arc<dyn Notifier>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化 tracing 日志系统
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    // 读取配置
    let config_manager = ConfigManager::load(&cli.config)?;
    config_manager.start_reload_task();
    let config = config_manager.snapshot();
    info!("📋 collector 启动");
    info!("🌐 监听端口: {}", config.listen_port);
    info!("📡 订阅源数量: {}", config.sub_urls.len());

    // 初始化数据库
    let db = init_sqlite(&config.db_path).await;
    migration::Migrator::up(db, None).await?;
    info!("✅ 数据库初始化完成");

    let http = reqwest::Client::new();
    let notifier = notify::build_notifier(&config, http.clone());

    let app_state = AppState {
        config_manager: config_manager.clone(),
        notifier: notifier.clone(),
    };

    // 启动 Web 服务
    api::start_web_server(app_state.clone());

    // 启动回填：重启当天也要有对账基线
    if config.startup_backfill && !config.sub_urls.is_empty() {
        let db = get_connection().await;
        if let Err(e) = reconcile::update_snapshots(db, &http, &config).await {
            tracing::error!("启动回填失败: {:#}", e);
        }
    }

    // 启动每日对账任务
    reconcile::start_daily_report_task(config_manager.clone(), http, notifier);

    // 等待终止信号
    info!("✅ 所有服务已启动，等待终止信号...");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("收到 Ctrl+C 信号，正在关闭服务...");
        }
        _ = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate()).expect("failed to listen for SIGTERM");
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("收到 SIGTERM 信号，正在关闭服务...");
        }
    }

    Ok(())
}
