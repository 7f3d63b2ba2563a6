//! 服务端配置模块
//!
//! 与 probe 侧相同的快照分发模型：配置是不可变的 `Arc<Config>`，
//! 通过 watch 通道下发，后台任务轮询文件修改时间做热更新。上报
//! 处理、统计查询和对账任务各自在操作开始时取一次快照。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tracing::{error, info};

/// 服务端运行时配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Web 监听端口
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// 上报凭证（`POST /report` 的 Bearer token）
    #[serde(default = "default_report_token")]
    pub report_token: String,

    /// 仪表板登录用户名（为空时禁用 `/api/auth`）
    #[serde(default)]
    pub dashboard_user: String,

    /// 数据库路径
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// 订阅源 URL 列表
    #[serde(default)]
    pub sub_urls: Vec<String>,

    /// 日报触发时刻（UTC 小时）
    #[serde(default = "default_report_hour")]
    pub report_hour: u32,

    /// 日报触发时刻（分钟）
    #[serde(default = "default_report_minute")]
    pub report_minute: u32,

    /// 泄露判定的绝对阈值（字节）
    #[serde(default = "default_leak_floor_bytes")]
    pub leak_floor_bytes: i64,

    /// 泄露判定的相对阈值（相对本地代理总量的比例）
    #[serde(default = "default_leak_ratio")]
    pub leak_ratio: f64,

    /// 启动时是否立即回填一次今日订阅快照
    #[serde(default = "default_startup_backfill")]
    pub startup_backfill: bool,

    /// 通知 webhook 地址（为空时降级为日志通知）
    #[serde(default)]
    pub webhook_url: String,
}

fn default_listen_port() -> u16 {
    8686
}

fn default_report_token() -> String {
    "YourSecretToken".to_string()
}

fn default_db_path() -> String {
    "./data/flowstat.db".to_string()
}

fn default_report_hour() -> u32 {
    23
}

fn default_report_minute() -> u32 {
    55
}

fn default_leak_floor_bytes() -> i64 {
    100 * 1024 * 1024
}

fn default_leak_ratio() -> f64 {
    0.2
}

fn default_startup_backfill() -> bool {
    true
}

impl Config {
    /// 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = fs::read_to_string(path_ref)
            .with_context(|| format!("无法读取配置文件: {}", path_ref.display()))?;

        let mut config: Config =
            toml::from_str(&content).with_context(|| "解析配置文件失败")?;

        // 非法的触发时刻回落到默认值
        if config.report_hour > 23 || config.report_minute > 59 {
            config.report_hour = default_report_hour();
            config.report_minute = default_report_minute();
        }

        Ok(config)
    }
}

/// 配置管理器（watch 通道的唯一写入方）
pub struct ConfigManager {
    path: PathBuf,
    tx: watch::Sender<Arc<Config>>,
}

impl ConfigManager {
    /// 加载初始配置并建立分发通道
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Arc<Self>> {
        let path = path.as_ref().to_path_buf();
        let config = Config::from_file(&path)?;
        let (tx, _rx) = watch::channel(Arc::new(config));
        Ok(Arc::new(Self { path, tx }))
    }

    /// 取当前配置快照
    pub fn snapshot(&self) -> Arc<Config> {
        self.tx.borrow().clone()
    }

    /// 启动配置热更新后台任务
    pub fn start_reload_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut last_modified = manager.modified_time();
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;

                let modified = manager.modified_time();
                if modified.is_some() && modified != last_modified {
                    last_modified = modified;
                    match Config::from_file(&manager.path) {
                        Ok(config) => {
                            manager.tx.send_replace(Arc::new(config));
                            info!("配置文件已重新加载: {}", manager.path.display());
                        }
                        Err(e) => {
                            error!("配置文件重新加载失败: {:#}", e);
                        }
                    }
                }
            }
        })
    }

    fn modified_time(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.listen_port, 8686);
        assert_eq!(config.leak_floor_bytes, 100 * 1024 * 1024);
        assert!((config.leak_ratio - 0.2).abs() < f64::EPSILON);
        assert_eq!((config.report_hour, config.report_minute), (23, 55));
        assert!(config.sub_urls.is_empty());
    }

    #[test]
    fn parses_subscription_sources() {
        let content = r#"
report_token = "tok"
sub_urls = [
    "https://air1.example.com/sub?token=a",
    "https://air2.example.com/sub?token=b",
]
"#;
        let config: Config = toml::from_str(content).unwrap();
        assert_eq!(config.sub_urls.len(), 2);
        assert_eq!(config.report_token, "tok");
    }

    #[test]
    fn invalid_report_time_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(file, "report_hour = 99").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!((config.report_hour, config.report_minute), (23, 55));
    }
}
