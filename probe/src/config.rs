//! 客户端配置模块
//!
//! 配置以不可变快照（`Arc<Config>`）的形式通过 watch 通道分发：
//! 每个操作在开始时取一次快照并一直使用它，热更新只影响下一个采样
//! 周期使用的地址和凭证，不会修改连接跟踪状态。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tracing::{error, info};

/// 客户端运行时配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// 本地代理接口地址
    #[serde(default = "default_agent_addr")]
    pub agent_addr: String,

    /// 本地代理接口凭证
    #[serde(default)]
    pub agent_secret: String,

    /// collector 上报地址（`/report` 端点的完整 URL）
    #[serde(default)]
    pub collector_url: String,

    /// 上报凭证
    #[serde(default = "default_report_token")]
    pub report_token: String,

    /// 设备标识
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// 本地事件日志路径（每行一个 JSON 事件）
    #[serde(default = "default_local_log_file")]
    pub local_log_file: String,

    /// 采样间隔（秒）
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_agent_addr() -> String {
    "http://127.0.0.1:9097".to_string()
}

fn default_report_token() -> String {
    "YourSecretToken".to_string()
}

fn default_device_id() -> String {
    "unknown-device".to_string()
}

fn default_local_log_file() -> String {
    "./data/traffic_events.jsonl".to_string()
}

fn default_interval_secs() -> u64 {
    10
}

impl Config {
    /// 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = fs::read_to_string(path_ref)
            .with_context(|| format!("无法读取配置文件: {}", path_ref.display()))?;

        toml::from_str(&content).with_context(|| "解析配置文件失败")
    }
}

/// 配置管理器
///
/// 持有 watch 发送端作为唯一写入方；后台任务轮询文件修改时间，
/// 变化时重新加载并发布新快照。
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

    /// 启动配置热更新后台任务（轮询文件修改时间）
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
                            // 保留旧快照，坏配置不会下发
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
    use std::io::Write;

    #[test]
    fn parses_full_config() {
        let content = r#"
agent_addr = "http://127.0.0.1:9090"
agent_secret = "s3cret"
collector_url = "https://collector.example.com/report"
report_token = "tok"
device_id = "PC-Windows"
local_log_file = "/tmp/events.jsonl"
interval_secs = 30
"#;
        let config: Config = toml::from_str(content).unwrap();
        assert_eq!(config.agent_addr, "http://127.0.0.1:9090");
        assert_eq!(config.device_id, "PC-Windows");
        assert_eq!(config.interval_secs, 30);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.agent_addr, "http://127.0.0.1:9097");
        assert_eq!(config.interval_secs, 10);
        assert!(config.collector_url.is_empty());
    }

    #[test]
    fn manager_serves_snapshots() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "device_id = \"test-device\"").unwrap();

        let manager = ConfigManager::load(file.path()).unwrap();
        let snapshot = manager.snapshot();
        assert_eq!(snapshot.device_id, "test-device");
    }
}
