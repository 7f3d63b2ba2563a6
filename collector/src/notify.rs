//! 日报与泄漏告警的通知出口

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, body: &str) -> Result<()>;
}

/// 默认出口：写结构化日志
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<()> {
        tracing::info!(subject = subject, "{}", body);
        Ok(())
    }
}

/// Webhook 出口：把通知 POST 到配置的地址
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(http: reqwest::Client, url: String) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<()> {
        // 有界超时，挂死的 webhook 端点不能拖住日报任务
        let resp = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({
                "subject": subject,
                "body": body,
            }))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .context("推送 webhook 失败")?;
        if !resp.status().is_success() {
            anyhow::bail!("webhook 返回异常状态码: {}", resp.status());
        }
        Ok(())
    }
}

/// 按配置选择通知出口，未配置 webhook 时回落到日志
pub fn build_notifier(config: &Config, http: reqwest::Client) -> Arc<dyn Notifier> {
    if config.webhook_url.is_empty() {
        Arc::new(LogNotifier)
    } else {
        Arc::new(WebhookNotifier::new(http, config.webhook_url.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        let notifier = LogNotifier;
        assert!(notifier.notify("主题", "正文").await.is_ok());
    }

    #[tokio::test]
    async fn webhook_to_stalled_endpoint_fails_in_bounded_time() {
        // 只接受连接、从不响应的端点
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let notifier = WebhookNotifier::new(
            reqwest::Client::new(),
            format!("http://{}/hook", addr),
        );

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(20),
            notifier.notify("主题", "正文"),
        )
        .await;
        // 在外层超时之前就以错误返回，不会无限等待
        assert!(result.expect("notify 未在限定时间内返回").is_err());

        server.abort();
    }
}
