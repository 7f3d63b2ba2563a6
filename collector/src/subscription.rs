//! 订阅源上游用量抓取
//!
//! 以 Clash UA 请求订阅地址，从 `Subscription-Userinfo` 响应头里解析
//! 上游计费口径的已用量、套餐总量与到期时间。

use anyhow::{bail, Context, Result};
use std::time::Duration;

/// 上游用量。upload/download 单独保留，used 为两者之和。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubscriptionUsage {
    pub upload: i64,
    pub download: i64,
    pub total: i64,
    pub expire: i64,
}

impl SubscriptionUsage {
    pub fn used(&self) -> i64 {
        self.upload + self.download
    }

    pub fn remaining(&self) -> i64 {
        (self.total - self.used()).max(0)
    }
}

/// 解析 `Subscription-Userinfo` 头
///
/// 格式形如 `upload=123; download=456; total=789; expire=1700000000`。
/// 缺失或无法解析的字段按 0 处理；total / expire 解析成功但为负值
/// 说明上游数据已不可信，整条拒绝。
pub fn parse_userinfo(header: &str) -> Result<SubscriptionUsage> {
    let mut usage = SubscriptionUsage::default();

    for part in header.split(';') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let value: i64 = match value.trim().parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        match key.trim() {
            "upload" => usage.upload = value,
            "download" => usage.download = value,
            "total" => {
                if value < 0 {
                    bail!("订阅用量头 total 为负值: {}", value);
                }
                usage.total = value;
            }
            "expire" => {
                if value < 0 {
                    bail!("订阅用量头 expire 为负值: {}", value);
                }
                usage.expire = value;
            }
            _ => {}
        }
    }

    // 个别机场会返回负的方向计数，保留原值但记录下来
    if usage.upload < 0 || usage.download < 0 {
        tracing::warn!(
            upload = usage.upload,
            download = usage.download,
            "订阅用量头方向计数为负值"
        );
    }

    Ok(usage)
}

/// 请求订阅地址并解析上游用量
pub async fn fetch_subscription(
    http: &reqwest::Client,
    sub_url: &str,
) -> Result<SubscriptionUsage> {
    let resp = http
        .get(sub_url)
        .header(reqwest::header::USER_AGENT, "Clash/1.0")
        .timeout(Duration::from_secs(10))
        .send()
        .await
        .context("请求订阅地址失败")?;

    if resp.status() != reqwest::StatusCode::OK {
        bail!("订阅地址返回异常状态码: {}", resp.status());
    }

    let header = resp
        .headers()
        .get("Subscription-Userinfo")
        .and_then(|v| v.to_str().ok())
        .context("响应缺少 Subscription-Userinfo 头")?;

    parse_userinfo(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_complete_header() {
        let usage =
            parse_userinfo("upload=100; download=200; total=1000; expire=1700000000").unwrap();
        assert_eq!(usage.upload, 100);
        assert_eq!(usage.download, 200);
        assert_eq!(usage.used(), 300);
        assert_eq!(usage.total, 1000);
        assert_eq!(usage.expire, 1_700_000_000);
        assert_eq!(usage.remaining(), 700);
    }

    #[test]
    fn missing_and_garbled_fields_default_to_zero() {
        let usage = parse_userinfo("upload=abc; download=200; foo; bar=1").unwrap();
        assert_eq!(usage.upload, 0);
        assert_eq!(usage.download, 200);
        assert_eq!(usage.total, 0);
        assert_eq!(usage.expire, 0);
    }

    #[test]
    fn negative_total_is_rejected() {
        assert!(parse_userinfo("upload=1; download=2; total=-1").is_err());
    }

    #[test]
    fn negative_expire_is_rejected() {
        assert!(parse_userinfo("total=100; expire=-5").is_err());
    }

    #[test]
    fn negative_direction_counters_are_kept() {
        let usage = parse_userinfo("upload=-10; download=20; total=100").unwrap();
        assert_eq!(usage.upload, -10);
        assert_eq!(usage.used(), 10);
    }

    #[test]
    fn used_exceeding_total_clamps_remaining() {
        let usage = parse_userinfo("upload=600; download=600; total=1000").unwrap();
        assert_eq!(usage.remaining(), 0);
    }
}
