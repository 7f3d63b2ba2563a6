//! 本地代理接口（`GET /connections`）的响应类型

use serde::{Deserialize, Serialize};

/// 单条活跃连接及其累计计数器
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    /// 连接唯一标识（同一次采样内不重复）
    pub id: String,
    /// 累计上传字节数
    pub upload: i64,
    /// 累计下载字节数
    pub download: i64,
    /// 代理链（尾部元素为出口节点，空链表示直连）
    #[serde(default)]
    pub chains: Vec<String>,
}

/// `GET /connections` 响应体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionsResponse {
    pub connections: Vec<Connection>,
}
