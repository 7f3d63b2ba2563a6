//! 流量上报相关类型
//!
//! 定义了 probe 向 collector 上报增量流量事件的结构体。

use serde::{Deserialize, Serialize};

/// 单条增量流量事件
///
/// 一个采样周期内某个出口节点的增量用量。写入本地日志的每一行
/// 和 `POST /report` 的请求体都是这个结构。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficEvent {
    /// 事件产生时间（epoch 秒）
    pub timestamp: i64,
    /// 上报设备标识
    pub device_id: String,
    /// 出口节点名
    pub node_name: String,
    /// 上传增量（字节）
    pub up_delta: i64,
    /// 下载增量（字节）
    pub down_delta: i64,
    /// 是否为代理流量（由节点名派生）
    pub is_proxy: bool,
}
