//! 出口节点归属与分类
//!
//! 节点名取自连接代理链的最后一跳；空链归属到保留的直连节点。
//! 直连节点和透明改写（ua3f）节点不计为代理流量，其余节点均计为代理。

/// 空代理链使用的保留节点名
pub const DIRECT_NODE: &str = "DIRECT";

/// 透明改写通道的节点名（按直连处理）
pub const PASSTHROUGH_NODE: &str = "ua3f";

/// 从代理链推导出口节点名
pub fn node_from_chains(chains: &[String]) -> &str {
    chains.last().map(String::as_str).unwrap_or(DIRECT_NODE)
}

/// 节点是否计为代理流量（大小写不敏感）
pub fn is_proxy_node(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower != "direct" && lower != PASSTHROUGH_NODE
}
