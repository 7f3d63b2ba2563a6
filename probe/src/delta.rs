//! 连接快照差分
//!
//! 维护每条连接上一次采样的累计计数器，把代理接口返回的累计值
//! 转换为本周期的增量，并按出口节点聚合。跟踪表只由采样任务持有，
//! 不存在并发写入。

use std::collections::{HashMap, HashSet};

use common::node::node_from_chains;
use common::protocol::agent::Connection;

/// 一条连接最近一次观测到的累计计数器
#[derive(Debug, Clone, Copy)]
struct CounterBaseline {
    upload: i64,
    download: i64,
}

/// 一个采样周期内某节点的增量聚合
#[derive(Debug, Clone, PartialEq)]
pub struct NodeAggregate {
    pub node_name: String,
    pub up_delta: i64,
    pub down_delta: i64,
}

/// 连接差分跟踪器
pub struct DeltaTracker {
    baselines: HashMap<String, CounterBaseline>,
    primed: bool,
}

impl DeltaTracker {
    pub fn new() -> Self {
        Self {
            baselines: HashMap::new(),
            primed: false,
        }
    }

    /// 处理一次采样，返回本周期各节点的非零增量聚合
    ///
    /// 规则：
    /// - 首次出现的连接以完整累计值作为增量；
    /// - 已知连接取与上次基线的差；计数器回退（新值更小）时增量
    ///   按 0 计，但新累计值仍然成为下一周期的基线；
    /// - 采样中不再出现的连接 id 从跟踪表移除，不补发收尾事件；
    /// - 进程启动后的第一次采样是静默的基线建立，不产生任何聚合。
    pub fn tick(&mut self, sample: &[Connection]) -> Vec<NodeAggregate> {
        let mut per_node: HashMap<String, (i64, i64)> = HashMap::new();
        let mut current_ids: HashSet<&str> = HashSet::with_capacity(sample.len());

        for conn in sample {
            current_ids.insert(conn.id.as_str());

            let (up_delta, down_delta) = match self.baselines.get(&conn.id) {
                Some(prev) => (
                    (conn.upload - prev.upload).max(0),
                    (conn.download - prev.download).max(0),
                ),
                None => (conn.upload, conn.download),
            };

            let node_name = node_from_chains(&conn.chains);
            let entry = per_node.entry(node_name.to_string()).or_insert((0, 0));
            entry.0 += up_delta;
            entry.1 += down_delta;

            self.baselines.insert(
                conn.id.clone(),
                CounterBaseline {
                    upload: conn.upload,
                    download: conn.download,
                },
            );
        }

        // 清理已断开的连接
        self.baselines.retain(|id, _| current_ids.contains(id.as_str()));

        if !self.primed {
            self.primed = true;
            return Vec::new();
        }

        let mut aggregates: Vec<NodeAggregate> = per_node
            .into_iter()
            .filter(|(_, (up, down))| *up > 0 || *down > 0)
            .map(|(node_name, (up_delta, down_delta))| NodeAggregate {
                node_name,
                up_delta,
                down_delta,
            })
            .collect();
        aggregates.sort_by(|a, b| a.node_name.cmp(&b.node_name));
        aggregates
    }

    /// 当前跟踪的连接数
    pub fn tracked(&self) -> usize {
        self.baselines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(id: &str, upload: i64, download: i64, chains: &[&str]) -> Connection {
        Connection {
            id: id.to_string(),
            upload,
            download,
            chains: chains.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn priming_tick_emits_nothing() {
        let mut tracker = DeltaTracker::new();
        let aggregates = tracker.tick(&[conn("c1", 1000, 2000, &["nodeX"])]);
        assert!(aggregates.is_empty());
        assert_eq!(tracker.tracked(), 1);
    }

    #[test]
    fn second_tick_emits_increment_since_baseline() {
        let mut tracker = DeltaTracker::new();
        tracker.tick(&[conn("c1", 1000, 2000, &["nodeX"])]);

        let aggregates = tracker.tick(&[conn("c1", 1500, 2500, &["nodeX"])]);
        assert_eq!(
            aggregates,
            vec![NodeAggregate {
                node_name: "nodeX".to_string(),
                up_delta: 500,
                down_delta: 500,
            }]
        );
    }

    #[test]
    fn unchanged_counters_emit_nothing() {
        let mut tracker = DeltaTracker::new();
        tracker.tick(&[conn("c1", 1000, 2000, &["nodeX"])]);
        tracker.tick(&[conn("c1", 1500, 2500, &["nodeX"])]);

        let aggregates = tracker.tick(&[conn("c1", 1500, 2500, &["nodeX"])]);
        assert!(aggregates.is_empty());
    }

    #[test]
    fn first_seen_connection_reports_full_cumulative() {
        let mut tracker = DeltaTracker::new();
        tracker.tick(&[]);

        let aggregates = tracker.tick(&[conn("c2", 300, 400, &["HK-01"])]);
        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].up_delta, 300);
        assert_eq!(aggregates[0].down_delta, 400);
    }

    #[test]
    fn closed_connection_is_dropped_without_event() {
        let mut tracker = DeltaTracker::new();
        tracker.tick(&[conn("c1", 1000, 2000, &["nodeX"])]);

        let aggregates = tracker.tick(&[]);
        assert!(aggregates.is_empty());
        assert_eq!(tracker.tracked(), 0);
    }

    #[test]
    fn counter_reset_clamps_to_zero_and_rebaselines() {
        let mut tracker = DeltaTracker::new();
        tracker.tick(&[conn("c1", 5000, 9000, &["nodeX"])]);

        // 计数器回退：增量按 0 计
        let aggregates = tracker.tick(&[conn("c1", 100, 200, &["nodeX"])]);
        assert!(aggregates.is_empty());

        // 新累计值已成为基线
        let aggregates = tracker.tick(&[conn("c1", 150, 260, &["nodeX"])]);
        assert_eq!(aggregates[0].up_delta, 50);
        assert_eq!(aggregates[0].down_delta, 60);
    }

    #[test]
    fn deltas_are_per_connection_and_summed_per_node() {
        let mut tracker = DeltaTracker::new();
        tracker.tick(&[
            conn("c1", 100, 100, &["nodeX"]),
            conn("c2", 200, 200, &["nodeX"]),
            conn("c3", 50, 50, &["nodeY"]),
        ]);

        let aggregates = tracker.tick(&[
            conn("c1", 110, 130, &["nodeX"]),
            conn("c2", 250, 200, &["nodeX"]),
            conn("c3", 60, 55, &["nodeY"]),
        ]);

        // 节点内按连接各自的基线求差后求和（守恒）
        assert_eq!(aggregates.len(), 2);
        let x = aggregates.iter().find(|a| a.node_name == "nodeX").unwrap();
        assert_eq!((x.up_delta, x.down_delta), (10 + 50, 30 + 0));
        let y = aggregates.iter().find(|a| a.node_name == "nodeY").unwrap();
        assert_eq!((y.up_delta, y.down_delta), (10, 5));
    }

    #[test]
    fn empty_chain_is_attributed_to_direct() {
        let mut tracker = DeltaTracker::new();
        tracker.tick(&[conn("c1", 0, 0, &[])]);

        let aggregates = tracker.tick(&[conn("c1", 10, 20, &[])]);
        assert_eq!(aggregates[0].node_name, "DIRECT");
    }

    #[test]
    fn tick_sums_are_conserved_across_nodes() {
        let mut tracker = DeltaTracker::new();
        tracker.tick(&[
            conn("a", 0, 0, &["n1"]),
            conn("b", 0, 0, &["n2"]),
            conn("c", 0, 0, &[]),
        ]);

        let sample = [
            conn("a", 11, 7, &["n1"]),
            conn("b", 23, 5, &["n2"]),
            conn("c", 3, 9, &[]),
        ];
        let aggregates = tracker.tick(&sample);

        let up_sum: i64 = aggregates.iter().map(|a| a.up_delta).sum();
        let down_sum: i64 = aggregates.iter().map(|a| a.down_delta).sum();
        assert_eq!(up_sum, 11 + 23 + 3);
        assert_eq!(down_sum, 7 + 5 + 9);
    }
}
