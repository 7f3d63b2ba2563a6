//! 流量事件入库
//!
//! 每个上报事件落为一条不可变记录；不做去重，重复投递会产生
//! 重复记录（probe 端不重试，重复只可能来自客户端缺陷）。

use anyhow::Result;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, NotSet, Set};

use common::protocol::report::TrafficEvent;

use crate::entity::traffic_record;

/// 把一个上报事件持久化为 TrafficRecord
pub async fn persist_event(
    db: &DatabaseConnection,
    event: &TrafficEvent,
) -> Result<traffic_record::Model> {
    // 非法 epoch 秒回落到服务器时间
    let timestamp = chrono::DateTime::from_timestamp(event.timestamp, 0)
        .map(|t| t.naive_utc())
        .unwrap_or_else(|| Utc::now().naive_utc());

    let record = traffic_record::ActiveModel {
        id: NotSet,
        timestamp: Set(timestamp),
        device_id: Set(event.device_id.clone()),
        node_name: Set(event.node_name.clone()),
        up_delta: Set(event.up_delta),
        down_delta: Set(event.down_delta),
        is_proxy: Set(event.is_proxy),
    };

    Ok(record.insert(db).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::Migrator;
    use sea_orm::{Database, EntityTrait};
    use sea_orm_migration::MigratorTrait;

    async fn memory_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        db
    }

    #[tokio::test]
    async fn persists_event_with_converted_timestamp() {
        let db = memory_db().await;

        let event = TrafficEvent {
            timestamp: 1_700_000_000,
            device_id: "dev-1".to_string(),
            node_name: "nodeX".to_string(),
            up_delta: 500,
            down_delta: 500,
            is_proxy: true,
        };

        let record = persist_event(&db, &event).await.unwrap();
        assert!(record.id > 0);
        assert_eq!(record.node_name, "nodeX");
        assert_eq!(
            record.timestamp,
            chrono::DateTime::from_timestamp(1_700_000_000, 0)
                .unwrap()
                .naive_utc()
        );

        let all = crate::entity::TrafficRecord::find().all(&db).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_events_produce_two_records() {
        let db = memory_db().await;

        let event = TrafficEvent {
            timestamp: 1_700_000_000,
            device_id: "dev-1".to_string(),
            node_name: "nodeX".to_string(),
            up_delta: 1,
            down_delta: 2,
            is_proxy: true,
        };

        let first = persist_event(&db, &event).await.unwrap();
        let second = persist_event(&db, &event).await.unwrap();
        assert_ne!(first.id, second.id);
    }
}
