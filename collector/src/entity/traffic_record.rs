use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 已持久化的流量事件，写入后不可变
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "traffic_record")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub timestamp: DateTime,
    pub device_id: String,
    pub node_name: String,
    pub up_delta: i64,
    pub down_delta: i64,
    pub is_proxy: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
