use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 某订阅源某天的上游用量快照，每源每天一条，写入后不再修改
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sub_snapshot")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// 快照日期（`%Y-%m-%d`）
    pub date: String,
    pub sub_url: String,
    /// 上游已用字节数（上传+下载）
    pub used: i64,
    /// 套餐总量（字节）
    pub total: i64,
    /// 套餐到期时间（epoch 秒）
    pub expire: i64,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
