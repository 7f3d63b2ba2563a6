use sea_orm_migration::prelude::*;
use sea_orm_migration::schema::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建 traffic_record 表
        manager
            .create_table(
                Table::create()
                    .table(TrafficRecord::Table)
                    .if_not_exists()
                    .col(big_integer(TrafficRecord::Id).auto_increment().primary_key())
                    .col(timestamp(TrafficRecord::Timestamp))
                    .col(string(TrafficRecord::DeviceId))
                    .col(string(TrafficRecord::NodeName))
                    .col(big_integer(TrafficRecord::UpDelta).default(0))
                    .col(big_integer(TrafficRecord::DownDelta).default(0))
                    .col(boolean(TrafficRecord::IsProxy).default(false))
                    .to_owned(),
            )
            .await?;

        // 按时间的聚合查询都以当天零点为下界
        manager
            .create_index(
                Index::create()
                    .name("idx_traffic_record_timestamp")
                    .table(TrafficRecord::Table)
                    .col(TrafficRecord::Timestamp)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_traffic_record_device")
                    .table(TrafficRecord::Table)
                    .col(TrafficRecord::DeviceId)
                    .to_owned(),
            )
            .await?;

        // 创建 sub_snapshot 表
        manager
            .create_table(
                Table::create()
                    .table(SubSnapshot::Table)
                    .if_not_exists()
                    .col(big_integer(SubSnapshot::Id).auto_increment().primary_key())
                    .col(string(SubSnapshot::Date))
                    .col(string(SubSnapshot::SubUrl))
                    .col(big_integer(SubSnapshot::Used).default(0))
                    .col(big_integer(SubSnapshot::Total).default(0))
                    .col(big_integer(SubSnapshot::Expire).default(0))
                    .col(timestamp(SubSnapshot::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // 按源查"今天之前最近一次快照"
        manager
            .create_index(
                Index::create()
                    .name("idx_sub_snapshot_url_date")
                    .table(SubSnapshot::Table)
                    .col(SubSnapshot::SubUrl)
                    .col(SubSnapshot::Date)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SubSnapshot::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(TrafficRecord::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum TrafficRecord {
    Table,
    Id,
    Timestamp,
    DeviceId,
    NodeName,
    UpDelta,
    DownDelta,
    IsProxy,
}

#[derive(DeriveIden)]
enum SubSnapshot {
    Table,
    Id,
    Date,
    SubUrl,
    Used,
    Total,
    Expire,
    CreatedAt,
}
