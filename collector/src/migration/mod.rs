use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::prelude::*;
use std::fs::create_dir_all;
use std::{fs, path};
use tokio::sync::OnceCell;

mod m20260110_000001_init;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20260110_000001_init::Migration)]
    }
}

static DATABASE_CONNECTION: OnceCell<DatabaseConnection> = OnceCell::const_new();

/// 初始化全局数据库连接（进程内只生效一次）
pub async fn init_sqlite(db_path: &str) -> &'static DatabaseConnection {
    DATABASE_CONNECTION
        .get_or_init(|| async {
            let path = path::Path::new(db_path);
            if !path.exists() {
                if let Some(parent) = path.parent() {
                    create_dir_all(parent).expect("failed to create database directory");
                }
                fs::write(path, "").expect("failed to create database file");
            }
            Database::connect(format!("sqlite://{}", db_path))
                .await
                .expect("failed to connect sqlite")
        })
        .await
}

/// 取全局数据库连接（必须先调用 `init_sqlite`）
pub async fn get_connection() -> &'static DatabaseConnection {
    DATABASE_CONNECTION
        .get()
        .expect("database connection not initialized")
}
