use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use comment_sweep_migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

fn database_url(path: &Path) -> String {
    format!("sqlite://{}?mode=rwc", path.to_string_lossy())
}

/// 进度只有一个写入者，使用单连接即可，同时避免 sqlite 的写锁竞争
pub async fn database_connection(path: &Path) -> Result<DatabaseConnection> {
    let mut option = ConnectOptions::new(database_url(path));
    option
        .max_connections(1)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(90))
        .sqlx_logging(false);
    Ok(Database::connect(option).await?)
}

pub async fn migrate_database(connection: &DatabaseConnection) -> Result<()> {
    Ok(Migrator::up(connection, None).await?)
}
