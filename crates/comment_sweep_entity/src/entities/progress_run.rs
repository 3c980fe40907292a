//! 一次批量任务的进度概要，每个分组对应一行

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "progress_run")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub name: String,
    pub started_at: DateTimeUtc,
    pub last_updated: DateTimeUtc,
    pub total_videos: i64,
    pub completed_videos: i64,
    pub current_batch: i64,
    pub total_batches: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
