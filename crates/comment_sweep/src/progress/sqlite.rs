use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use comment_sweep_entity::{progress_failure, progress_run, progress_success};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};

use crate::database::{database_connection, migrate_database};
use crate::progress::{FailedVideo, ProgressRecord, ProgressStore};

/// 以 sqlite 保存进度，同一个数据库中可以保存多个分组的进度
pub struct SqliteStore {
    connection: DatabaseConnection,
    name: String,
}

impl SqliteStore {
    pub async fn open(path: &Path, name: &str) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let connection = database_connection(path).await?;
        migrate_database(&connection).await?;
        Ok(Self {
            connection,
            name: name.to_owned(),
        })
    }
}

#[async_trait]
impl ProgressStore for SqliteStore {
    async fn load(&self) -> Result<Option<ProgressRecord>> {
        let Some(run) = progress_run::Entity::find()
            .filter(progress_run::Column::Name.eq(self.name.as_str()))
            .one(&self.connection)
            .await?
        else {
            return Ok(None);
        };
        let successful_videos = progress_success::Entity::find()
            .filter(progress_success::Column::RunId.eq(run.id))
            .order_by_asc(progress_success::Column::Id)
            .all(&self.connection)
            .await?
            .into_iter()
            .map(|model| model.video_id)
            .collect();
        let failed_videos = progress_failure::Entity::find()
            .filter(progress_failure::Column::RunId.eq(run.id))
            .order_by_asc(progress_failure::Column::Id)
            .all(&self.connection)
            .await?
            .into_iter()
            .map(|model| FailedVideo {
                id: model.video_id,
                error: model.error,
                timestamp: model.failed_at,
            })
            .collect();
        Ok(Some(ProgressRecord {
            started_at: run.started_at,
            last_updated: run.last_updated,
            total_videos: run.total_videos as usize,
            completed_videos: run.completed_videos as usize,
            successful_videos,
            failed_videos,
            current_batch: run.current_batch as usize,
            total_batches: run.total_batches as usize,
        }))
    }

    /// 在一个事务中整体替换该分组的进度，不会出现只写入一半的情况
    async fn save(&self, record: &ProgressRecord) -> Result<()> {
        let txn = self.connection.begin().await?;
        let existing = progress_run::Entity::find()
            .filter(progress_run::Column::Name.eq(self.name.as_str()))
            .one(&txn)
            .await?;
        let run_id = match existing {
            Some(run) => {
                let run_id = run.id;
                let mut active_model: progress_run::ActiveModel = run.into();
                active_model.started_at = Set(record.started_at);
                active_model.last_updated = Set(record.last_updated);
                active_model.total_videos = Set(record.total_videos as i64);
                active_model.completed_videos = Set(record.completed_videos as i64);
                active_model.current_batch = Set(record.current_batch as i64);
                active_model.total_batches = Set(record.total_batches as i64);
                active_model.update(&txn).await?;
                run_id
            }
            None => {
                progress_run::ActiveModel {
                    id: NotSet,
                    name: Set(self.name.clone()),
                    started_at: Set(record.started_at),
                    last_updated: Set(record.last_updated),
                    total_videos: Set(record.total_videos as i64),
                    completed_videos: Set(record.completed_videos as i64),
                    current_batch: Set(record.current_batch as i64),
                    total_batches: Set(record.total_batches as i64),
                }
                .insert(&txn)
                .await?
                .id
            }
        };
        progress_success::Entity::delete_many()
            .filter(progress_success::Column::RunId.eq(run_id))
            .exec(&txn)
            .await?;
        progress_failure::Entity::delete_many()
            .filter(progress_failure::Column::RunId.eq(run_id))
            .exec(&txn)
            .await?;
        for chunk in record.successful_videos.chunks(500) {
            progress_success::Entity::insert_many(chunk.iter().map(|video_id| progress_success::ActiveModel {
                id: NotSet,
                run_id: Set(run_id),
                video_id: Set(video_id.clone()),
            }))
            .exec(&txn)
            .await?;
        }
        for chunk in record.failed_videos.chunks(500) {
            progress_failure::Entity::insert_many(chunk.iter().map(|failed| progress_failure::ActiveModel {
                id: NotSet,
                run_id: Set(run_id),
                video_id: Set(failed.id.clone()),
                error: Set(failed.error.clone()),
                failed_at: Set(failed.timestamp),
            }))
            .exec(&txn)
            .await?;
        }
        txn.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::error::DispatchOutcome;

    fn temp_database() -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("comment-sweep-{}", uuid::Uuid::new_v4()));
        (dir.join("progress.sqlite"), dir)
    }

    #[tokio::test]
    async fn test_sqlite_store() {
        let (path, dir) = temp_database();
        let store = SqliteStore::open(&path, "tech").await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        let mut record = ProgressRecord::new(4, 2);
        store.save(&record).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(record.clone()));
        record.record("b", DispatchOutcome::Succeeded);
        record.record("a", DispatchOutcome::Succeeded);
        record.record("c", DispatchOutcome::Failed("status 500".to_owned()));
        record.current_batch += 1;
        record.touch();
        store.save(&record).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, record);
        // 插入顺序需要被保留
        assert_eq!(loaded.successful_videos, vec!["b", "a"]);
        // 清空失败记录后再次保存，旧的失败记录不应残留
        record.reset_failed();
        store.save(&record).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(record));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_sqlite_store_groups_are_isolated() {
        let (path, dir) = temp_database();
        let tech = SqliteStore::open(&path, "tech").await.unwrap();
        let mut record = ProgressRecord::new(2, 10);
        record.record("a", DispatchOutcome::Succeeded);
        tech.save(&record).await.unwrap();
        drop(tech);
        let music = SqliteStore::open(&path, "music").await.unwrap();
        assert!(music.load().await.unwrap().is_none());
        music.save(&ProgressRecord::new(5, 10)).await.unwrap();
        drop(music);
        let tech = SqliteStore::open(&path, "tech").await.unwrap();
        assert_eq!(tech.load().await.unwrap(), Some(record));
        std::fs::remove_dir_all(dir).unwrap();
    }
}
