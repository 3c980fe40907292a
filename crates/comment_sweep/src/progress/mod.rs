use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

mod json;
mod sqlite;

pub use json::JsonFileStore;
pub use sqlite::SqliteStore;

use crate::config::{Config, StoreOption};
use crate::error::DispatchOutcome;

/// 一次批量任务的持久化进度，字段名与历史进度文件保持一致
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub started_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub total_videos: usize,
    pub completed_videos: usize,
    pub successful_videos: Vec<String>,
    pub failed_videos: Vec<FailedVideo>,
    pub current_batch: usize,
    pub total_batches: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedVideo {
    pub id: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

// 时间戳统一保留到毫秒，与历史进度文件的格式一致
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

impl ProgressRecord {
    pub fn new(total_videos: usize, batch_size: usize) -> Self {
        let started_at = now();
        Self {
            started_at,
            last_updated: started_at,
            total_videos,
            completed_videos: 0,
            successful_videos: Vec::new(),
            failed_videos: Vec::new(),
            current_batch: 1,
            total_batches: total_videos.div_ceil(batch_size),
        }
    }

    /// 已经得到过结果（无论成功或失败）的视频 id
    pub fn attempted(&self) -> HashSet<&str> {
        self.successful_videos
            .iter()
            .map(String::as_str)
            .chain(self.failed_videos.iter().map(|f| f.id.as_str()))
            .collect()
    }

    /// 按输入顺序返回尚未得到结果的视频，失败过的视频不会被自动重试
    pub fn resolve_remainder(&self, videos: &[String]) -> Vec<String> {
        let attempted = self.attempted();
        videos
            .iter()
            .filter(|id| !attempted.contains(id.as_str()))
            .cloned()
            .collect()
    }

    /// 记录中存在、但不在当前输入中的视频 id，通常意味着进度属于另一个分组
    pub fn outside_input<'a>(&'a self, videos: &[String]) -> Vec<&'a str> {
        let input = videos.iter().map(String::as_str).collect::<HashSet<_>>();
        self.successful_videos
            .iter()
            .map(String::as_str)
            .chain(self.failed_videos.iter().map(|f| f.id.as_str()))
            .filter(|id| !input.contains(id))
            .collect()
    }

    pub fn record(&mut self, video_id: &str, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Succeeded => self.successful_videos.push(video_id.to_owned()),
            DispatchOutcome::Failed(error) => self.failed_videos.push(FailedVideo {
                id: video_id.to_owned(),
                error,
                timestamp: now(),
            }),
        }
        self.completed_videos += 1;
    }

    /// 丢弃所有失败记录，使这些视频重新变为待处理状态，返回丢弃的记录数
    pub fn reset_failed(&mut self) -> usize {
        let count = self.failed_videos.len();
        self.failed_videos.clear();
        self.completed_videos = self.successful_videos.len();
        count
    }

    pub fn touch(&mut self) {
        self.last_updated = now();
    }

    pub fn completion_percentage(&self) -> f64 {
        if self.total_videos == 0 {
            return 100.0;
        }
        self.completed_videos as f64 / self.total_videos as f64 * 100.0
    }

    /// 恢复运行时 current_batch 会继续累加并超过 total_batches，展示时截断
    pub fn displayed_batch(&self) -> usize {
        self.current_batch.min(self.total_batches)
    }

    pub fn log_summary(&self) {
        info!(
            "共 {} 个视频，已完成 {} 个（{:.1}%），成功 {} 个，失败 {} 个，批次 {}/{}，开始于 {}，最后更新于 {}",
            self.total_videos,
            self.completed_videos,
            self.completion_percentage(),
            self.successful_videos.len(),
            self.failed_videos.len(),
            self.displayed_batch(),
            self.total_batches,
            self.started_at.to_rfc3339(),
            self.last_updated.to_rfc3339(),
        );
        self.log_failures();
    }

    pub fn log_failures(&self) {
        if self.failed_videos.is_empty() {
            return;
        }
        warn!("处理失败的视频：");
        for failed in &self.failed_videos {
            warn!("- {}（{}）：{}", failed.id, failed.timestamp.to_rfc3339(), failed.error);
        }
    }
}

/// 进度的持久化接口，同一时刻只允许一个写入者
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn load(&self) -> Result<Option<ProgressRecord>>;

    async fn save(&self, record: &ProgressRecord) -> Result<()>;
}

/// 读取当前进度用于展示，不存在进度时报错
pub async fn load_status(store: &dyn ProgressStore) -> Result<ProgressRecord> {
    match store.load().await? {
        Some(progress) => Ok(progress),
        None => bail!("尚未找到任何进度记录"),
    }
}

pub async fn open_store(option: &StoreOption, config_dir: &Path, group: &str) -> Result<Arc<dyn ProgressStore>> {
    let path = Config::resolve_path(config_dir, option.path());
    Ok(match option {
        StoreOption::Json { .. } => {
            info!("使用 json 文件 {} 保存分组 {} 的进度", path.display(), group);
            Arc::new(JsonFileStore::new(path, group))
        }
        StoreOption::Sqlite { .. } => {
            info!("使用 sqlite 数据库 {} 保存分组 {} 的进度", path.display(), group);
            Arc::new(SqliteStore::open(&path, group).await?)
        }
    })
}
