use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProgressError;
use crate::progress::{ProgressRecord, ProgressStore};

#[derive(Serialize)]
struct Document<'a> {
    group: &'a str,
    #[serde(flatten)]
    record: &'a ProgressRecord,
}

// 早期的进度文件中没有 group 字段
#[derive(Deserialize)]
struct StoredDocument {
    #[serde(default)]
    group: Option<String>,
    #[serde(flatten)]
    record: ProgressRecord,
}

/// 以单个 json 文件保存某个分组的进度，写入时先写临时文件再重命名，避免中途崩溃留下不完整的文件
pub struct JsonFileStore {
    path: PathBuf,
    group: String,
}

impl JsonFileStore {
    pub fn new(path: PathBuf, group: &str) -> Self {
        Self {
            path,
            group: group.to_owned(),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut file_name = self.path.file_name().unwrap_or_default().to_os_string();
        file_name.push(".tmp");
        self.path.with_file_name(file_name)
    }
}

#[async_trait]
impl ProgressStore for JsonFileStore {
    async fn load(&self) -> Result<Option<ProgressRecord>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("读取进度文件 {} 失败", self.path.display())),
        };
        let document: StoredDocument = serde_json::from_slice(&bytes)
            .with_context(|| format!("解析进度文件 {} 失败", self.path.display()))?;
        if let Some(stored) = document.group.filter(|g| *g != self.group) {
            bail!(ProgressError::GroupMismatch {
                stored,
                current: self.group.clone(),
            });
        }
        Ok(Some(document.record))
    }

    async fn save(&self, record: &ProgressRecord) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_vec_pretty(&Document {
            group: &self.group,
            record,
        })?;
        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, content)
            .await
            .with_context(|| format!("写入临时进度文件 {} 失败", temp_path.display()))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .with_context(|| format!("写入进度文件 {} 失败", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchOutcome;

    fn temp_store() -> (JsonFileStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!("comment-sweep-{}", uuid::Uuid::new_v4()));
        (JsonFileStore::new(dir.join("progress.json"), "tech"), dir)
    }

    #[tokio::test]
    async fn test_json_store() {
        let (store, dir) = temp_store();
        assert!(store.load().await.unwrap().is_none());
        let mut record = ProgressRecord::new(3, 2);
        store.save(&record).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(record.clone()));
        record.record("a", DispatchOutcome::Succeeded);
        record.record("b", DispatchOutcome::Failed("boom".to_owned()));
        record.current_batch += 1;
        store.save(&record).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(record));
        assert!(!store.temp_path().exists());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_json_store_malformed() {
        let (store, dir) = temp_store();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("progress.json"), "{\"totalVideos\": ").unwrap();
        let err = store.load().await.unwrap_err();
        assert!(err.to_string().starts_with("解析进度文件"));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_json_store_rejects_other_group() {
        let (store, dir) = temp_store();
        store.save(&ProgressRecord::new(3, 2)).await.unwrap();
        let saved: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.join("progress.json")).unwrap()).unwrap();
        assert_eq!(saved["group"], "tech");
        assert_eq!(saved["totalVideos"], 3);
        let music = JsonFileStore::new(dir.join("progress.json"), "music");
        let err = music.load().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProgressError>(),
            Some(ProgressError::GroupMismatch { stored, current }) if stored == "tech" && current == "music"
        ));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_json_store_reads_untagged_document() {
        let (store, dir) = temp_store();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("progress.json"),
            r#"{
                "startedAt": "2024-05-01T08:00:00.000Z",
                "lastUpdated": "2024-05-01T08:05:12.345Z",
                "totalVideos": 2,
                "completedVideos": 1,
                "successfulVideos": ["a"],
                "failedVideos": [],
                "currentBatch": 2,
                "totalBatches": 1
            }"#,
        )
        .unwrap();
        let record = store.load().await.unwrap().unwrap();
        assert_eq!(record.successful_videos, vec!["a"]);
        assert_eq!(record.total_videos, 2);
        std::fs::remove_dir_all(dir).unwrap();
    }
}
