use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use itertools::Itertools;
use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::error::SourceError;

/// 输入文件中某个分组的全部视频 id，即本次任务需要处理的全集
#[derive(Debug)]
pub struct VideoSource {
    pub group: String,
    pub videos: Vec<String>,
}

/// 分组的值既可以是视频 id 列表，也可以是以视频 id 为键的元数据索引
#[derive(Deserialize)]
#[serde(untagged)]
enum GroupEntry {
    List(Vec<String>),
    Index(IndexKeys),
    Unsupported(IgnoredAny),
}

/// 只保留索引的键，并维持其在文件中的顺序
struct IndexKeys(Vec<String>);

impl<'de> Deserialize<'de> for IndexKeys {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeysVisitor;

        impl<'de> Visitor<'de> for KeysVisitor {
            type Value = IndexKeys;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an object keyed by video id")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut keys = Vec::with_capacity(map.size_hint().unwrap_or_default());
                while let Some((key, _)) = map.next_entry::<String, IgnoredAny>()? {
                    keys.push(key);
                }
                Ok(IndexKeys(keys))
            }
        }

        deserializer.deserialize_map(KeysVisitor)
    }
}

impl VideoSource {
    pub async fn load(path: &Path, group: &str) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("读取输入文件 {} 失败", path.display()))?;
        Self::parse(&content, group).with_context(|| format!("解析输入文件 {} 失败", path.display()))
    }

    pub fn parse(content: &str, group: &str) -> Result<Self> {
        let mut document: HashMap<String, GroupEntry> = serde_json::from_str(content)?;
        let Some(entry) = document.remove(group) else {
            return Err(SourceError::GroupNotFound {
                group: group.to_owned(),
                available: document.keys().sorted().join(", "),
            }
            .into());
        };
        let videos = match entry {
            GroupEntry::List(videos) => videos,
            GroupEntry::Index(IndexKeys(videos)) => videos,
            GroupEntry::Unsupported(_) => return Err(SourceError::MalformedGroup(group.to_owned()).into()),
        };
        let total = videos.len();
        let videos = videos.into_iter().unique().collect::<Vec<_>>();
        if videos.len() != total {
            warn!(
                "分组 {} 中存在 {} 个重复的视频 id，已按首次出现的位置去重",
                group,
                total - videos.len()
            );
        }
        if videos.is_empty() {
            warn!("分组 {} 中没有任何视频", group);
        }
        Ok(Self {
            group: group.to_owned(),
            videos,
        })
    }
}
