use std::path::{Path, PathBuf};
use std::time::Duration;

use leaky_bucket::RateLimiter;
use serde::{Deserialize, Serialize};

use crate::config::default::default_progress_path;

/// 请求限速，每 duration 毫秒允许请求 limit 次
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RateLimit {
    pub limit: usize,
    pub duration: u64,
}

impl RateLimit {
    pub fn build(&self) -> RateLimiter {
        RateLimiter::builder()
            .initial(self.limit)
            .refill(self.limit)
            .max(self.limit)
            .interval(Duration::from_millis(self.duration))
            .build()
    }
}

/// 进度的持久化方式，相对路径基于配置文件夹解析
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreOption {
    Json { path: PathBuf },
    Sqlite { path: PathBuf },
}

impl StoreOption {
    pub fn path(&self) -> &Path {
        match self {
            StoreOption::Json { path } | StoreOption::Sqlite { path } => path,
        }
    }
}

impl Default for StoreOption {
    fn default() -> Self {
        StoreOption::Json {
            path: default_progress_path(),
        }
    }
}
