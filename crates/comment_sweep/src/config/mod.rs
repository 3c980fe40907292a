use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

mod args;
mod default;
mod item;

pub use crate::config::args::Args;
use crate::config::default::{
    default_batch_delay, default_batch_size, default_input_path, default_item_key, default_request_timeout,
};
pub use crate::config::item::{RateLimit, StoreOption};
use crate::dispatcher::EndpointOption;
use crate::runner::RunnerConfig;

const CONFIG_FILE: &str = "config.toml";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// 接收视频 id 的接口地址
    #[serde(default)]
    pub endpoint: String,
    /// 以 Bearer 方式附加到请求头中的凭据
    #[serde(default)]
    pub token: String,
    /// 请求体中视频 id 对应的字段名
    #[serde(default = "default_item_key")]
    pub item_key: String,
    #[serde(default = "default_input_path")]
    pub input_path: PathBuf,
    /// 输入文件中需要处理的分组
    #[serde(default)]
    pub group: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay")]
    pub batch_delay: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default)]
    pub rate_limit: Option<RateLimit>,
    #[serde(default)]
    pub store: StoreOption,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            token: String::new(),
            item_key: default_item_key(),
            input_path: default_input_path(),
            group: String::new(),
            batch_size: default_batch_size(),
            batch_delay: default_batch_delay(),
            request_timeout: default_request_timeout(),
            rate_limit: None,
            store: StoreOption::default(),
        }
    }
}

impl Config {
    /// 从配置文件夹中读取配置，配置文件不存在时写入一份默认配置
    pub fn load(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE);
        info!("开始加载配置文件 {}..", config_path.display());
        match std::fs::read_to_string(&config_path) {
            Ok(content) => Self::parse(&content).with_context(|| format!("解析配置文件 {} 失败", config_path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("配置文件不存在，写入默认配置..");
                let config = Config::default();
                config.save(config_dir)?;
                Ok(config)
            }
            Err(e) => Err(e).with_context(|| format!("读取配置文件 {} 失败", config_path.display())),
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self, config_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(config_dir)?;
        std::fs::write(config_dir.join(CONFIG_FILE), toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// 命令行参数的优先级高于配置文件
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(group) = &args.group {
            self.group = group.clone();
        }
        if let Some(token) = &args.token {
            self.token = token.clone();
        }
    }

    /// 只查看进度时不需要接口相关的配置
    pub fn check_status(&self) -> Result<()> {
        Self::report_errors(self.store_errors())
    }

    pub fn check(&self) -> Result<()> {
        let mut errors = self.store_errors();
        if self.endpoint.is_empty() {
            errors.push("未设置 endpoint".to_owned());
        } else {
            match reqwest::Url::parse(&self.endpoint) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                Ok(_) => errors.push(format!("endpoint 应为 http 或 https 地址，检测到：{}", self.endpoint)),
                Err(e) => errors.push(format!("endpoint 不是合法的地址：{}", e)),
            }
        }
        if self.token.is_empty() {
            errors.push("未设置 token，可通过配置文件、--token 参数或 COMMENT_SWEEP_TOKEN 环境变量提供".to_owned());
        }
        if self.item_key.is_empty() {
            errors.push("未设置 item_key".to_owned());
        }
        if self.batch_size == 0 {
            errors.push("batch_size 必须大于 0".to_owned());
        }
        if self.rate_limit.as_ref().is_some_and(|r| r.limit == 0 || r.duration == 0) {
            errors.push("rate_limit 的 limit 和 duration 必须大于 0".to_owned());
        }
        Self::report_errors(errors)
    }

    fn store_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.group.is_empty() {
            errors.push("未设置需要处理的 group".to_owned());
        }
        if self.store.path().as_os_str().is_empty() {
            errors.push("未设置进度文件的 path".to_owned());
        }
        errors
    }

    fn report_errors(errors: Vec<String>) -> Result<()> {
        if !errors.is_empty() {
            bail!(
                errors
                    .into_iter()
                    .map(|e| format!("- {}", e))
                    .collect::<Vec<_>>()
                    .join("\n")
            );
        }
        Ok(())
    }

    /// 将相对路径解析为基于配置文件夹的路径
    pub fn resolve_path(config_dir: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            config_dir.join(path)
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            batch_size: self.batch_size,
            batch_delay: Duration::from_millis(self.batch_delay),
        }
    }

    pub fn endpoint_option(&self) -> EndpointOption {
        EndpointOption {
            endpoint: self.endpoint.clone(),
            token: self.token.clone(),
            item_key: self.item_key.clone(),
            request_timeout: Duration::from_secs(self.request_timeout),
            rate_limit: self.rate_limit.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_default_config_roundtrip() {
        let config = Config::default();
        let content = toml::to_string_pretty(&config).unwrap();
        assert_eq!(Config::parse(&content).unwrap(), config);
        assert_eq!(Config::parse("").unwrap(), config);
    }

    #[test]
    fn test_parse_config() {
        let config = Config::parse(
            r#"
            endpoint = "https://example.com/parse-comments"
            token = "secret"
            group = "tech"
            batch_size = 5

            [rate_limit]
            limit = 4
            duration = 250

            [store]
            type = "sqlite"
            path = "/var/lib/comment-sweep/progress.sqlite"
            "#,
        )
        .unwrap();
        assert_eq!(config.item_key, "videoId");
        assert_eq!(config.batch_delay, 2000);
        assert_eq!(config.rate_limit, Some(RateLimit { limit: 4, duration: 250 }));
        assert_eq!(
            config.store,
            StoreOption::Sqlite {
                path: PathBuf::from("/var/lib/comment-sweep/progress.sqlite")
            }
        );
        assert!(config.check().is_ok());
        let runner_config = config.runner_config();
        assert_eq!(runner_config.batch_size, 5);
        assert_eq!(runner_config.batch_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_check_collects_all_errors() {
        let config = Config {
            endpoint: "ftp://example.com".to_owned(),
            batch_size: 0,
            ..Default::default()
        };
        let message = config.check().unwrap_err().to_string();
        assert_eq!(message.lines().count(), 4);
        assert!(message.contains("http 或 https"));
        assert!(message.contains("token"));
        assert!(message.contains("group"));
        assert!(message.contains("batch_size"));
    }

    #[test]
    fn test_check_status_ignores_endpoint() {
        let config = Config {
            group: "tech".to_owned(),
            ..Default::default()
        };
        assert!(config.check().is_err());
        assert!(config.check_status().is_ok());
        let message = Config::default().check_status().unwrap_err().to_string();
        assert_eq!(message, "- 未设置需要处理的 group");
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config {
            endpoint: "http://localhost:8080/".to_owned(),
            group: "music".to_owned(),
            ..Default::default()
        };
        let args = Args::try_parse_from(["comment-sweep", "--group", "tech", "--token", "from-cli"]).unwrap();
        config.apply_args(&args);
        assert_eq!(config.group, "tech");
        assert_eq!(config.token, "from-cli");
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_resolve_path() {
        let config_dir = Path::new("/etc/comment-sweep");
        assert_eq!(
            Config::resolve_path(config_dir, Path::new("videos.json")),
            PathBuf::from("/etc/comment-sweep/videos.json")
        );
        assert_eq!(
            Config::resolve_path(config_dir, Path::new("/data/videos.json")),
            PathBuf::from("/data/videos.json")
        );
    }
}
