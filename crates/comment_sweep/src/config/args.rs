use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "comment-sweep", version, about, long_about = None)]
pub struct Args {
    #[arg(short, long, default_value = "None,comment_sweep=info", env = "RUST_LOG")]
    pub log_level: String,

    #[arg(short, long, env = "COMMENT_SWEEP_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// 覆盖配置文件中的分组
    #[arg(short, long, env = "COMMENT_SWEEP_GROUP")]
    pub group: Option<String>,

    /// 覆盖配置文件中的 token
    #[arg(short, long, env = "COMMENT_SWEEP_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// 仅输出当前的进度，不执行任务
    #[arg(long)]
    pub status: bool,

    /// 清空失败记录，使失败的视频在本次运行中被重新处理
    #[arg(long, conflicts_with = "status")]
    pub reset_failed: bool,
}

impl Args {
    pub fn config_dir(&self) -> Result<PathBuf> {
        match &self.config_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(dirs::config_dir()
                .context("No config path found")?
                .join("comment-sweep")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let args = Args::try_parse_from([
            "comment-sweep",
            "--config-dir",
            "/tmp/comment-sweep",
            "-g",
            "tech",
            "--reset-failed",
        ])
        .unwrap();
        assert_eq!(args.config_dir().unwrap(), PathBuf::from("/tmp/comment-sweep"));
        assert_eq!(args.group.as_deref(), Some("tech"));
        assert!(args.reset_failed);
        assert!(!args.status);
        assert!(Args::try_parse_from(["comment-sweep", "--status", "--reset-failed"]).is_err());
    }
}
