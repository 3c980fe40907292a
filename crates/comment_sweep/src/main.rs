#[macro_use]
extern crate tracing;

mod config;
mod database;
mod dispatcher;
mod error;
mod progress;
mod runner;
mod source;
mod utils;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use crate::config::{Args, Config};
use crate::dispatcher::EndpointDispatcher;
use crate::progress::{load_status, open_store};
use crate::runner::Runner;
use crate::source::VideoSource;
use crate::utils::init_logger;
use crate::utils::signal::cancel_on_terminate;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logger(&args.log_level);
    match run(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("运行失败：{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config_dir = args.config_dir()?;
    let mut config = Config::load(&config_dir)?;
    config.apply_args(&args);
    info!("检查配置文件..");
    let checked = if args.status {
        config.check_status()
    } else {
        config.check()
    };
    if let Err(e) = checked {
        bail!(
            "位于 {} 的配置文件不合法，请参考提示信息修复后继续运行：\n{}",
            config_dir.join("config.toml").display(),
            e
        );
    }
    info!("配置文件检查通过");
    let store = open_store(&config.store, &config_dir, &config.group).await?;
    if args.status {
        load_status(store.as_ref()).await?.log_summary();
        return Ok(());
    }
    let dispatcher = Arc::new(EndpointDispatcher::new(config.endpoint_option())?);
    let shutdown = CancellationToken::new();
    let runner = Runner::new(config.runner_config(), dispatcher, store).with_shutdown(shutdown.clone());
    let source = VideoSource::load(&Config::resolve_path(&config_dir, &config.input_path), &config.group).await?;
    info!("读取到分组 {} 的 {} 个视频", source.group, source.videos.len());
    if args.reset_failed {
        let count = runner.reset_failed().await?;
        info!("已清空 {} 条失败记录，这些视频将在本次运行中重新处理", count);
    }
    cancel_on_terminate(shutdown);
    runner.run(&source.videos).await?;
    Ok(())
}
