use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use futures::stream::FuturesOrdered;
use futures::{FutureExt, StreamExt};
use itertools::Itertools;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::Dispatch;
use crate::error::{DispatchOutcome, ProgressError};
use crate::progress::{ProgressRecord, ProgressStore};

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub batch_size: usize,
    /// 两批之间固定等待的时间
    pub batch_delay: Duration,
}

/// 单个批次的统计结果
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    /// 没能得到结果的视频数量，这些视频不会被记录，下一次运行时会重新处理
    pub unresolved: usize,
}

pub struct Runner {
    config: RunnerConfig,
    dispatcher: Arc<dyn Dispatch>,
    store: Arc<dyn ProgressStore>,
    shutdown: CancellationToken,
}

/// 将剩余的视频按顺序切分为固定大小的批次
pub fn partition(remaining: &[String], batch_size: usize) -> Vec<&[String]> {
    remaining.chunks(batch_size).collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

impl Runner {
    pub fn new(config: RunnerConfig, dispatcher: Arc<dyn Dispatch>, store: Arc<dyn ProgressStore>) -> Self {
        Self {
            config,
            dispatcher,
            store,
            shutdown: CancellationToken::new(),
        }
    }

    /// 取消后不会再开始新的批次，正在执行的批次会完整执行并保存
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// 读取已有的进度，不存在时创建新的进度并立即保存，保证第一批开始前崩溃也能恢复
    pub async fn load_or_init(&self, videos: &[String]) -> Result<ProgressRecord> {
        let total_videos = videos.len();
        if let Some(progress) = self.store.load().await? {
            let outside = progress.outside_input(videos);
            if !outside.is_empty() {
                bail!(ProgressError::OutsideInput {
                    count: outside.len(),
                    sample: outside.iter().take(5).join(", "),
                });
            }
            info!(
                "恢复已有进度：已完成 {}/{}，成功 {} 个，失败 {} 个",
                progress.completed_videos,
                progress.total_videos,
                progress.successful_videos.len(),
                progress.failed_videos.len()
            );
            if progress.total_videos != total_videos {
                warn!(
                    "进度中记录的视频总数 {} 与当前输入的视频总数 {} 不一致，将继续使用已有进度",
                    progress.total_videos, total_videos
                );
            }
            return Ok(progress);
        }
        let progress = ProgressRecord::new(total_videos, self.config.batch_size);
        self.store.save(&progress).await.context("保存初始进度失败")?;
        info!(
            "未找到已有进度，创建新的进度：共 {} 个视频，{} 批",
            progress.total_videos, progress.total_batches
        );
        Ok(progress)
    }

    /// 清空失败记录并保存，返回被清空的记录数
    pub async fn reset_failed(&self) -> Result<usize> {
        let Some(mut progress) = self.store.load().await? else {
            return Ok(0);
        };
        let count = progress.reset_failed();
        if count > 0 {
            progress.touch();
            self.store.save(&progress).await.context("保存进度失败")?;
        }
        Ok(count)
    }

    pub async fn run(&self, videos: &[String]) -> Result<ProgressRecord> {
        let mut progress = self.load_or_init(videos).await?;
        let remaining = progress.resolve_remainder(videos);
        if remaining.is_empty() {
            info!("所有视频均已处理完毕，无需继续执行");
            self.report(&progress);
            return Ok(progress);
        }
        let batches = partition(&remaining, self.config.batch_size);
        info!(
            "共 {} 个视频，剩余 {} 个待处理，本次运行分 {} 批执行",
            videos.len(),
            remaining.len(),
            batches.len()
        );
        for (idx, batch) in batches.iter().enumerate() {
            if self.shutdown.is_cancelled() {
                warn!("任务已被取消，剩余 {} 批将在下次运行时继续处理", batches.len() - idx);
                break;
            }
            info!("开始处理本次运行的第 {}/{} 批，共 {} 个视频", idx + 1, batches.len(), batch.len());
            self.run_batch(batch, &mut progress).await?;
            if idx + 1 < batches.len() {
                tokio::select! {
                    _ = time::sleep(self.config.batch_delay) => {}
                    _ = self.shutdown.cancelled() => {}
                }
            }
        }
        self.report(&progress);
        Ok(progress)
    }

    /// 并发处理一个批次内的所有视频，全部结束后再统一写入进度
    pub async fn run_batch(&self, batch: &[String], progress: &mut ProgressRecord) -> Result<BatchReport> {
        let tasks = batch
            .iter()
            .map(|video_id| AssertUnwindSafe(self.dispatcher.dispatch(video_id)).catch_unwind())
            .collect::<FuturesOrdered<_>>();
        let outcomes = tasks.collect::<Vec<_>>().await;
        let mut report = BatchReport::default();
        for (video_id, outcome) in batch.iter().zip(outcomes) {
            match outcome {
                Ok(DispatchOutcome::Succeeded) => {
                    debug!("处理视频 {} 成功", video_id);
                    report.succeeded += 1;
                    progress.record(video_id, DispatchOutcome::Succeeded);
                }
                Ok(DispatchOutcome::Failed(reason)) => {
                    warn!("处理视频 {} 失败：{}", video_id, reason);
                    report.failed += 1;
                    progress.record(video_id, DispatchOutcome::Failed(reason));
                }
                Err(payload) => {
                    error!(
                        "处理视频 {} 时出现非预期的错误：{}，本次不记录结果，将在下次运行时重新处理",
                        video_id,
                        panic_message(&*payload)
                    );
                    report.unresolved += 1;
                }
            }
        }
        progress.current_batch += 1;
        progress.touch();
        self.store.save(progress).await.context("保存进度失败")?;
        info!(
            "本批次成功 {}/{}，累计完成 {}/{}（{:.1}%）",
            report.succeeded,
            batch.len(),
            progress.completed_videos,
            progress.total_videos,
            progress.completion_percentage()
        );
        Ok(report)
    }

    fn report(&self, progress: &ProgressRecord) {
        info!(
            "任务结束：共 {} 个视频，成功 {} 个，失败 {} 个",
            progress.total_videos,
            progress.successful_videos.len(),
            progress.failed_videos.len()
        );
        progress.log_failures();
    }
}
