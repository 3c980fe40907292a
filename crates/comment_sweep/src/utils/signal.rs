use std::io;

use tokio::signal;
use tokio_util::sync::CancellationToken;

#[cfg(target_family = "windows")]
pub async fn terminate() -> io::Result<()> {
    signal::ctrl_c().await
}

/// ctrl + c 发送的是 SIGINT 信号，docker stop 发送的是 SIGTERM 信号，都需要处理
#[cfg(target_family = "unix")]
pub async fn terminate() -> io::Result<()> {
    use tokio::select;

    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let mut int = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    select! {
        _ = term.recv() => Ok(()),
        _ = int.recv() => Ok(()),
    }
}

/// 收到终止信号后取消 token，正在执行的批次不会被打断
pub fn cancel_on_terminate(token: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = terminate().await {
            error!("监听终止信号失败：{}", e);
            return;
        }
        warn!("收到终止信号，将在当前批次处理完毕并保存进度后退出");
        token.cancel();
    });
}
