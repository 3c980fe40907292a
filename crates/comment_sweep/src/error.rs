use anyhow::Result;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("endpoint responded with status {status}, body: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },
    #[error("failed to send request")]
    Transport(#[source] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum ProgressError {
    #[error("progress document belongs to group `{stored}`, current group is `{current}`")]
    GroupMismatch { stored: String, current: String },
    #[error("progress record holds {count} video ids missing from the current input, e.g. [{sample}]")]
    OutsideInput { count: usize, sample: String },
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("group `{group}` not found in input document, available groups: [{available}]")]
    GroupNotFound { group: String, available: String },
    #[error("group `{0}` is neither a list of video ids nor an object keyed by video id")]
    MalformedGroup(String),
}

/// 单个视频的分发结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Succeeded,
    Failed(String),
}

// 分发过程中出现的所有错误都在这里被转换为失败结果，不会继续向上传递
impl From<Result<()>> for DispatchOutcome {
    fn from(res: Result<()>) -> Self {
        match res {
            Ok(_) => DispatchOutcome::Succeeded,
            Err(err) => {
                let timed_out = err.chain().any(|cause| {
                    cause
                        .downcast_ref::<reqwest::Error>()
                        .is_some_and(|e| e.is_timeout())
                });
                if timed_out {
                    return DispatchOutcome::Failed(format!("request timed out: {:#}", err));
                }
                DispatchOutcome::Failed(format!("{:#}", err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn test_outcome_from_result() {
        assert_eq!(DispatchOutcome::from(Ok(())), DispatchOutcome::Succeeded);
        let outcome = DispatchOutcome::from(Err(anyhow!(DispatchError::UnexpectedStatus {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: "boom".to_owned(),
        })));
        let DispatchOutcome::Failed(reason) = outcome else {
            panic!("expected a failed outcome");
        };
        assert!(reason.contains("500"));
        assert!(reason.contains("boom"));
        let outcome = DispatchOutcome::from(Err(anyhow!("connection reset").context("send request")));
        assert_eq!(
            outcome,
            DispatchOutcome::Failed("send request: connection reset".to_owned())
        );
    }
}
