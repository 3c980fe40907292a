use std::path::PathBuf;

pub(super) fn default_item_key() -> String {
    "videoId".to_owned()
}

pub(super) fn default_input_path() -> PathBuf {
    PathBuf::from("videos.json")
}

pub(super) fn default_batch_size() -> usize {
    10
}

/// 两批之间的等待时间，单位为毫秒
pub(super) fn default_batch_delay() -> u64 {
    2000
}

/// 单个请求的超时时间，单位为秒
pub(super) fn default_request_timeout() -> u64 {
    60
}

pub(super) fn default_progress_path() -> PathBuf {
    PathBuf::from("progress.json")
}
