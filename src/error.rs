use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the model and scan layers.
///
/// Per-file problems (unsupported formats, broken files) are not
/// surfaced through this type during normal browsing: records swallow
/// them into empty pixel data and empty metadata so one bad file cannot
/// break the folder it sits in.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("not a directory: {}", .0.display())]
    InvalidDirectory(PathBuf),

    #[error("unsupported image format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("a face scan is already running")]
    ScanAlreadyRunning,

    #[error("face detection failed: {0}")]
    Detection(String),

    #[error("failed to load face detection model: {0}")]
    ModelLoad(String),
}
