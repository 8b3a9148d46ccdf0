/// Unified error types for the Snag system.
use thiserror::Error;

/// Top-level error type for the Snag system.
#[derive(Debug, Error)]
pub enum SnagError {
    #[error("extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("telegram error: {0}")]
    Telegram(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from driving the yt-dlp subprocess.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to spawn {bin}: {source}")]
    Spawn {
        bin: String,
        source: std::io::Error,
    },

    #[error("yt-dlp exited with status {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    #[error("yt-dlp returned invalid metadata JSON: {0}")]
    InvalidMetadata(String),

    #[error("yt-dlp reported no output file")]
    MissingOutput,

    #[error("downloaded file missing at {0}")]
    FileNotFound(String),
}

/// Failure modes of a single download-and-deliver attempt. Each variant
/// maps to one user-facing message; nothing is retried automatically.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("file too large: {actual} bytes (limit {limit})")]
    Oversize { actual: u64, limit: u64 },

    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Result type alias for Snag operations.
pub type SnagResult<T> = Result<T, SnagError>;
