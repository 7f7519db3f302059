use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Time parse error: {0}")]
    Time(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Recoverable per-point problems. None of these abort a batch; they are
/// handed back to the caller next to whatever deltas could still be derived.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataQualityWarning {
    #[error("response body could not be decoded: {reason}")]
    MalformedResponse { reason: String },

    #[error("point #{index} is malformed: {reason}")]
    MalformedPoint { index: usize, reason: String },

    #[error("point at {timestamp} has invalid cumulative value {raw:?}")]
    InvalidValue { timestamp: String, raw: String },

    #[error(
        "reading {value} Wh at {timestamp} looks like a reset from {previous} Wh but exceeds the {ceiling} Wh ceiling; discarded"
    )]
    ImplausibleReset {
        timestamp: String,
        previous: f64,
        value: f64,
        ceiling: f64,
    },
}
