use thiserror::Error;

#[derive(Error, Debug)]
pub enum CovdeltaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown link mode: '{0}'. Supported: auto, files-and-lines, files-only, none")]
    UnknownLinkMode(String),

    #[error("Unknown post target: '{0}'. Supported: comment, comment-and-job-summary, job-summary")]
    UnknownPostTarget(String),

    #[error("Unknown merge policy: '{0}'. Supported: max, sum")]
    UnknownMergePolicy(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CovdeltaError>;
