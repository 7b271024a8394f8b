use thiserror::Error;

/// Errors raised while turning wire JSON into typed records.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid unsigned 64-bit value: {0:?}")]
    InvalidUnsignedLong(String),

    #[error("invalid aggregation key piece: {0:?}")]
    InvalidKeyPiece(String),

    #[error("malformed filter clause: {0}")]
    MalformedFilter(String),

    #[error("invalid report spec: {0}")]
    InvalidReportSpec(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Errors raised while loading the static privacy configuration. Any of
/// these is fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("privacy parameters are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{key} must be a finite probability in [0, 1], got {value}")]
    InvalidProbability { key: &'static str, value: f64 },
}
