use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Invalid configuration field '{field}': {details}")]
    InvalidConfig { field: String, details: String },

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[cfg(feature = "remote")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Forecast service returned status {status}: {body}")]
    RemoteStatus { status: u16, body: String },

    #[error("Forecast request timed out after {0} seconds")]
    Timeout(u64),
}

pub type Result<T> = std::result::Result<T, ForecastError>;
