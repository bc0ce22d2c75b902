use thiserror::Error;

/// Sensor screen error types
#[derive(Error, Debug)]
pub enum ScreenError {
    #[error("Permission to access location was denied")]
    PermissionDenied,

    #[error("Location fetch failed: {0}")]
    LocationFailed(String),

    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(String),

    #[error("Sensor stream already has a subscriber")]
    AlreadySubscribed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for screen operations
pub type ScreenResult<T> = Result<T, ScreenError>;
