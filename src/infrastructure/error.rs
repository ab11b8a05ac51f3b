use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Generation error: {0}")]
    Generation(String),
    #[error("Generation request timed out")]
    GenerationTimeout,
    #[error("Credential error: {0}")]
    Credential(String),
    #[error("Audio error: {0}")]
    Audio(String),
    #[error("Notification error: {0}")]
    Notification(String),
}
