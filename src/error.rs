use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid query input: {0}")]
    InputValidation(String),

    #[error("Watershed topology error: {0}")]
    GraphConsistency(String),

    #[error("Join mismatch: {0}")]
    JoinMismatch(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
