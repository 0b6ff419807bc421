use std::process::ExitStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PortabruError {
    #[error("Formula not found: {0}")]
    FormulaNotFound(String),

    #[error("`{command}` failed ({status})")]
    SubprocessFailure { command: String, status: ExitStatus },

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PortabruError>;
