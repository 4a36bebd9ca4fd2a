// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Unknown probe status: {0}")]
    UnknownStatus(String),

    #[error("Unknown output format: {0}")]
    UnknownOutputFormat(String),

    #[error("Unknown transport type: {0}")]
    UnknownTransport(String),

    #[error("Unknown log level: {0}")]
    UnknownLogLevel(String),

    #[error("Unknown alert type: {0}")]
    UnknownAlertType(String),

    #[error("Unknown alert severity: {0}")]
    UnknownSeverity(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
