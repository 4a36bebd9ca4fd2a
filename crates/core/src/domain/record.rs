// Analysis and Log records produced by the supervisor

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::error::DomainError;
use super::probe::ProbeId;
use super::stream::StreamId;

/// Decoded analyzer output, append-only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub probe_id: ProbeId,
    pub stream_id: StreamId,
    pub payload: serde_json::Value,
    pub timestamp: i64, // epoch ms
}

/// Persisted log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(DomainError::UnknownLogLevel(other.to_string())),
        }
    }
}

/// Lifecycle log entry attached to a probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub probe_id: ProbeId,
    pub level: LogLevel,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub timestamp: i64, // epoch ms
}
