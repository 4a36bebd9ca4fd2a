// Probe Domain Model

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::error::DomainError;
use super::stream::StreamId;

/// Probe ID (database row id)
pub type ProbeId = i64;

/// Probe lifecycle status
///
/// `Paused` is kept for storage compatibility; no supervisor transition drives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Stopped,
    Running,
    Error,
    Paused,
}

impl ProbeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStatus::Stopped => "stopped",
            ProbeStatus::Running => "running",
            ProbeStatus::Error => "error",
            ProbeStatus::Paused => "paused",
        }
    }
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProbeStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stopped" => Ok(ProbeStatus::Stopped),
            "running" => Ok(ProbeStatus::Running),
            "error" => Ok(ProbeStatus::Error),
            "paused" => Ok(ProbeStatus::Paused),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Analyzer output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(DomainError::UnknownOutputFormat(other.to_string())),
        }
    }
}

/// Probe Entity
///
/// Owned by the persistence collaborator; the supervisor reads it and
/// requests status updates through `ProbeRepository::update_probe_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Probe {
    pub id: ProbeId,
    pub name: String,
    pub stream_id: StreamId,
    pub profile: String,

    /// Explicit format override; `None` defers to the profile default
    pub output_format: Option<OutputFormat>,
    /// Free-form analyzer options appended verbatim
    pub options: Vec<String>,

    pub status: ProbeStatus,
    pub process_id: Option<u32>,
    pub started_at: Option<i64>, // epoch ms
    pub stopped_at: Option<i64>, // epoch ms
    pub error: Option<String>,
}

impl Probe {
    /// Create a stopped probe (used by provisioning and tests)
    pub fn new(
        id: ProbeId,
        name: impl Into<String>,
        stream_id: StreamId,
        profile: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            stream_id,
            profile: profile.into(),
            output_format: None,
            options: Vec::new(),
            status: ProbeStatus::Stopped,
            process_id: None,
            started_at: None,
            stopped_at: None,
            error: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == ProbeStatus::Running
    }
}

/// Partial status write requested by the core
///
/// `None` fields keep their stored value. Moving to `Running` clears `error`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: ProbeStatus,
    pub error: Option<String>,
    pub process_id: Option<u32>,
    pub started_at: Option<i64>,
    pub stopped_at: Option<i64>,
}

impl StatusUpdate {
    pub fn running(process_id: u32, now_millis: i64) -> Self {
        Self {
            status: ProbeStatus::Running,
            error: None,
            process_id: Some(process_id),
            started_at: Some(now_millis),
            stopped_at: None,
        }
    }

    pub fn stopped(now_millis: i64) -> Self {
        Self {
            status: ProbeStatus::Stopped,
            error: None,
            process_id: None,
            started_at: None,
            stopped_at: Some(now_millis),
        }
    }

    pub fn error(message: impl Into<String>, now_millis: i64) -> Self {
        Self {
            status: ProbeStatus::Error,
            error: Some(message.into()),
            process_id: None,
            started_at: None,
            stopped_at: Some(now_millis),
        }
    }

    /// Error without a stopped-at stamp (run never started)
    pub fn failed_to_start(message: impl Into<String>) -> Self {
        Self {
            status: ProbeStatus::Error,
            error: Some(message.into()),
            process_id: None,
            started_at: None,
            stopped_at: None,
        }
    }

    /// Apply this update to an in-memory probe
    pub fn apply_to(&self, probe: &mut Probe) {
        probe.status = self.status;
        if self.status == ProbeStatus::Running {
            probe.error = None;
        }
        if let Some(error) = &self.error {
            probe.error = Some(error.clone());
        }
        if let Some(pid) = self.process_id {
            probe.process_id = Some(pid);
        }
        if let Some(started_at) = self.started_at {
            probe.started_at = Some(started_at);
        }
        if let Some(stopped_at) = self.stopped_at {
            probe.stopped_at = Some(stopped_at);
        }
    }
}
