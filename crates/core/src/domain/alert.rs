// Alert Domain Model

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::error::DomainError;
use super::probe::ProbeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    ProbeCrashed,
    HighErrorRate,
    LowBitrate,
    StreamLost,
    SystemResource,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::ProbeCrashed => "probe_crashed",
            AlertType::HighErrorRate => "high_error_rate",
            AlertType::LowBitrate => "low_bitrate",
            AlertType::StreamLost => "stream_lost",
            AlertType::SystemResource => "system_resource",
        }
    }
}

impl FromStr for AlertType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "probe_crashed" => Ok(AlertType::ProbeCrashed),
            "high_error_rate" => Ok(AlertType::HighErrorRate),
            "low_bitrate" => Ok(AlertType::LowBitrate),
            "stream_lost" => Ok(AlertType::StreamLost),
            "system_resource" => Ok(AlertType::SystemResource),
            other => Err(DomainError::UnknownAlertType(other.to_string())),
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl FromStr for AlertSeverity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(AlertSeverity::Low),
            "medium" => Ok(AlertSeverity::Medium),
            "high" => Ok(AlertSeverity::High),
            "critical" => Ok(AlertSeverity::Critical),
            other => Err(DomainError::UnknownSeverity(other.to_string())),
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert raised through the `AlertSink` port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub alert_type: AlertType,
    pub probe_id: Option<ProbeId>,
    pub severity: AlertSeverity,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

/// Persisted alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub alert_type: AlertType,
    pub probe_id: Option<ProbeId>,
    pub severity: AlertSeverity,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub timestamp: i64, // epoch ms
    pub acknowledged: bool,
}

impl NewAlert {
    pub fn probe_crashed(probe_id: ProbeId, probe_name: &str) -> Self {
        Self {
            alert_type: AlertType::ProbeCrashed,
            probe_id: Some(probe_id),
            severity: AlertSeverity::High,
            message: format!("The probe {} stopped unexpectedly", probe_name),
            data: None,
        }
    }
}
