// Stream Domain Model

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::error::DomainError;

/// Stream ID (database row id)
pub type StreamId = i64;

/// Network transport of the monitored stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    Udp,
    Rtp,
}

impl TransportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportType::Udp => "udp",
            TransportType::Rtp => "rtp",
        }
    }
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "udp" => Ok(TransportType::Udp),
            "rtp" => Ok(TransportType::Rtp),
            other => Err(DomainError::UnknownTransport(other.to_string())),
        }
    }
}

/// Stream Entity (read-only for the supervisor)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    pub id: StreamId,
    pub name: String,
    pub transport: TransportType,
    pub address: Option<String>,
    pub port: u16,
    pub options: serde_json::Value,
}

impl Stream {
    /// `address:port`, or the bare port when no address is configured
    pub fn endpoint(&self) -> String {
        match self.address.as_deref().filter(|a| !a.is_empty()) {
            Some(address) => format!("{}:{}", address, self.port),
            None => self.port.to_string(),
        }
    }
}
