// Domain Layer - Pure business logic and entities

pub mod alert;
pub mod error;
pub mod probe;
pub mod profile;
pub mod record;
pub mod stream;

// Re-exports
pub use alert::{Alert, AlertSeverity, AlertType, NewAlert};
pub use error::DomainError;
pub use probe::{OutputFormat, Probe, ProbeId, ProbeStatus, StatusUpdate};
pub use profile::{PluginSpec, Profile, ProfileCatalog};
pub use record::{AnalysisRecord, LogEntry, LogLevel};
pub use stream::{Stream, StreamId, TransportType};
