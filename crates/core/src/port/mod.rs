// Port Layer - Interfaces for external dependencies

pub mod alert_sink;
pub mod maintenance;
pub mod probe_repository;
pub mod process_supervisor;
pub mod system_probe;
pub mod time_provider;

// Re-exports
pub use alert_sink::AlertSink;
pub use maintenance::{Maintenance, RetentionConfig, RetentionStats};
pub use probe_repository::ProbeRepository;
pub use process_supervisor::{ActiveProcess, ProcessError, ProcessRef, ProcessSupervisor};
pub use system_probe::{HostMetrics, SystemProbe};
pub use time_provider::TimeProvider;
