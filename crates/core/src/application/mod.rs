// Application Layer - Use Cases and Business Logic

pub mod command_builder;
pub mod constants;
pub mod health;
pub mod output_decoder;
pub mod probe_locks;
pub mod probe_service;
pub mod retention;
pub mod shutdown;
pub mod watchdog;

// Re-exports
pub use command_builder::{AnalyzerInvocation, CommandBuilder};
pub use health::{HealthService, HealthStatus, ProbeCounts, SystemHealth};
pub use output_decoder::{decode, DecodedOutput, TextAnalysis};
pub use probe_locks::{ProbeLockGuard, ProbeLocks};
pub use probe_service::{ProbeService, ProbeStatusView, StartOutcome};
pub use retention::RetentionScheduler;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use watchdog::{Watchdog, WatchdogReport};
