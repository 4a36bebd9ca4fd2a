// DVB Probe Infrastructure - System Adapters
// Implements: ProcessSupervisor, SystemProbe

pub mod os_process;
pub mod process_table;
pub mod supervisor;
pub mod system_probe_impl;
pub mod toolchain;

pub use process_table::{ProcessHandle, ProcessTable};
pub use supervisor::SubprocessSupervisor;
pub use system_probe_impl::SystemProbeImpl;
pub use toolchain::AnalyzerToolchain;
