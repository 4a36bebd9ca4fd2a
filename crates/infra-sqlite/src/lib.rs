// DVB Probe Infrastructure - SQLite Adapter
// Implements: ProbeRepository, AlertSink, Maintenance

mod alert_repository;
mod connection;
mod error;
mod maintenance_impl;
mod migration;
mod probe_repository;

pub use alert_repository::SqliteAlertSink;
pub use connection::create_pool;
pub use maintenance_impl::SqliteMaintenance;
pub use migration::run_migrations;
pub use probe_repository::{NewProbe, NewStream, SqliteProbeRepository};
