// Alert Sink Port

use crate::domain::NewAlert;
use crate::error::Result;
use async_trait::async_trait;

/// Destination for operational alerts (`raise(type, probeId, severity, message)`)
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn raise(&self, alert: NewAlert) -> Result<()>;
}

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Records every raised alert
    #[derive(Default)]
    pub struct RecordingAlertSink {
        alerts: Mutex<Vec<NewAlert>>,
    }

    impl RecordingAlertSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn alerts(&self) -> Vec<NewAlert> {
            self.alerts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AlertSink for RecordingAlertSink {
        async fn raise(&self, alert: NewAlert) -> Result<()> {
            self.alerts.lock().unwrap().push(alert);
            Ok(())
        }
    }
}
