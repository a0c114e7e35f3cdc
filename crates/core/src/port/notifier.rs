// Report notification port
use async_trait::async_trait;
use thiserror::Error;

use crate::application::report::BatchReport;

/// Notification errors
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notifier not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid message: {0}")]
    Message(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Pluggable delivery of the end-of-batch report
#[async_trait]
pub trait ReportNotifier: Send + Sync {
    async fn send_report(&self, report: &BatchReport) -> Result<(), NotifyError>;
}

/// No-op notifier (email disabled, dry runs)
pub struct NoopNotifier;

#[async_trait]
impl ReportNotifier for NoopNotifier {
    async fn send_report(&self, _report: &BatchReport) -> Result<(), NotifyError> {
        Ok(())
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Captures every subject it is asked to send
    #[derive(Default)]
    pub struct RecordingNotifier {
        subjects: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn subjects(&self) -> Vec<String> {
            self.subjects.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReportNotifier for RecordingNotifier {
        async fn send_report(&self, report: &BatchReport) -> Result<(), NotifyError> {
            self.subjects.lock().unwrap().push(report.subject());
            if self.fail {
                return Err(NotifyError::Transport("mock failure".to_string()));
            }
            Ok(())
        }
    }
}
