// Stray process cleanup port
use async_trait::async_trait;

/// Terminates processes left behind by earlier scrapers
///
/// Headless browsers launched by browser-automation scrapers are not always
/// in the scraper's process group, so they survive a group kill and pile up
/// across a sequential batch.
#[async_trait]
pub trait ProcessReaper: Send + Sync {
    /// Terminate matching processes
    ///
    /// # Returns
    /// Number of processes that were signalled. Failures are logged, never raised.
    async fn reap_strays(&self) -> usize;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reaper that only counts how often it was asked to run
    #[derive(Default)]
    pub struct CountingReaper {
        calls: AtomicUsize,
    }

    impl CountingReaper {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProcessReaper for CountingReaper {
        async fn reap_strays(&self) -> usize {
            self.calls.fetch_add(1, Ordering::SeqCst);
            0
        }
    }
}
