// Regwatch Infrastructure - System Adapters
// Implements: ScriptRunner, ProcessReaper, ScraperWorkspace, record store

pub mod browser_reaper;
pub mod fs_workspace;
pub mod record_store;
pub mod subprocess_runner;

pub use browser_reaper::{BrowserPattern, BrowserReaper};
pub use fs_workspace::FsWorkspace;
pub use record_store::{JsonRecordStore, SeenUrls, StoreError, DEFAULT_MAX_BACKUPS};
pub use subprocess_runner::SubprocessRunner;
