// Port Layer - Interfaces for external dependencies

pub mod notifier;
pub mod process_reaper;
pub mod script_runner;
pub mod time_provider;
pub mod workspace;

// Re-exports
pub use notifier::{NoopNotifier, NotifyError, ReportNotifier};
pub use process_reaper::ProcessReaper;
pub use script_runner::{RunError, RunOutput, ScriptInvocation, ScriptRunner, Termination};
pub use time_provider::TimeProvider;
pub use workspace::ScraperWorkspace;
