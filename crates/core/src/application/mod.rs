// Application Layer - Use Cases and Orchestration Logic

pub mod batch;
pub mod constants;
pub mod job_runner;
pub mod plan;
pub mod report;
pub mod shutdown;

// Re-exports
pub use batch::{BatchOrchestrator, BatchSettings, ExecutionMode};
pub use job_runner::{JobRunner, RunnerSettings};
pub use plan::{BatchPlan, JobPlanner, PlanOptions};
pub use report::BatchReport;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
