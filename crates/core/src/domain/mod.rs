// Domain Layer - Pure business logic and entities

pub mod error;
pub mod job;
pub mod outcome;
pub mod record;

// Re-exports
pub use error::DomainError;
pub use job::{Category, JobEntry, JobSpec};
pub use outcome::{JobOutcome, JobStatus};
pub use record::{hash_id, MergeStats, RecordSet};
