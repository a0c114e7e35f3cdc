// Job Outcome Domain Model

use serde::{Deserialize, Serialize};

use super::job::{Category, JobSpec};

/// Final status of one job (fixed taxonomy)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Failed,
    Timeout,
    ScriptNotFound,
    FolderNotFound,
    Exception,
}

impl JobStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Timeout => "timeout",
            JobStatus::ScriptNotFound => "script_not_found",
            JobStatus::FolderNotFound => "folder_not_found",
            JobStatus::Exception => "exception",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub name: String,
    pub status: JobStatus,
    pub error: Option<String>,
    pub new_records: usize,
    pub before_count: usize,
    pub after_count: usize,
    pub script_file: Option<String>,
    pub output_file: Option<String>,
    pub execution_ms: i64,
    pub timeout_secs: u64,
    pub category: Category,
}

impl JobOutcome {
    /// Outcome for a job that never launched (no counts, no timing)
    pub fn not_launched(spec: &JobSpec, status: JobStatus, error: impl Into<String>) -> Self {
        Self {
            name: spec.name.clone(),
            status,
            error: Some(error.into()),
            new_records: 0,
            before_count: 0,
            after_count: 0,
            script_file: None,
            output_file: None,
            execution_ms: 0,
            timeout_secs: spec.timeout_secs,
            category: spec.category.clone(),
        }
    }

    pub fn execution_secs(&self) -> f64 {
        self.execution_ms as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_status_serde_names() {
        let json = serde_json::to_string(&JobStatus::ScriptNotFound).unwrap();
        assert_eq!(json, "\"script_not_found\"");
        assert_eq!(JobStatus::FolderNotFound.to_string(), "folder_not_found");
        assert!(JobStatus::Success.is_success());
        assert!(!JobStatus::Timeout.is_success());
    }

    #[test]
    fn test_not_launched_keeps_timeout() {
        let spec = JobSpec {
            name: "NTC".to_string(),
            working_directory: PathBuf::from("/tmp/NTC"),
            entry_script: None,
            timeout_secs: 300,
            category: Category::standard(),
        };
        let outcome = JobOutcome::not_launched(&spec, JobStatus::FolderNotFound, "missing");

        assert_eq!(outcome.timeout_secs, 300);
        assert_eq!(outcome.new_records, 0);
        assert_eq!(outcome.execution_ms, 0);
        assert_eq!(outcome.error.as_deref(), Some("missing"));
    }
}
