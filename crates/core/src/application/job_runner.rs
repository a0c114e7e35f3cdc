//! Job runner - the per-job contract
//!
//! resolve script -> count records before -> launch with timeout ->
//! re-scan outputs -> count records after -> classify outcome

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::application::constants::{
    DEFAULT_INTERPRETER, DEFAULT_SCRAPER_ENV, ERROR_MESSAGE_MAX_CHARS, OUTPUT_PREVIEW_CHARS,
    OUTPUT_SETTLE_DELAY,
};
use crate::application::report::truncate_chars;
use crate::application::shutdown::ShutdownToken;
use crate::domain::{JobOutcome, JobSpec, JobStatus};
use crate::port::{RunOutput, ScraperWorkspace, ScriptInvocation, ScriptRunner, Termination, TimeProvider};

/// How scripts are launched
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub interpreter: String,
    pub env: BTreeMap<String, String>,
    /// Wait after exit before re-scanning outputs
    pub settle_delay: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            interpreter: DEFAULT_INTERPRETER.to_string(),
            env: DEFAULT_SCRAPER_ENV
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            settle_delay: OUTPUT_SETTLE_DELAY,
        }
    }
}

/// Output file and its record count at one point in time
struct Snapshot {
    file: Option<String>,
    count: usize,
}

/// Runs one job and always produces an outcome
pub struct JobRunner {
    runner: Arc<dyn ScriptRunner>,
    workspace: Arc<dyn ScraperWorkspace>,
    time_provider: Arc<dyn TimeProvider>,
    settings: RunnerSettings,
}

impl JobRunner {
    pub fn new(
        runner: Arc<dyn ScriptRunner>,
        workspace: Arc<dyn ScraperWorkspace>,
        time_provider: Arc<dyn TimeProvider>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            runner,
            workspace,
            time_provider,
            settings,
        }
    }

    fn snapshot(&self, folder: &Path, modified_after_ms: Option<i64>) -> Snapshot {
        let latest = match modified_after_ms {
            // Prefer a file the job just wrote; fall back to whatever is newest
            Some(after) => self
                .workspace
                .latest_output(folder, Some(after))
                .or_else(|| self.workspace.latest_output(folder, None)),
            None => self.workspace.latest_output(folder, None),
        };
        match latest {
            Some(path) => Snapshot {
                count: self.workspace.count_records(&path),
                file: path.file_name().map(|n| n.to_string_lossy().into_owned()),
            },
            None => Snapshot { file: None, count: 0 },
        }
    }

    /// Run one job to an outcome (never fails)
    pub async fn run_job(&self, spec: &JobSpec, shutdown: ShutdownToken) -> JobOutcome {
        let folder = spec.working_directory.as_path();

        let script = match self
            .workspace
            .resolve_script(folder, spec.entry_script.as_deref())
        {
            Ok(path) => path,
            Err(reason) => {
                error!(job = %spec.name, reason = %reason, "Script not found");
                return JobOutcome::not_launched(spec, JobStatus::ScriptNotFound, reason);
            }
        };
        let script_file = script
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| script.display().to_string());

        let before = self.snapshot(folder, None);

        info!(
            job = %spec.name,
            folder = %folder.display(),
            script = %script_file,
            output_before = before.file.as_deref().unwrap_or("none"),
            records_before = before.count,
            timeout_secs = spec.timeout_secs,
            "Starting scraper"
        );

        let invocation = ScriptInvocation {
            program: self.settings.interpreter.clone(),
            args: vec![script_file.clone()],
            working_dir: spec.working_directory.clone(),
            env: self.settings.env.clone(),
            timeout: spec.timeout(),
        };

        let start_ms = self.time_provider.now_millis();
        let result = self.runner.run(&invocation, shutdown).await;

        if !self.settings.settle_delay.is_zero() {
            tokio::time::sleep(self.settings.settle_delay).await;
        }
        let after = self.snapshot(folder, Some(start_ms));
        let new_records = after.count.saturating_sub(before.count);

        let mut outcome = JobOutcome {
            name: spec.name.clone(),
            status: JobStatus::Exception,
            error: None,
            new_records,
            before_count: before.count,
            after_count: after.count,
            script_file: Some(script_file),
            output_file: after.file.or(before.file),
            execution_ms: 0,
            timeout_secs: spec.timeout_secs,
            category: spec.category.clone(),
        };

        match result {
            Ok(output) => {
                outcome.execution_ms = output.duration_ms;
                log_output_preview(&spec.name, &output);
                let (status, error) = classify(&output, spec.timeout_secs);
                outcome.status = status;
                outcome.error = error;
            }
            Err(e) => {
                outcome.execution_ms = self.time_provider.now_millis() - start_ms;
                outcome.error = Some(format!("Exception occurred: {}", e));
            }
        }

        match outcome.status {
            JobStatus::Success => info!(
                job = %outcome.name,
                records_before = outcome.before_count,
                records_after = outcome.after_count,
                new_records = outcome.new_records,
                execution_ms = outcome.execution_ms,
                "Scraper succeeded"
            ),
            status => error!(
                job = %outcome.name,
                status = %status,
                error = %truncate_chars(outcome.error.as_deref().unwrap_or(""), 100),
                execution_ms = outcome.execution_ms,
                "Scraper did not succeed"
            ),
        }

        outcome
    }
}

/// Map a finished process onto the status taxonomy
fn classify(output: &RunOutput, timeout_secs: u64) -> (JobStatus, Option<String>) {
    match &output.termination {
        Termination::Exited(0) => (JobStatus::Success, None),
        Termination::Exited(code) => (
            JobStatus::Failed,
            Some(failure_message(output, &format!("Script exited with code {}", code))),
        ),
        Termination::Signaled(signal) => {
            let fallback = match signal {
                Some(sig) => format!("Script terminated by signal {}", sig),
                None => "Script terminated by a signal".to_string(),
            };
            (JobStatus::Failed, Some(failure_message(output, &fallback)))
        }
        Termination::TimedOut => (
            JobStatus::Timeout,
            Some(format!("Script timeout after {} seconds", timeout_secs)),
        ),
        Termination::Interrupted => {
            warn!("Scraper interrupted by batch shutdown");
            (
                JobStatus::Exception,
                Some("Exception occurred: interrupted by shutdown".to_string()),
            )
        }
    }
}

/// stderr, else stdout, else the fallback; trimmed and truncated
fn failure_message(output: &RunOutput, fallback: &str) -> String {
    let stderr = output.stderr.trim();
    let stdout = output.stdout.trim();
    let message = if !stderr.is_empty() {
        stderr
    } else if !stdout.is_empty() {
        stdout
    } else {
        fallback
    };
    truncate_chars(message, ERROR_MESSAGE_MAX_CHARS)
}

fn log_output_preview(job: &str, output: &RunOutput) {
    if !output.stdout.is_empty() {
        debug!(job = %job, stdout = %truncate_chars(&output.stdout, OUTPUT_PREVIEW_CHARS), "Scraper stdout");
    }
    if !output.stderr.is_empty() {
        debug!(job = %job, stderr = %truncate_chars(&output.stderr, OUTPUT_PREVIEW_CHARS), "Scraper stderr");
    }
}
