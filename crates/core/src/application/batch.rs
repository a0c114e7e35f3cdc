//! Batch orchestration - sequential or bounded-parallel execution of a plan
//!
//! Every job runs inside its own spawned task so a panic in one job becomes
//! an `exception` outcome instead of taking the batch down.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::application::constants::{DEFAULT_INTER_JOB_PAUSE, DEFAULT_MAX_WORKERS};
use crate::application::job_runner::JobRunner;
use crate::application::plan::BatchPlan;
use crate::application::report::BatchReport;
use crate::application::shutdown::ShutdownToken;
use crate::domain::{JobOutcome, JobSpec, JobStatus};
use crate::port::{ProcessReaper, TimeProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One job at a time, stray browsers reaped between jobs
    Sequential,
    /// At most `max_workers` jobs at a time
    Parallel { max_workers: usize },
}

impl ExecutionMode {
    pub fn parallel(max_workers: usize) -> Self {
        Self::Parallel {
            max_workers: max_workers.max(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub mode: ExecutionMode,
    /// Pause between sequential jobs
    pub inter_job_pause: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::parallel(DEFAULT_MAX_WORKERS),
            inter_job_pause: DEFAULT_INTER_JOB_PAUSE,
        }
    }
}

pub struct BatchOrchestrator {
    job_runner: Arc<JobRunner>,
    reaper: Arc<dyn ProcessReaper>,
    time_provider: Arc<dyn TimeProvider>,
    settings: BatchSettings,
}

impl BatchOrchestrator {
    pub fn new(
        job_runner: Arc<JobRunner>,
        reaper: Arc<dyn ProcessReaper>,
        time_provider: Arc<dyn TimeProvider>,
        settings: BatchSettings,
    ) -> Self {
        Self {
            job_runner,
            reaper,
            time_provider,
            settings,
        }
    }

    /// Run every job of the plan and aggregate the outcomes
    ///
    /// Outcomes of entries skipped at planning time come first, followed by
    /// one outcome per launched job in plan order.
    pub async fn run(&self, plan: BatchPlan, shutdown: ShutdownToken) -> BatchReport {
        let mut report = BatchReport::new(self.time_provider.now());
        report.outcomes.extend(plan.skipped);

        info!(
            run_id = %report.run_id,
            jobs = plan.jobs.len(),
            mode = ?self.settings.mode,
            "Starting batch"
        );

        self.reap("batch start").await;

        let outcomes = match self.settings.mode {
            ExecutionMode::Sequential => self.run_sequential(plan.jobs, shutdown.clone()).await,
            ExecutionMode::Parallel { max_workers } => {
                self.run_parallel(plan.jobs, max_workers, shutdown.clone()).await
            }
        };
        report.outcomes.extend(outcomes);

        self.reap("batch end").await;

        report.interrupted = shutdown.is_shutdown();
        report.finished_at = self.time_provider.now();

        info!(
            run_id = %report.run_id,
            total = report.total(),
            succeeded = report.success_count(),
            failed = report.failed_count(),
            new_records = report.total_new_records(),
            interrupted = report.interrupted,
            "Batch finished"
        );
        report
    }

    async fn reap(&self, stage: &str) {
        let reaped = self.reaper.reap_strays().await;
        if reaped > 0 {
            info!(stage = stage, reaped = reaped, "Terminated stray browser processes");
        }
    }

    async fn run_sequential(&self, jobs: Vec<JobSpec>, mut shutdown: ShutdownToken) -> Vec<JobOutcome> {
        let total = jobs.len();
        let mut outcomes = Vec::with_capacity(total);

        for (index, job) in jobs.into_iter().enumerate() {
            if shutdown.is_shutdown() {
                warn!(remaining = total - index, "Shutdown requested, not starting remaining jobs");
                break;
            }

            self.reap("before job").await;
            info!(job = %job.name, position = index + 1, total = total, "Running job");

            outcomes.push(run_isolated(Arc::clone(&self.job_runner), job, shutdown.clone()).await);

            if index + 1 < total && !self.settings.inter_job_pause.is_zero() {
                tokio::select! {
                    _ = sleep(self.settings.inter_job_pause) => {},
                    _ = shutdown.wait() => {}
                }
            }
        }
        outcomes
    }

    async fn run_parallel(
        &self,
        jobs: Vec<JobSpec>,
        max_workers: usize,
        shutdown: ShutdownToken,
    ) -> Vec<JobOutcome> {
        let semaphore = Arc::new(Semaphore::new(max_workers.max(1)));
        let mut set = JoinSet::new();

        for (index, job) in jobs.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let job_runner = Arc::clone(&self.job_runner);
            let shutdown = shutdown.clone();

            set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                if shutdown.is_shutdown() {
                    return None;
                }
                Some((index, run_isolated(job_runner, job, shutdown).await))
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Some(entry)) => outcomes.push(entry),
                Ok(None) => {}
                // run_isolated already catches job panics
                Err(e) => error!(error = %e, "Batch worker task failed"),
            }
        }

        outcomes.sort_by_key(|(index, _)| *index);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }
}

/// Run one job in its own task, mapping a panic to an `exception` outcome
async fn run_isolated(job_runner: Arc<JobRunner>, job: JobSpec, shutdown: ShutdownToken) -> JobOutcome {
    let spec = job.clone();
    let handle = tokio::task::spawn(async move { job_runner.run_job(&job, shutdown).await });

    match handle.await {
        Ok(outcome) => outcome,
        Err(join_err) => {
            let message = panic_message(join_err);
            error!(job = %spec.name, error = %message, "Job task aborted");
            JobOutcome::not_launched(
                &spec,
                JobStatus::Exception,
                format!("Exception occurred: {}", message),
            )
        }
    }
}

fn panic_message(join_err: JoinError) -> String {
    if !join_err.is_panic() {
        return "job task cancelled".to_string();
    }
    let payload = join_err.into_panic();
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "job panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::job_runner::RunnerSettings;
    use crate::application::shutdown::shutdown_channel;
    use crate::domain::Category;
    use crate::port::process_reaper::mocks::CountingReaper;
    use crate::port::script_runner::mocks::{MockBehavior, MockScriptRunner};
    use crate::port::time_provider::SystemTimeProvider;
    use crate::port::workspace::mocks::MockWorkspace;
    use std::path::PathBuf;

    fn job(name: &str, script: &str) -> JobSpec {
        JobSpec {
            name: name.to_string(),
            working_directory: PathBuf::from("/scripts/REG"),
            entry_script: Some(script.to_string()),
            timeout_secs: 60,
            category: Category::standard(),
        }
    }

    fn plan(jobs: Vec<JobSpec>) -> BatchPlan {
        BatchPlan {
            jobs,
            skipped: Vec::new(),
        }
    }

    fn orchestrator(
        runner: MockScriptRunner,
        mode: ExecutionMode,
    ) -> (BatchOrchestrator, Arc<CountingReaper>) {
        let ws = MockWorkspace::new();
        ws.add_folder("/scripts/REG", &["a.py", "b.py", "c.py", "d.py"]);
        let job_runner = JobRunner::new(
            Arc::new(runner),
            Arc::new(ws),
            Arc::new(SystemTimeProvider),
            RunnerSettings {
                settle_delay: Duration::ZERO,
                ..RunnerSettings::default()
            },
        );
        let reaper = Arc::new(CountingReaper::new());
        let orchestrator = BatchOrchestrator::new(
            Arc::new(job_runner),
            reaper.clone(),
            Arc::new(SystemTimeProvider),
            BatchSettings {
                mode,
                inter_job_pause: Duration::ZERO,
            },
        );
        (orchestrator, reaper)
    }

    #[tokio::test]
    async fn test_sequential_runs_every_job_and_reaps_between() {
        let runner = MockScriptRunner::new_success().with_script("b.py", MockBehavior::Timeout);
        let (orchestrator, reaper) = orchestrator(runner, ExecutionMode::Sequential);

        let report = orchestrator
            .run(
                plan(vec![job("A", "a.py"), job("B", "b.py"), job("C", "c.py")]),
                ShutdownToken::never(),
            )
            .await;

        let statuses: Vec<JobStatus> = report.outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![JobStatus::Success, JobStatus::Timeout, JobStatus::Success]
        );
        // start + one per job + end
        assert_eq!(reaper.calls(), 5);
        assert!(!report.interrupted);
        assert_eq!(report.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_parallel_keeps_plan_order() {
        let runner = MockScriptRunner::new_success()
            .with_script("a.py", MockBehavior::Exit(1, "boom".to_string()));
        let (orchestrator, reaper) = orchestrator(runner, ExecutionMode::parallel(2));

        let report = orchestrator
            .run(
                plan(vec![
                    job("A", "a.py"),
                    job("B", "b.py"),
                    job("C", "c.py"),
                    job("D", "d.py"),
                ]),
                ShutdownToken::never(),
            )
            .await;

        let names: Vec<&str> = report.outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C", "D"]);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(reaper.calls(), 2);
    }

    #[tokio::test]
    async fn test_panicking_job_becomes_exception() {
        for mode in [ExecutionMode::Sequential, ExecutionMode::parallel(3)] {
            let runner = MockScriptRunner::new_success()
                .with_script("b.py", MockBehavior::Panic("scraper exploded".to_string()));
            let (orchestrator, _) = orchestrator(runner, mode);
            let report = orchestrator
                .run(
                    plan(vec![job("A", "a.py"), job("B", "b.py"), job("C", "c.py")]),
                    ShutdownToken::never(),
                )
                .await;

            assert_eq!(report.total(), 3);
            assert_eq!(report.outcomes[1].status, JobStatus::Exception);
            assert_eq!(
                report.outcomes[1].error.as_deref(),
                Some("Exception occurred: scraper exploded")
            );
            assert_eq!(report.success_count(), 2);
        }
    }

    #[tokio::test]
    async fn test_skipped_outcomes_come_first() {
        let (orchestrator, _) = orchestrator(MockScriptRunner::new_success(), ExecutionMode::Sequential);
        let missing = job("Missing", "x.py");
        let mut batch = plan(vec![job("A", "a.py")]);
        batch.skipped.push(JobOutcome::not_launched(
            &missing,
            JobStatus::FolderNotFound,
            "Folder not found: /scripts/Missing",
        ));

        let report = orchestrator.run(batch, ShutdownToken::never()).await;
        assert_eq!(report.outcomes[0].status, JobStatus::FolderNotFound);
        assert_eq!(report.outcomes[1].status, JobStatus::Success);
        assert_eq!(report.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_running_and_skips_rest() {
        let runner = MockScriptRunner::new(MockBehavior::Hang);
        let (orchestrator, _) = orchestrator(runner, ExecutionMode::Sequential);
        let (sender, token) = shutdown_channel();

        let batch = plan(vec![job("A", "a.py"), job("B", "b.py")]);
        let run = tokio::spawn(async move { orchestrator.run(batch, token).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        sender.shutdown();

        let report = run.await.unwrap();
        assert!(report.interrupted);
        assert_eq!(report.total(), 1);
        assert_eq!(report.outcomes[0].status, JobStatus::Exception);
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_empty_plan_exit_code() {
        let (orchestrator, _) = orchestrator(MockScriptRunner::new_success(), ExecutionMode::Sequential);
        let report = orchestrator.run(plan(Vec::new()), ShutdownToken::never()).await;
        assert_eq!(report.total(), 0);
        assert_eq!(report.exit_code(), 1);
    }
}
