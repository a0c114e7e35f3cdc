//! Regwatch - regulatory scraper batch orchestrator
//!
//! Plans the configured regulator jobs, runs each scraper as a supervised
//! subprocess, reports record deltas and emails the summary.

mod cli;
mod config;
mod logging;
mod telemetry;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::{Table, Tabled};
use tracing::{error, info, warn};

use regwatch_core::application::{
    shutdown_channel, BatchOrchestrator, BatchPlan, BatchReport, BatchSettings, ExecutionMode,
    JobPlanner, JobRunner, PlanOptions, RunnerSettings,
};
use regwatch_core::domain::Category;
use regwatch_core::port::time_provider::SystemTimeProvider;
use regwatch_core::port::{NoopNotifier, NotifyError, ReportNotifier};
use regwatch_infra_mail::{SmtpNotifier, SmtpSettings};
use regwatch_infra_system::{BrowserReaper, FsWorkspace, JsonRecordStore, SubprocessRunner};

use crate::cli::{Cli, Command, RunArgs};
use crate::config::OrchestratorConfig;
use crate::logging::LogOptions;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Tabled)]
struct PlanRow {
    job: String,
    category: String,
    timeout: String,
    folder: String,
    script: String,
}

#[derive(Tabled)]
struct SkippedRow {
    job: String,
    status: String,
    reason: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let code = match cli.command {
        Some(Command::MergeRecords {
            store,
            input,
            max_backups,
        }) => merge_records(&store, &input, max_backups)?,
        None => run_batch(cli.run).await?,
    };

    std::process::exit(code);
}

/// What a batch invocation does once its plan is known
enum RunPlan {
    /// Nothing to run; exit with this code
    Exit(i32),
    /// List the plan, launch nothing
    DryRun(BatchPlan),
    Execute(BatchPlan),
}

/// Per-run log file directory; dry runs and a missing base dir write nothing
fn log_file_dir(args: &RunArgs, config: &OrchestratorConfig, base_dir: &Path) -> Option<PathBuf> {
    (!args.dry_run && base_dir.is_dir()).then(|| config.resolve_log_dir(base_dir))
}

fn plan_run(args: &RunArgs, config: &OrchestratorConfig, base_dir: &Path) -> Result<RunPlan> {
    if !base_dir.is_dir() {
        error!(base_dir = %base_dir.display(), "Base directory not found");
        return Ok(RunPlan::Exit(1));
    }

    let options = PlanOptions {
        categories: args.categories.iter().map(Category::new).collect(),
        include: args.include.clone(),
        exclude: args.exclude.clone(),
        timeout_multiplier: args.timeout_multiplier,
        category_timeouts: config.category_timeouts.clone(),
        default_timeout_secs: config.default_timeout_secs,
    };
    if args.timeout_multiplier != 1.0 {
        info!(multiplier = args.timeout_multiplier, "Applied timeout multiplier");
    }

    let workspace = Arc::new(FsWorkspace::new(config.script_extension.clone()));
    let plan = JobPlanner::new(workspace, base_dir, options)
        .plan(config.jobs.clone())
        .context("Invalid job table")?;

    if plan.jobs.is_empty() {
        if plan.skipped.is_empty() {
            error!("No valid scraper configurations found");
        } else {
            for outcome in &plan.skipped {
                warn!(job = %outcome.name, "{}", outcome.error.as_deref().unwrap_or("skipped"));
            }
            error!(
                skipped = plan.skipped.len(),
                "No runnable scrapers: every configured folder is missing"
            );
        }
        return Ok(RunPlan::Exit(1));
    }

    Ok(if args.dry_run {
        RunPlan::DryRun(plan)
    } else {
        RunPlan::Execute(plan)
    })
}

async fn run_batch(args: RunArgs) -> Result<i32> {
    let config = OrchestratorConfig::load(args.config.as_deref())?;
    let base_dir = config.resolve_base_dir(args.base_dir.as_deref());

    let log_guard = logging::init(&LogOptions {
        verbose: args.verbose,
        quiet: args.quiet,
        file_dir: log_file_dir(&args, &config, &base_dir),
    })?;

    info!("Regwatch v{} starting...", VERSION);
    info!(
        base_dir = %base_dir.display(),
        log_file = ?log_guard.file_path,
        mode = if args.parallel { "parallel" } else { "sequential" },
        dry_run = args.dry_run,
        "Configuration loaded"
    );

    let plan = match plan_run(&args, &config, &base_dir)? {
        RunPlan::Exit(code) => return Ok(code),
        RunPlan::DryRun(plan) => {
            print_plan(&plan);
            return Ok(0);
        }
        RunPlan::Execute(plan) => plan,
    };

    let time_provider = Arc::new(SystemTimeProvider);
    let job_runner = Arc::new(JobRunner::new(
        Arc::new(SubprocessRunner::new(time_provider.clone(), config.kill_grace())),
        Arc::new(FsWorkspace::new(config.script_extension.clone())),
        time_provider.clone(),
        RunnerSettings {
            interpreter: config.interpreter.clone(),
            env: config.env.clone(),
            ..RunnerSettings::default()
        },
    ));

    let mode = if args.parallel {
        let workers = args.max_workers.map_or(config.max_workers, |n| n as usize);
        ExecutionMode::parallel(workers)
    } else {
        ExecutionMode::Sequential
    };
    let orchestrator = BatchOrchestrator::new(
        job_runner,
        Arc::new(BrowserReaper::new(config.browser_cleanup.clone().into())),
        time_provider,
        BatchSettings {
            mode,
            inter_job_pause: config.inter_job_pause(),
        },
    );

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown signal received, terminating running scrapers...");
            shutdown_tx.shutdown();
        }
    });

    let report = orchestrator.run(plan, shutdown_rx).await;

    let summary = report.summary_text();
    info!("Execution summary:\n{}", summary);
    if !args.quiet {
        println!("{}", summary);
    }

    let notifier = select_notifier(args.no_email, SmtpSettings::from_env);
    let code = deliver_report(notifier.as_ref(), &report).await;
    print_exit(code, report.interrupted);
    info!(exit_code = code, "Final exit code");

    telemetry::shutdown();
    drop(log_guard);
    Ok(code)
}

fn print_plan(plan: &BatchPlan) {
    info!("DRY RUN MODE - No scrapers will be executed");
    for line in plan.describe() {
        info!("{}", line);
    }

    let rows: Vec<PlanRow> = plan
        .jobs
        .iter()
        .map(|job| PlanRow {
            job: job.name.clone(),
            category: job.category.to_string(),
            timeout: format!("{}s", job.timeout_secs),
            folder: job.working_directory.display().to_string(),
            script: job.entry_script.clone().unwrap_or_else(|| "(auto)".to_string()),
        })
        .collect();
    println!("{}", Table::new(rows));

    if !plan.skipped.is_empty() {
        let skipped: Vec<SkippedRow> = plan
            .skipped
            .iter()
            .map(|outcome| SkippedRow {
                job: outcome.name.clone(),
                status: outcome.status.to_string(),
                reason: outcome.error.clone().unwrap_or_default(),
            })
            .collect();
        println!("{}", Table::new(skipped));
    }

    println!(
        "{} {} jobs would run, {} skipped",
        "DRY RUN:".bold(),
        plan.jobs.len(),
        plan.skipped.len()
    );
}

fn select_notifier(
    disabled: bool,
    settings: impl FnOnce() -> Result<SmtpSettings, NotifyError>,
) -> Box<dyn ReportNotifier> {
    if disabled {
        info!("Email notifications disabled");
        return Box::new(NoopNotifier);
    }
    match settings() {
        Ok(settings) => Box::new(SmtpNotifier::new(settings)),
        Err(e) => {
            warn!(error = %e, "Email not configured, skipping report email");
            Box::new(NoopNotifier)
        }
    }
}

/// Send the report; the exit code depends only on the outcomes
async fn deliver_report(notifier: &dyn ReportNotifier, report: &BatchReport) -> i32 {
    if let Err(e) = notifier.send_report(report).await {
        error!(error = %e, "Failed to send report email");
    }
    report.exit_code()
}

fn print_exit(code: i32, interrupted: bool) {
    let message = match code {
        0 => "✓ SUCCESS - All scrapers completed successfully or with minor issues".green(),
        1 if interrupted => "✗ INTERRUPTED - Batch stopped before completion".yellow(),
        1 => "✗ PARTIAL FAILURE - More than half of the scrapers failed".yellow(),
        _ => "✗ CRITICAL FAILURE - All scrapers failed".red(),
    };
    eprintln!("{}", message.bold());
}

fn merge_records(store_path: &Path, input: &Path, max_backups: usize) -> Result<i32> {
    let _guard = logging::init(&LogOptions::default())?;

    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let incoming: Vec<serde_json::Value> =
        serde_json::from_str(&text).with_context(|| format!("{} is not a JSON array", input.display()))?;

    let mut store = JsonRecordStore::open(store_path, max_backups)
        .with_context(|| format!("Failed to open record store {}", store_path.display()))?;
    let now = Utc::now();
    let stats = store.merge(incoming, now);
    let backup = store.save(now).context("Failed to save record store")?;

    println!(
        "{} {} added, {} updated, {} duplicates, {} rejected ({} total)",
        "✓".green(),
        stats.added,
        stats.updated,
        stats.duplicates,
        stats.rejected,
        store.len()
    );
    if let Some(backup) = backup {
        println!("  Backup: {}", backup.display());
    }
    Ok(0)
}
