//! Batch planning - turns configured regulator entries into runnable jobs
//!
//! Order of operations:
//! 1. name filter (include / exclude patterns)
//! 2. category filter
//! 3. timeout resolution (explicit > category table > default) and multiplier
//! 4. folder validation (missing folders become `folder_not_found` outcomes)
//! 5. expansion of multi-script entries into one job per script

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::constants::{default_category_timeouts, DEFAULT_TIMEOUT_SECS};
use crate::domain::{Category, DomainError, JobEntry, JobOutcome, JobSpec, JobStatus};
use crate::error::Result;
use crate::port::ScraperWorkspace;

/// Knobs that shape the plan (CLI + config)
#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// Empty means every category
    pub categories: Vec<Category>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub timeout_multiplier: f64,
    pub category_timeouts: BTreeMap<String, u64>,
    pub default_timeout_secs: u64,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            include: Vec::new(),
            exclude: Vec::new(),
            timeout_multiplier: 1.0,
            category_timeouts: default_category_timeouts(),
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Jobs to run plus entries rejected before launch
#[derive(Debug, Clone, Default)]
pub struct BatchPlan {
    pub jobs: Vec<JobSpec>,
    pub skipped: Vec<JobOutcome>,
}

impl BatchPlan {
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn category_breakdown(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for job in &self.jobs {
            *counts.entry(job.category.to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn timeout_breakdown(&self) -> BTreeMap<u64, usize> {
        let mut counts = BTreeMap::new();
        for job in &self.jobs {
            *counts.entry(job.timeout_secs).or_insert(0) += 1;
        }
        counts
    }

    /// One line per job, as shown by a dry run
    pub fn describe(&self) -> Vec<String> {
        self.jobs
            .iter()
            .map(|job| {
                format!(
                    "Would run: {} (timeout: {}s, category: {}, folder: {})",
                    job.name,
                    job.timeout_secs,
                    job.category,
                    job.working_directory.display()
                )
            })
            .collect()
    }
}

/// Keep entries whose display name matches (case-insensitive substring)
///
/// `include` keeps entries matching any pattern; `exclude` then drops
/// entries matching any pattern. Empty lists do not filter.
pub fn filter_by_name(entries: Vec<JobEntry>, include: &[String], exclude: &[String]) -> Vec<JobEntry> {
    let include: Vec<String> = include.iter().map(|p| p.to_lowercase()).collect();
    let exclude: Vec<String> = exclude.iter().map(|p| p.to_lowercase()).collect();

    entries
        .into_iter()
        .filter(|entry| {
            let name = entry.name.to_lowercase();
            let included = include.is_empty() || include.iter().any(|p| name.contains(p.as_str()));
            let excluded = exclude.iter().any(|p| name.contains(p.as_str()));
            included && !excluded
        })
        .collect()
}

/// Timeout for an entry before any multiplier
pub fn resolve_timeout(entry: &JobEntry, table: &BTreeMap<String, u64>, default_secs: u64) -> u64 {
    entry.timeout_secs.unwrap_or_else(|| {
        table
            .get(entry.category_or_default().as_str())
            .copied()
            .unwrap_or(default_secs)
    })
}

/// Scale a timeout, never going below one second
pub fn scale_timeout(timeout_secs: u64, multiplier: f64) -> u64 {
    ((timeout_secs as f64 * multiplier).floor() as u64).max(1)
}

/// Builds a [`BatchPlan`] against a workspace rooted at `base_dir`
pub struct JobPlanner {
    workspace: Arc<dyn ScraperWorkspace>,
    base_dir: PathBuf,
    options: PlanOptions,
}

impl JobPlanner {
    pub fn new(workspace: Arc<dyn ScraperWorkspace>, base_dir: impl Into<PathBuf>, options: PlanOptions) -> Self {
        Self {
            workspace,
            base_dir: base_dir.into(),
            options,
        }
    }

    /// Build the plan
    ///
    /// # Errors
    /// - `DomainError::InvalidMultiplier` for a non-positive or non-finite multiplier
    /// - `DomainError::InvalidJobEntry` for malformed entries
    pub fn plan(&self, entries: Vec<JobEntry>) -> Result<BatchPlan> {
        let multiplier = self.options.timeout_multiplier;
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(DomainError::InvalidMultiplier(multiplier).into());
        }
        for entry in &entries {
            entry.validate()?;
        }

        let configured = entries.len();
        let entries = filter_by_name(entries, &self.options.include, &self.options.exclude);
        if entries.len() != configured {
            info!(
                configured = configured,
                selected = entries.len(),
                "Filtered regulators by include/exclude patterns"
            );
        }

        let mut plan = BatchPlan::default();
        for entry in entries {
            let category = entry.category_or_default();
            if !self.options.categories.is_empty() && !self.options.categories.contains(&category) {
                continue;
            }

            let timeout_secs = scale_timeout(
                resolve_timeout(
                    &entry,
                    &self.options.category_timeouts,
                    self.options.default_timeout_secs,
                ),
                multiplier,
            );
            let folder = self.base_dir.join(&entry.folder);

            if !self.workspace.folder_exists(&folder) {
                warn!(job = %entry.name, folder = %folder.display(), "Skipping job: folder not found");
                let spec = JobSpec {
                    name: entry.name.clone(),
                    working_directory: folder.clone(),
                    entry_script: None,
                    timeout_secs,
                    category,
                };
                plan.skipped.push(JobOutcome::not_launched(
                    &spec,
                    JobStatus::FolderNotFound,
                    format!("Folder not found: {}", folder.display()),
                ));
                continue;
            }

            match &entry.scripts {
                Some(scripts) => {
                    for script in scripts {
                        plan.jobs.push(JobSpec {
                            name: format!("{} ({})", entry.name, script),
                            working_directory: folder.clone(),
                            entry_script: Some(script.clone()),
                            timeout_secs,
                            category: category.clone(),
                        });
                    }
                }
                None => plan.jobs.push(JobSpec {
                    name: entry.name.clone(),
                    working_directory: folder,
                    entry_script: None,
                    timeout_secs,
                    category,
                }),
            }
        }

        info!(
            jobs = plan.jobs.len(),
            skipped = plan.skipped.len(),
            categories = ?plan.category_breakdown(),
            timeouts = ?plan.timeout_breakdown(),
            "Batch plan ready"
        );
        Ok(plan)
    }
}
