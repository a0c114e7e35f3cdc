//! Batch report - aggregation, exit code and the text summary

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use uuid::Uuid;

use crate::application::constants::{SUMMARY_ERROR_MAX_CHARS, SUMMARY_NAME_WIDTH};
use crate::domain::JobOutcome;

const RULE: &str = "==================================================";

/// Outcomes of one batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<JobOutcome>,
    pub interrupted: bool,
}

impl BatchReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: started_at,
            outcomes: Vec::new(),
            interrupted: false,
        }
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status.is_success()).count()
    }

    /// Every status other than `success` counts as a failure
    pub fn failed_count(&self) -> usize {
        self.total() - self.success_count()
    }

    pub fn total_new_records(&self) -> usize {
        self.outcomes.iter().map(|o| o.new_records).sum()
    }

    /// Sum of per-job execution time (exceeds wall time in parallel mode)
    pub fn total_execution_ms(&self) -> i64 {
        self.outcomes.iter().map(|o| o.execution_ms).sum()
    }

    pub fn wall_time_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    pub fn success_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        self.success_count() as f64 / self.total() as f64 * 100.0
    }

    /// Status name -> count, sorted by name
    pub fn status_breakdown(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for outcome in &self.outcomes {
            *counts.entry(outcome.status.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Timeout (secs) -> count, sorted numerically
    pub fn timeout_breakdown(&self) -> BTreeMap<u64, usize> {
        let mut counts = BTreeMap::new();
        for outcome in &self.outcomes {
            *counts.entry(outcome.timeout_secs).or_insert(0) += 1;
        }
        counts
    }

    fn majority_failed(&self) -> bool {
        self.failed_count() > self.total() / 2
    }

    /// Process exit code for the whole batch
    ///
    /// - `2`: every job failed
    /// - `1`: more than half failed, the batch was interrupted, or nothing ran
    /// - `0`: otherwise
    pub fn exit_code(&self) -> i32 {
        if self.interrupted || self.outcomes.is_empty() {
            return 1;
        }
        let failed = self.failed_count();
        if failed == self.total() {
            2
        } else if self.majority_failed() {
            1
        } else {
            0
        }
    }

    /// Email subject line
    pub fn subject(&self) -> String {
        let failed = self.failed_count();
        let total = self.total();
        let new_records = self.total_new_records();
        if self.majority_failed() {
            format!(
                "🚨 REGULATORY SCRAPING CRITICAL - {}/{} failures, {} new records",
                failed, total, new_records
            )
        } else if failed > 0 {
            format!(
                "⚠️ REGULATORY SCRAPING PARTIAL - {}/{} failures, {} new records",
                failed, total, new_records
            )
        } else {
            format!(
                "✅ REGULATORY SCRAPING SUCCESS - {} new records, {:.1}% success rate",
                new_records,
                self.success_rate()
            )
        }
    }

    /// Plain-text summary (console, log, email body)
    pub fn summary_text(&self) -> String {
        let total_secs = self.total_execution_ms() as f64 / 1000.0;
        let mut out = String::new();

        // `write!` into a String cannot fail
        let _ = writeln!(out, "{RULE}");
        let _ = writeln!(out, "COMPREHENSIVE REGULATORY NEWS SCRAPING REPORT");
        let _ = writeln!(out, "{RULE}");
        let _ = writeln!(
            out,
            "Execution Time: {}",
            self.finished_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );
        let _ = writeln!(out, "Run ID: {}", self.run_id);
        let _ = writeln!(out, "Total Regulators: {}", self.total());
        let _ = writeln!(out, "Successful: {}", self.success_count());
        let _ = writeln!(out, "Failed: {}", self.failed_count());
        let _ = writeln!(out, "Total New Records: {}", self.total_new_records());
        let _ = writeln!(
            out,
            "Total Execution Time: {:.1}s ({:.1} minutes)",
            total_secs,
            total_secs / 60.0
        );
        if self.interrupted {
            let _ = writeln!(out, "Batch interrupted before completion");
        }

        let _ = writeln!(out, "\nSTATUS BREAKDOWN:\n{RULE}");
        for (status, count) in self.status_breakdown() {
            let _ = writeln!(out, "{}: {}", status.to_uppercase(), count);
        }

        let _ = writeln!(out, "\nTIMEOUT USAGE:\n{RULE}");
        for (timeout, count) in self.timeout_breakdown() {
            let _ = writeln!(out, "{}s: {} scrapers", timeout, count);
        }

        let _ = writeln!(out, "\nDETAILED RESULTS:\n{RULE}");
        let mut sorted: Vec<&JobOutcome> = self.outcomes.iter().collect();
        sorted.sort_by(|a, b| {
            (!a.status.is_success(), a.name.as_str()).cmp(&(!b.status.is_success(), b.name.as_str()))
        });
        for outcome in sorted {
            let name = pad_chars(&truncate_chars(&outcome.name, SUMMARY_NAME_WIDTH), SUMMARY_NAME_WIDTH);
            let time = format!("{:>5.1}s/{}s", outcome.execution_secs(), outcome.timeout_secs);
            if outcome.status.is_success() {
                let _ = writeln!(
                    out,
                    "✅ {} | New: {:>4} | Total: {:>6} | Time: {} | {}",
                    name,
                    outcome.new_records,
                    outcome.after_count,
                    time,
                    outcome.script_file.as_deref().unwrap_or("Unknown")
                );
            } else {
                let error = truncate_chars(
                    outcome.error.as_deref().unwrap_or("Unknown error"),
                    SUMMARY_ERROR_MAX_CHARS,
                );
                let _ = writeln!(
                    out,
                    "❌ {} | {}: {} | Time: {}",
                    name,
                    outcome.status.as_str().to_uppercase(),
                    error.replace('\n', " "),
                    time
                );
                if let Some(script) = &outcome.script_file {
                    let _ = writeln!(out, "    Script: {}", script);
                }
            }
        }
        let _ = writeln!(out, "{RULE}");

        let wall_secs = self.wall_time_ms() as f64 / 1000.0;
        let _ = writeln!(
            out,
            "Total execution completed in {:.1} seconds ({:.1} minutes)",
            wall_secs,
            wall_secs / 60.0
        );
        out
    }
}

/// First `max` chars of `s` (char-boundary safe)
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn pad_chars(s: &str, width: usize) -> String {
    let len = s.chars().count();
    if len >= width {
        s.to_string()
    } else {
        format!("{}{}", s, " ".repeat(width - len))
    }
}
