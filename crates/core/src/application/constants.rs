// Orchestrator constants (No magic values)
use std::collections::BTreeMap;
use std::time::Duration;

/// Timeout for jobs whose category has no entry in the timeout table (5 minutes)
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Built-in category timeout table
pub const DEFAULT_CATEGORY_TIMEOUTS: [(&str, u64); 4] = [
    ("standard", 300), // most scrapers
    ("heavy", 600),    // JavaScript/PDF heavy
    ("complex", 480),
    ("quick", 180),
];

pub fn default_category_timeouts() -> BTreeMap<String, u64> {
    DEFAULT_CATEGORY_TIMEOUTS
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect()
}

/// Default parallel worker count
/// Kept small so target sites do not see a burst from one host
pub const DEFAULT_MAX_WORKERS: usize = 3;

/// Pause between sequential jobs so the host can settle (2s)
pub const DEFAULT_INTER_JOB_PAUSE: Duration = Duration::from_secs(2);

/// Wait after process exit before re-scanning outputs (500ms)
pub const OUTPUT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Grace period between SIGTERM and SIGKILL for a timed-out process group (2s)
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// Liveness poll interval while waiting for a terminated group to exit
pub const KILL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Grace period for stray browser processes before SIGKILL (5s)
pub const BROWSER_KILL_GRACE: Duration = Duration::from_secs(5);

/// Maximum time to wait for stdout/stderr readers after the process is gone
pub const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Interpreter used to launch scraper scripts
pub const DEFAULT_INTERPRETER: &str = "python3";

/// File extension of scraper entry scripts
pub const DEFAULT_SCRIPT_EXTENSION: &str = "py";

/// Stems containing any of these are not treated as the main script
pub const SCRIPT_EXCLUDED_KEYWORDS: [&str; 10] = [
    "test",
    "util",
    "helper",
    "config",
    "__",
    "orchestrator",
    "wrapper",
    "setup",
    "install",
    "requirements",
];

/// Keys checked (in order) when a JSON output is an object wrapping the records
pub const NESTED_RECORD_KEYS: [&str; 8] = [
    "data", "records", "items", "results", "articles", "news", "releases", "entries",
];

/// Maximum stored error message length (chars)
pub const ERROR_MESSAGE_MAX_CHARS: usize = 500;

/// Maximum error length shown per row in the summary (chars)
pub const SUMMARY_ERROR_MAX_CHARS: usize = 60;

/// Width of the name column in the summary
pub const SUMMARY_NAME_WIDTH: usize = 30;

/// Stdout/stderr preview length in debug logs (chars)
pub const OUTPUT_PREVIEW_CHARS: usize = 500;

/// Environment added to every scraper process
pub const DEFAULT_SCRAPER_ENV: [(&str, &str); 3] = [
    ("PYTHONUNBUFFERED", "1"),
    ("PYTHONIOENCODING", "utf-8"),
    ("CHROME_HEADLESS", "1"),
];
