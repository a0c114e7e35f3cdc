// Stray browser reaper implementation
// reason: sysinfo for cross-platform process table access
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysinfo::{Pid, Process, Signal, System};
use tracing::{debug, info, warn};

use regwatch_core::application::constants::{BROWSER_KILL_GRACE, KILL_POLL_INTERVAL};
use regwatch_core::port::ProcessReaper;

/// Which processes count as stray automation browsers
#[derive(Debug, Clone)]
pub struct BrowserPattern {
    /// Case-insensitive substring of the process name
    pub name_contains: String,
    /// At least one must appear in the command line, ignoring case
    pub cmdline_markers: Vec<String>,
}

impl Default for BrowserPattern {
    fn default() -> Self {
        Self {
            name_contains: "chrome".to_string(),
            cmdline_markers: vec![
                "headless".to_string(),
                "disable-dev-shm-usage".to_string(),
                "no-sandbox".to_string(),
            ],
        }
    }
}

impl BrowserPattern {
    pub fn matches(&self, name: &str, cmdline: &[String]) -> bool {
        if !name.to_lowercase().contains(&self.name_contains.to_lowercase()) {
            return false;
        }
        let markers: Vec<String> = self.cmdline_markers.iter().map(|m| m.to_lowercase()).collect();
        cmdline.iter().any(|arg| {
            let arg = arg.to_lowercase();
            markers.iter().any(|m| arg.contains(m.as_str()))
        })
    }
}

/// Reaper backed by the sysinfo process table
pub struct BrowserReaper {
    system: Arc<Mutex<System>>,
    pattern: BrowserPattern,
    grace: Duration,
}

impl BrowserReaper {
    pub fn new(pattern: BrowserPattern) -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
            pattern,
            grace: BROWSER_KILL_GRACE,
        }
    }

    fn matching_pids(&self) -> Vec<Pid> {
        let Ok(mut sys) = self.system.lock() else {
            warn!("Process table lock poisoned, skipping reap");
            return Vec::new();
        };
        sys.refresh_processes();
        let own = sysinfo::get_current_pid().ok();

        sys.processes()
            .iter()
            .filter(|(pid, _)| Some(**pid) != own)
            .filter(|(_, process)| self.pattern.matches(process.name(), process.cmd()))
            .map(|(pid, _)| *pid)
            .collect()
    }

    fn signal(&self, pid: Pid, force: bool) -> bool {
        let Ok(mut sys) = self.system.lock() else {
            return false;
        };
        if !sys.refresh_process(pid) {
            return false;
        }
        sys.process(pid).map_or(false, |process: &Process| {
            if force {
                process.kill()
            } else {
                // Fall back to the platform default when SIGTERM is unsupported
                process.kill_with(Signal::Term).unwrap_or_else(|| process.kill())
            }
        })
    }

    fn alive(&self, pid: Pid) -> bool {
        match self.system.lock() {
            Ok(mut sys) => sys.refresh_process(pid),
            Err(_) => false,
        }
    }
}

impl Default for BrowserReaper {
    fn default() -> Self {
        Self::new(BrowserPattern::default())
    }
}

#[async_trait]
impl ProcessReaper for BrowserReaper {
    async fn reap_strays(&self) -> usize {
        let pids = self.matching_pids();
        if pids.is_empty() {
            debug!("No stray browser processes found");
            return 0;
        }

        let signalled: Vec<Pid> = pids.into_iter().filter(|pid| self.signal(*pid, false)).collect();
        info!(count = signalled.len(), "Sent SIGTERM to stray browser processes");

        let started = tokio::time::Instant::now();
        let mut remaining = signalled.clone();
        while !remaining.is_empty() && started.elapsed() < self.grace {
            tokio::time::sleep(KILL_POLL_INTERVAL).await;
            remaining.retain(|pid| self.alive(*pid));
        }

        for pid in &remaining {
            warn!(pid = %pid, "Stray browser survived SIGTERM, killing");
            if !self.signal(*pid, true) {
                debug!(pid = %pid, "Stray browser already gone");
            }
        }

        signalled.len()
    }
}
