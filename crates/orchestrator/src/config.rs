//! Layered configuration
//!
//! built-in defaults -> config file -> `REGWATCH__*` environment variables

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regwatch_core::domain::{Category, JobEntry};
use regwatch_infra_system::BrowserPattern;

/// Embedded defaults
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Embedded default regulator job table
pub const DEFAULT_JOBS: &str = include_str!("../config/jobs.toml");

const ENV_PREFIX: &str = "REGWATCH";
const CONFIG_FILE_NAME: &str = "regwatch.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserCleanupConfig {
    pub name_pattern: String,
    pub cmdline_flags: Vec<String>,
}

impl From<BrowserCleanupConfig> for BrowserPattern {
    fn from(cfg: BrowserCleanupConfig) -> Self {
        BrowserPattern {
            name_contains: cfg.name_pattern,
            cmdline_markers: cfg.cmdline_flags,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JobTable {
    jobs: Vec<JobEntry>,
}

/// The built-in regulator job table
pub fn default_jobs() -> Result<Vec<JobEntry>> {
    let table = Config::builder()
        .add_source(File::from_str(DEFAULT_JOBS, FileFormat::Toml))
        .build()
        .and_then(|config| config.try_deserialize::<JobTable>())
        .context("Invalid built-in job table")?;
    Ok(table.jobs)
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    pub base_dir: String,
    pub interpreter: String,
    pub script_extension: String,
    pub log_dir: String,
    pub kill_grace_secs: u64,
    pub inter_job_pause_ms: u64,
    pub max_workers: usize,
    pub default_timeout_secs: u64,
    pub category_timeouts: BTreeMap<String, u64>,
    pub env: BTreeMap<String, String>,
    pub browser_cleanup: BrowserCleanupConfig,
    #[serde(default)]
    pub jobs: Vec<JobEntry>,
}

impl OrchestratorConfig {
    /// Load configuration
    ///
    /// With `explicit` set the file must exist; otherwise `regwatch.toml` in
    /// the platform config dir is used when present.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        match explicit {
            Some(path) => {
                builder = builder.add_source(File::from(path.to_path_buf()).required(true));
            }
            None => {
                if let Some(path) = default_config_path() {
                    builder = builder.add_source(File::from(path).required(false));
                }
            }
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let mut config = builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize::<OrchestratorConfig>()
            .context("Invalid configuration")?;

        // Layers merge arrays element-wise, so the default table only joins
        // when no layer brought its own
        if config.jobs.is_empty() {
            config.jobs = default_jobs()?;
        }
        Ok(config.normalized())
    }

    fn normalized(mut self) -> Self {
        // Environment variable names are conventionally upper case
        self.env = self
            .env
            .into_iter()
            .map(|(k, v)| (k.to_uppercase(), v))
            .collect();
        // Keys must match normalized `Category` values
        self.category_timeouts = self
            .category_timeouts
            .into_iter()
            .map(|(k, v)| (Category::new(k).as_str().to_string(), v))
            .collect();
        self
    }

    /// Scraper root with `~` expanded; `override_dir` wins over the config value
    pub fn resolve_base_dir(&self, override_dir: Option<&Path>) -> PathBuf {
        match override_dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(&dir.to_string_lossy()).into_owned()),
            None => PathBuf::from(shellexpand::tilde(&self.base_dir).into_owned()),
        }
    }

    /// Log directory; relative paths live under the scraper root
    pub fn resolve_log_dir(&self, base_dir: &Path) -> PathBuf {
        let dir = PathBuf::from(shellexpand::tilde(&self.log_dir).into_owned());
        if dir.is_absolute() {
            dir
        } else {
            base_dir.join(dir)
        }
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_secs)
    }

    pub fn inter_job_pause(&self) -> Duration {
        Duration::from_millis(self.inter_job_pause_ms)
    }
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "regwatch").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_parse() {
        let config = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize::<OrchestratorConfig>()
            .unwrap()
            .normalized();

        assert_eq!(config.interpreter, "python3");
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.category_timeouts.get("heavy"), Some(&600));
        assert_eq!(config.env.get("PYTHONUNBUFFERED").map(String::as_str), Some("1"));
        assert!(config.jobs.is_empty());
    }

    #[test]
    fn test_default_job_table() {
        let jobs = default_jobs().unwrap();
        assert!(jobs.len() > 40);

        let asic = jobs.iter().find(|j| j.name == "ASIC Consultations").unwrap();
        assert_eq!(asic.timeout_secs, Some(1500));
        assert!(jobs.iter().all(|j| j.validate().is_ok()));
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "max_workers = 5\nbase_dir = \"/srv/scrapers\"\n\n[[jobs]]\nname = \"Only\"\nfolder = \"ONLY\""
        )
        .unwrap();

        let config = OrchestratorConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.max_workers, 5);
        assert_eq!(config.jobs.len(), 1);
        assert_eq!(config.resolve_base_dir(None), PathBuf::from("/srv/scrapers"));
        assert_eq!(config.interpreter, "python3");
    }

    #[test]
    fn test_category_keys_normalized() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[category_timeouts]\nGiant = 1800\n\n[[jobs]]\nname = \"ASIC\"\nfolder = \"ASIC\"\ncategory = \"GIANT\""
        )
        .unwrap();

        let config = OrchestratorConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.category_timeouts.get("giant"), Some(&1800));
        assert_eq!(config.jobs[0].category, Some(Category::new("giant")));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(OrchestratorConfig::load(Some(Path::new("/nonexistent/regwatch.toml"))).is_err());
    }

    #[test]
    fn test_path_resolution() {
        let config = OrchestratorConfig::load(None).unwrap();
        let base = config.resolve_base_dir(Some(Path::new("/data/scripts")));
        assert_eq!(base, PathBuf::from("/data/scripts"));
        assert_eq!(config.resolve_log_dir(&base), PathBuf::from("/data/scripts/logs"));
        assert!(!config.resolve_base_dir(None).to_string_lossy().starts_with('~'));
    }
}
