// Job Domain Model

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::error::{DomainError, Result};

/// Scraper category (drives the default timeout)
///
/// Well-known values are `standard`, `heavy`, `complex`, `quick` and `giant`,
/// but any string is accepted so configuration can introduce new tiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Category(String);

impl Category {
    pub const STANDARD: &'static str = "standard";

    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_lowercase())
    }

    pub fn standard() -> Self {
        Self(Self::STANDARD.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Category {
    fn default() -> Self {
        Self::standard()
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.0
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One configured regulator entry, as written in the jobs table
///
/// An entry names a folder and optionally the scripts inside it. With no
/// scripts the runner auto-discovers the entry script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEntry {
    pub name: String,
    pub folder: String,
    #[serde(default)]
    pub scripts: Option<Vec<String>>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub category: Option<Category>,
}

impl JobEntry {
    pub fn new(name: impl Into<String>, folder: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            folder: folder.into(),
            scripts: None,
            timeout_secs: None,
            category: None,
        }
    }

    pub fn with_scripts<I, S>(mut self, scripts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scripts = Some(scripts.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(Category::new(category));
        self
    }

    /// Category, falling back to `standard`
    pub fn category_or_default(&self) -> Category {
        self.category.clone().unwrap_or_default()
    }

    /// Reject entries that can never produce a runnable job
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::InvalidJobEntry {
                name: self.name.clone(),
                reason: "name is empty".to_string(),
            });
        }
        if self.folder.trim().is_empty() {
            return Err(DomainError::InvalidJobEntry {
                name: self.name.clone(),
                reason: "folder is empty".to_string(),
            });
        }
        if self.timeout_secs == Some(0) {
            return Err(DomainError::InvalidJobEntry {
                name: self.name.clone(),
                reason: "timeout must be greater than zero".to_string(),
            });
        }
        if let Some(scripts) = &self.scripts {
            if scripts.iter().any(|s| s.trim().is_empty()) {
                return Err(DomainError::InvalidJobEntry {
                    name: self.name.clone(),
                    reason: "script name is empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// A single runnable job: one script invocation inside one folder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub working_directory: PathBuf,
    /// `None` means discover the script inside `working_directory`
    pub entry_script: Option<String>,
    pub timeout_secs: u64,
    pub category: Category,
}

impl JobSpec {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
