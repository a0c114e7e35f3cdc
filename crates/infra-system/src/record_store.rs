// JSON record store
// reason: serde_json for the on-disk array, chrono for backup timestamps
use chrono::{DateTime, Local, Utc};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use regwatch_core::domain::{MergeStats, RecordSet};

/// Backups kept next to a store unless configured otherwise
pub const DEFAULT_MAX_BACKUPS: usize = 5;

/// Infix of backup file names: `<stem>_backup_<YYYYmmdd_HHMMSS>[_<n>].json`
pub const BACKUP_MARKER: &str = "_backup_";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0} does not hold a JSON array")]
    NotAnArray(PathBuf),
}

pub type Result<T> = std::result::Result<T, StoreError>;

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Load a JSON array; a missing file is an empty array
fn load_array(path: &Path) -> Result<Vec<Value>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(path)(e)),
    };
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(_) => Err(StoreError::NotAnArray(path.to_path_buf())),
        Err(source) => Err(StoreError::Json {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Pretty-print to a sibling temp file, then rename over the target
fn write_atomic(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let text = serde_json::to_string_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(&tmp, text).map_err(io_err(&tmp))?;
    fs::rename(&tmp, path).map_err(io_err(path))
}

/// Deduplicated array of records persisted as one JSON file
pub struct JsonRecordStore {
    path: PathBuf,
    records: RecordSet,
    max_backups: usize,
}

impl JsonRecordStore {
    /// Open a store, loading existing records
    ///
    /// # Errors
    /// Unreadable file, invalid JSON, or a top-level value that is not an array
    pub fn open(path: impl Into<PathBuf>, max_backups: usize) -> Result<Self> {
        let path = path.into();
        let records = RecordSet::from_records(load_array(&path)?);
        debug!(path = %path.display(), records = records.len(), "Opened record store");
        Ok(Self {
            path,
            records,
            max_backups,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &RecordSet {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn merge(&mut self, incoming: Vec<Value>, now: DateTime<Utc>) -> MergeStats {
        let stats = self.records.merge(incoming, now);
        info!(
            path = %self.path.display(),
            added = stats.added,
            updated = stats.updated,
            duplicates = stats.duplicates,
            rejected = stats.rejected,
            "Merged records"
        );
        stats
    }

    /// Persist the records, backing up the previous file first
    ///
    /// Returns the backup path when one was written.
    pub fn save(&self, now: DateTime<Utc>) -> Result<Option<PathBuf>> {
        let backup = self.backup(now)?;
        write_atomic(&self.path, &Value::Array(self.records.records().to_vec()))?;
        info!(path = %self.path.display(), records = self.records.len(), "Saved record store");
        Ok(backup)
    }

    fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "records".to_string())
    }

    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn backup(&self, now: DateTime<Utc>) -> Result<Option<PathBuf>> {
        if self.max_backups == 0 {
            return Ok(None);
        }
        let has_content = fs::metadata(&self.path).map(|m| m.len() > 0).unwrap_or(false);
        if !has_content {
            return Ok(None);
        }

        let stamp = now.with_timezone(&Local).format("%Y%m%d_%H%M%S").to_string();
        let dir = self.dir();
        let stem = self.stem();
        // Counters continue past the newest backup of the same second, even
        // after rotation removed the older ones
        let next = self
            .backup_entries()
            .into_iter()
            .filter(|((taken, _), _)| *taken == stamp)
            .map(|((_, counter), _)| counter.saturating_add(1))
            .max();
        let backup = match next {
            Some(counter) => dir.join(format!("{}{}{}_{}.json", stem, BACKUP_MARKER, stamp, counter)),
            None => dir.join(format!("{}{}{}.json", stem, BACKUP_MARKER, stamp)),
        };

        fs::copy(&self.path, &backup).map_err(io_err(&backup))?;
        // The backup holds the old content, so it keeps the old mtime
        let modified = fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map_err(io_err(&self.path))?;
        fs::File::options()
            .write(true)
            .open(&backup)
            .and_then(|file| file.set_modified(modified))
            .map_err(io_err(&backup))?;
        debug!(backup = %backup.display(), "Created backup");
        self.rotate_backups();
        Ok(Some(backup))
    }

    /// Existing backups, oldest first
    pub fn backups(&self) -> Vec<PathBuf> {
        self.backup_entries().into_iter().map(|(_, path)| path).collect()
    }

    fn backup_entries(&self) -> Vec<((String, u32), PathBuf)> {
        let prefix = format!("{}{}", self.stem(), BACKUP_MARKER);
        let Ok(entries) = fs::read_dir(self.dir()) else {
            return Vec::new();
        };
        let mut backups: Vec<((String, u32), PathBuf)> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter_map(|p| {
                let name = p.file_name()?.to_str()?;
                let key = backup_order(name.strip_prefix(&prefix)?.strip_suffix(".json")?);
                Some((key, p))
            })
            .collect();
        backups.sort();
        backups
    }

    fn rotate_backups(&self) {
        let backups = self.backups();
        let excess = backups.len().saturating_sub(self.max_backups);
        for old in backups.into_iter().take(excess) {
            match fs::remove_file(&old) {
                Ok(()) => debug!(backup = %old.display(), "Removed old backup"),
                Err(e) => warn!(backup = %old.display(), error = %e, "Could not remove old backup"),
            }
        }
    }
}

/// Sort key of a backup suffix `<YYYYmmdd_HHMMSS>[_<n>]`: timestamp, then counter
fn backup_order(suffix: &str) -> (String, u32) {
    // The timestamp itself holds one `_`, a counter adds a second
    match suffix.rsplit_once('_') {
        Some((stamp, counter)) if stamp.contains('_') => {
            (stamp.to_string(), counter.parse().unwrap_or(u32::MAX))
        }
        _ => (suffix.to_string(), 0),
    }
}

/// Side-file of URLs a scraper has already visited
pub struct SeenUrls {
    path: PathBuf,
    urls: Vec<String>,
    index: HashSet<String>,
}

impl SeenUrls {
    pub const FILE_NAME: &'static str = "seen_urls.json";

    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut seen = Self {
            path: path.clone(),
            urls: Vec::new(),
            index: HashSet::new(),
        };
        for value in load_array(&path)? {
            if let Value::String(url) = value {
                seen.insert(url);
            }
        }
        Ok(seen)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.index.contains(url)
    }

    /// Returns false when the URL was already known
    pub fn insert(&mut self, url: impl Into<String>) -> bool {
        let url = url.into();
        if self.index.contains(&url) {
            return false;
        }
        self.index.insert(url.clone());
        self.urls.push(url);
        true
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn save(&self) -> Result<()> {
        let value = Value::Array(self.urls.iter().cloned().map(Value::String).collect());
        write_atomic(&self.path, &value)
    }
}
