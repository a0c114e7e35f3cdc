// Scraper Workspace Port
// Filesystem view of a scraper folder: entry scripts and JSON outputs

use std::path::{Path, PathBuf};

/// Filesystem operations the job runner needs
///
/// All methods are best-effort and never fail the batch: unreadable outputs
/// count as zero records.
pub trait ScraperWorkspace: Send + Sync {
    /// True when the folder exists and is a directory
    fn folder_exists(&self, folder: &Path) -> bool;

    /// Resolve the script to launch
    ///
    /// With `explicit` set, the file must exist inside `folder`. Otherwise
    /// the workspace picks the main script by its own heuristics.
    ///
    /// # Errors
    /// A human-readable reason when no script can be found
    fn resolve_script(&self, folder: &Path, explicit: Option<&str>) -> Result<PathBuf, String>;

    /// Most recently modified JSON output of a scraper folder
    ///
    /// With `modified_after_ms` set, only files modified strictly after that
    /// instant (epoch ms) are considered.
    fn latest_output(&self, folder: &Path, modified_after_ms: Option<i64>) -> Option<PathBuf>;

    /// Number of records held by a JSON output file
    fn count_records(&self, path: &Path) -> usize;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Default)]
    struct MockFolder {
        scripts: Vec<String>,
        /// (file name, mtime ms, record count)
        outputs: Vec<(String, i64, usize)>,
    }

    /// In-memory workspace
    #[derive(Default)]
    pub struct MockWorkspace {
        folders: Mutex<HashMap<PathBuf, MockFolder>>,
    }

    impl MockWorkspace {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_folder(&self, folder: impl Into<PathBuf>, scripts: &[&str]) {
            self.folders.lock().unwrap().insert(
                folder.into(),
                MockFolder {
                    scripts: scripts.iter().map(|s| s.to_string()).collect(),
                    outputs: Vec::new(),
                },
            );
        }

        /// Create or replace an output file
        pub fn set_output(&self, folder: &Path, file: &str, mtime_ms: i64, records: usize) {
            let mut folders = self.folders.lock().unwrap();
            let entry = folders.entry(folder.to_path_buf()).or_default();
            entry.outputs.retain(|(name, _, _)| name != file);
            entry.outputs.push((file.to_string(), mtime_ms, records));
        }
    }

    impl ScraperWorkspace for MockWorkspace {
        fn folder_exists(&self, folder: &Path) -> bool {
            self.folders.lock().unwrap().contains_key(folder)
        }

        fn resolve_script(&self, folder: &Path, explicit: Option<&str>) -> Result<PathBuf, String> {
            let folders = self.folders.lock().unwrap();
            let entry = folders
                .get(folder)
                .ok_or_else(|| "No .py script found in folder".to_string())?;
            match explicit {
                Some(script) if entry.scripts.iter().any(|s| s == script) => Ok(folder.join(script)),
                Some(script) => Err(format!("Specified script {} not found", script)),
                None => entry
                    .scripts
                    .first()
                    .map(|s| folder.join(s))
                    .ok_or_else(|| "No .py script found in folder".to_string()),
            }
        }

        fn latest_output(&self, folder: &Path, modified_after_ms: Option<i64>) -> Option<PathBuf> {
            let folders = self.folders.lock().unwrap();
            folders
                .get(folder)?
                .outputs
                .iter()
                .filter(|(_, mtime, _)| modified_after_ms.map_or(true, |after| *mtime > after))
                .max_by_key(|(_, mtime, _)| *mtime)
                .map(|(name, _, _)| folder.join(name))
        }

        fn count_records(&self, path: &Path) -> usize {
            let (Some(folder), Some(name)) = (path.parent(), path.file_name()) else {
                return 0;
            };
            let folders = self.folders.lock().unwrap();
            folders
                .get(folder)
                .and_then(|f| f.outputs.iter().find(|(n, _, _)| n.as_str() == name))
                .map(|(_, _, count)| *count)
                .unwrap_or(0)
        }
    }
}
