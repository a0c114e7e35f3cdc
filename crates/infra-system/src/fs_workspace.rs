// Filesystem workspace implementation
// reason: std::fs is enough for directory scans; serde_json for output parsing
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

use regwatch_core::application::constants::{
    DEFAULT_SCRIPT_EXTENSION, NESTED_RECORD_KEYS, SCRIPT_EXCLUDED_KEYWORDS,
};
use regwatch_core::port::ScraperWorkspace;

use crate::record_store::{SeenUrls, BACKUP_MARKER};

const OUTPUT_EXTENSION: &str = "json";
const DATA_DIR: &str = "data";

/// Workspace over real scraper folders
pub struct FsWorkspace {
    script_extension: String,
}

impl FsWorkspace {
    pub fn new(script_extension: impl Into<String>) -> Self {
        Self {
            script_extension: script_extension.into().trim_start_matches('.').to_string(),
        }
    }

    /// Files in `dir` with the given extension, sorted by name
    fn files_with_extension(dir: &Path, extension: &str) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(extension))
            .collect();
        files.sort();
        files
    }

    /// Newest output in `dir`, optionally only those modified strictly after `after_ms`
    fn newest_in(dir: &Path, after_ms: Option<i64>) -> Option<PathBuf> {
        Self::files_with_extension(dir, OUTPUT_EXTENSION)
            .into_iter()
            .filter(|path| is_scraper_output(path))
            .filter_map(|path| modified_ms(&path).map(|mtime| (path, mtime)))
            .filter(|(_, mtime)| after_ms.map_or(true, |after| *mtime > after))
            .max_by_key(|(_, mtime)| *mtime)
            .map(|(path, _)| path)
    }
}

impl Default for FsWorkspace {
    fn default() -> Self {
        Self::new(DEFAULT_SCRIPT_EXTENSION)
    }
}

impl ScraperWorkspace for FsWorkspace {
    fn folder_exists(&self, folder: &Path) -> bool {
        folder.is_dir()
    }

    fn resolve_script(&self, folder: &Path, explicit: Option<&str>) -> Result<PathBuf, String> {
        if let Some(script) = explicit {
            let path = folder.join(script);
            return if path.is_file() {
                Ok(path)
            } else {
                Err(format!("Specified script {} not found", script))
            };
        }

        let candidates = Self::files_with_extension(folder, &self.script_extension);
        let not_found = || format!("No .{} script found in folder", self.script_extension);

        if candidates.len() <= 1 {
            return candidates.into_iter().next().ok_or_else(not_found);
        }

        let main = candidates.iter().find(|path| {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            !SCRIPT_EXCLUDED_KEYWORDS.iter().any(|kw| stem.contains(kw))
        });
        let chosen = main.unwrap_or(&candidates[0]).clone();
        debug!(folder = %folder.display(), script = %chosen.display(), "Auto-discovered entry script");
        Ok(chosen)
    }

    fn latest_output(&self, folder: &Path, modified_after_ms: Option<i64>) -> Option<PathBuf> {
        Self::newest_in(&folder.join(DATA_DIR), modified_after_ms)
            .or_else(|| Self::newest_in(folder, modified_after_ms))
    }

    fn count_records(&self, path: &Path) -> usize {
        let parsed = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str::<Value>(&text).map_err(|e| e.to_string()));

        match parsed {
            Ok(value) => count_value(&value),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not count records");
                0
            }
        }
    }
}

/// Arrays count their elements; objects count a known nested array or their keys
fn count_value(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.len(),
        Value::Object(map) => NESTED_RECORD_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .map_or(map.len(), Vec::len),
        _ => 1,
    }
}

/// Record-store backups and the seen-URL side-file are not scraper output
fn is_scraper_output(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name != SeenUrls::FILE_NAME && !name.contains(BACKUP_MARKER)
}

fn modified_ms(path: &Path) -> Option<i64> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
    i64::try_from(since_epoch.as_millis()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_single_script_is_chosen() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "test_only.py", "");
        let ws = FsWorkspace::default();
        assert_eq!(
            ws.resolve_script(dir.path(), None).unwrap(),
            dir.path().join("test_only.py")
        );
    }

    #[test]
    fn test_discovery_skips_helper_scripts() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a_utils.py", "");
        touch(dir.path(), "config_loader.py", "");
        touch(dir.path(), "rba_news_scrape.py", "");
        touch(dir.path(), "notes.txt", "");

        let ws = FsWorkspace::default();
        assert_eq!(
            ws.resolve_script(dir.path(), None).unwrap(),
            dir.path().join("rba_news_scrape.py")
        );
    }

    #[test]
    fn test_discovery_falls_back_to_first_file() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "setup.py", "");
        touch(dir.path(), "helper.py", "");

        let ws = FsWorkspace::default();
        assert_eq!(
            ws.resolve_script(dir.path(), None).unwrap(),
            dir.path().join("helper.py")
        );
    }

    #[test]
    fn test_missing_scripts() {
        let dir = TempDir::new().unwrap();
        let ws = FsWorkspace::default();

        assert_eq!(
            ws.resolve_script(dir.path(), None).unwrap_err(),
            "No .py script found in folder"
        );
        assert_eq!(
            ws.resolve_script(dir.path(), Some("fma_scrape.py")).unwrap_err(),
            "Specified script fma_scrape.py not found"
        );
    }

    #[test]
    fn test_latest_output_prefers_data_dir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("data")).unwrap();
        touch(dir.path(), "root.json", "[]");
        let data = touch(&dir.path().join("data"), "news.json", "[]");

        let ws = FsWorkspace::default();
        assert_eq!(ws.latest_output(dir.path(), None), Some(data));
    }

    #[test]
    fn test_latest_output_after_timestamp() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("data")).unwrap();
        let old = touch(&dir.path().join("data"), "news.json", "[]");
        let old_ms = modified_ms(&old).unwrap();

        let ws = FsWorkspace::default();
        // Nothing in data/ is newer, nothing at the root either
        assert_eq!(ws.latest_output(dir.path(), Some(old_ms)), None);
        assert_eq!(ws.latest_output(dir.path(), Some(old_ms - 1)), Some(old));
    }

    #[test]
    fn test_latest_output_ignores_backups_and_seen_urls() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        fs::create_dir(&data).unwrap();
        let news = touch(&data, "news.json", "[1, 2]");
        touch(&data, "news_backup_20260301_060000.json", "[1]");
        touch(&data, SeenUrls::FILE_NAME, "[\"https://a\"]");

        let ws = FsWorkspace::default();
        assert_eq!(ws.latest_output(dir.path(), None), Some(news));
    }

    #[test]
    fn test_latest_output_missing_folder() {
        let ws = FsWorkspace::default();
        assert_eq!(ws.latest_output(Path::new("/nonexistent/regwatch"), None), None);
    }

    #[test]
    fn test_count_records_shapes() {
        let dir = TempDir::new().unwrap();
        let ws = FsWorkspace::default();

        let list = touch(dir.path(), "list.json", &json!([1, 2, 3]).to_string());
        let nested = touch(
            dir.path(),
            "nested.json",
            &json!({"meta": {}, "articles": [1, 2]}).to_string(),
        );
        let object = touch(dir.path(), "object.json", &json!({"a": 1, "b": 2, "c": 3, "d": 4}).to_string());
        let scalar = touch(dir.path(), "scalar.json", "42");
        let broken = touch(dir.path(), "broken.json", "{not json");

        assert_eq!(ws.count_records(&list), 3);
        assert_eq!(ws.count_records(&nested), 2);
        assert_eq!(ws.count_records(&object), 4);
        assert_eq!(ws.count_records(&scalar), 1);
        assert_eq!(ws.count_records(&broken), 0);
        assert_eq!(ws.count_records(&dir.path().join("missing.json")), 0);
    }
}
