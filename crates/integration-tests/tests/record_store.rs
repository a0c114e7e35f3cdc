//! Record store lifecycle across several scraper runs

use chrono::{TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;

use regwatch_core::domain::hash_id;
use regwatch_core::port::ScraperWorkspace;
use regwatch_infra_system::{FsWorkspace, JsonRecordStore, SeenUrls};

#[test]
fn test_store_accumulates_across_runs() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("apra_news.json");

    // Run 1: fresh store
    let run1 = Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap();
    let mut store = JsonRecordStore::open(&path, 2).unwrap();
    let stats = store.merge(
        vec![
            json!({"url": "https://apra.gov.au/a", "headline": "Prudential standard", "status": "draft"}),
            json!({"url": "https://apra.gov.au/b", "headline": "Consultation"}),
        ],
        run1,
    );
    assert_eq!(stats.added, 2);
    assert!(store.save(run1).unwrap().is_none());

    // Run 2: one status change, one duplicate, one new, one unusable
    let run2 = Utc.with_ymd_and_hms(2026, 3, 2, 6, 0, 0).unwrap();
    let mut store = JsonRecordStore::open(&path, 2).unwrap();
    assert_eq!(store.len(), 2);
    let stats = store.merge(
        vec![
            json!({"url": "https://apra.gov.au/a", "headline": "Prudential standard", "status": "final"}),
            json!({"url": "https://apra.gov.au/b", "headline": "Consultation"}),
            json!({"url": "https://apra.gov.au/c", "title": "Speech"}),
            json!({"headline": "no url"}),
        ],
        run2,
    );
    assert_eq!(stats.added, 1);
    assert_eq!(stats.updated, 1);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(stats.rejected, 1);
    assert!(store.save(run2).unwrap().is_some());

    let reopened = JsonRecordStore::open(&path, 2).unwrap();
    assert_eq!(reopened.len(), 3);
    let key = hash_id("https://apra.gov.au/a", "Prudential standard", None);
    let record = reopened.records().get(&key).unwrap();
    assert_eq!(record["status"], "final");
    assert_eq!(record["status_history"][0]["status"], "draft");

    // Run 3 and 4: backups rotate down to the limit
    for day in 3..5 {
        let now = Utc.with_ymd_and_hms(2026, 3, day, 6, 0, 0).unwrap();
        let mut store = JsonRecordStore::open(&path, 2).unwrap();
        store.merge(
            vec![json!({"url": format!("https://apra.gov.au/d{}", day), "headline": "Notice"})],
            now,
        );
        store.save(now).unwrap();
    }
    let store = JsonRecordStore::open(&path, 2).unwrap();
    assert_eq!(store.len(), 5);
    assert_eq!(store.backups().len(), 2);
}

#[test]
fn test_seen_urls_survive_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(SeenUrls::FILE_NAME);

    let mut seen = SeenUrls::load(&path).unwrap();
    assert!(seen.is_empty());
    assert!(seen.insert("https://fca.org.uk/news/1"));
    assert!(!seen.insert("https://fca.org.uk/news/1"));
    assert!(seen.insert("https://fca.org.uk/news/2"));
    seen.save().unwrap();

    let seen = SeenUrls::load(&path).unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen.contains("https://fca.org.uk/news/2"));
    assert!(!seen.contains("https://fca.org.uk/news/3"));
}

#[test]
fn test_saved_store_is_the_latest_output() {
    let folder = TempDir::new().unwrap();
    let data = folder.path().join("data");
    std::fs::create_dir_all(&data).unwrap();
    let path = data.join("news.json");

    // Store written by the previous run, an hour ago
    std::fs::write(
        &path,
        json!([{"url": "https://rbnz.govt.nz/0", "headline": "Rate decision"}]).to_string(),
    )
    .unwrap();
    let hour_ago = std::time::SystemTime::now() - std::time::Duration::from_secs(3600);
    std::fs::File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(hour_ago)
        .unwrap();

    let mut store = JsonRecordStore::open(&path, 5).unwrap();
    let incoming = (1..=5)
        .map(|i| json!({"url": format!("https://rbnz.govt.nz/{}", i), "headline": "Speech"}))
        .collect();
    let now = Utc::now();
    store.merge(incoming, now);
    assert!(store.save(now).unwrap().is_some());

    let mut seen = SeenUrls::load(data.join(SeenUrls::FILE_NAME)).unwrap();
    seen.insert("https://rbnz.govt.nz/1");
    seen.save().unwrap();

    let workspace = FsWorkspace::default();
    let latest = workspace.latest_output(folder.path(), None).unwrap();
    assert_eq!(latest, path);
    assert_eq!(workspace.count_records(&latest), 6);
}
