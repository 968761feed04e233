use manga_zip_downloader::models::DownloadSettings;
use manga_zip_downloader::storage::Store;
use tempfile::tempdir;

#[test]
fn test_pending_chapters_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.db");

    {
        let store = Store::open(&path).unwrap();
        store
            .record_pending_chapter("Solo/Chapter 1", &["https://cdn/1.jpg".to_string()])
            .unwrap();
        store
            .save_settings(&DownloadSettings {
                download_delay: 1200,
                batch_size: 4,
                chapter_delay: 0,
            })
            .unwrap();
    }

    let store = Store::open(&path).unwrap();
    let pending = store.load_pending_chapters().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].urls, vec!["https://cdn/1.jpg"]);
    assert_eq!(store.load_settings().unwrap().unwrap().download_delay, 1200);

    store.clear_pending_chapters().unwrap();
    drop(store);
    assert!(Store::open(&path).unwrap().load_pending_chapters().unwrap().is_empty());
}

#[test]
fn test_clones_share_one_database() {
    let store = Store::in_memory().unwrap();
    let other = store.clone();
    store
        .record_pending_chapter("M/C", &["u".to_string()])
        .unwrap();
    assert_eq!(other.load_pending_chapters().unwrap().len(), 1);
}
