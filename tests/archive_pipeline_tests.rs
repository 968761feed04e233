mod common;

use common::{zip_entries, FakeFetcher, MemorySink};
use manga_zip_downloader::error::DownloadError;
use manga_zip_downloader::fetcher::PLACEHOLDER_GIF;
use manga_zip_downloader::models::DownloadSettings;
use manga_zip_downloader::orchestrator::DownloadOrchestrator;
use manga_zip_downloader::progress::StatusBoard;
use std::sync::Arc;
use std::time::Duration;

fn no_delay() -> DownloadSettings {
    DownloadSettings {
        download_delay: 0,
        ..DownloadSettings::default()
    }
}

fn urls(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("https://cdn.site.com/manga/x/{}.jpg", i)).collect()
}

#[tokio::test]
async fn test_failed_image_becomes_placeholder_entry() {
    let urls = urls(5);
    let fetcher = FakeFetcher::failing(&[urls[2].as_str()]);
    let sink = MemorySink::new();
    let status = StatusBoard::new();
    let orchestrator = DownloadOrchestrator::new(fetcher, sink.clone(), status.clone());

    let report = orchestrator
        .create_single_chapter_zip(&urls, "X", &no_delay())
        .await
        .unwrap();

    assert_eq!((report.downloaded, report.failed, report.entries), (4, 1, 5));
    let snapshot = status.snapshot();
    assert_eq!(
        snapshot.status,
        "Completed with issues. Downloaded 4 images, failed to download 1 images."
    );
    assert!(!snapshot.in_progress);

    let entries = zip_entries(&sink.file("X.zip").unwrap());
    let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec!["X/001.jpg", "X/002.jpg", "X/003.jpg", "X/004.jpg", "X/005.jpg"]
    );
    assert_eq!(entries[2].1, PLACEHOLDER_GIF.to_vec());
    assert_eq!(entries[3].1, urls[3].as_bytes().to_vec());
}

#[tokio::test]
async fn test_clean_run_reports_archive_name() {
    let sink = MemorySink::new();
    let status = StatusBoard::new();
    let orchestrator = DownloadOrchestrator::new(FakeFetcher::new(), sink.clone(), status.clone());

    let report = orchestrator
        .download_as_zip(&urls(3), "Solo_ch12", &no_delay())
        .await
        .unwrap();

    assert_eq!(status.snapshot().status, "Completed! Downloaded 3 images to Solo_ch12.zip");
    assert_eq!(sink.file_names(), vec!["Solo_ch12.zip"]);
    // the committed file is the archive the report describes
    assert_eq!(sink.file("Solo_ch12.zip").unwrap(), report.bytes);
}

#[tokio::test]
async fn test_duplicate_urls_are_fetched_once() {
    let fetcher = FakeFetcher::new();
    let sink = MemorySink::new();
    let orchestrator = DownloadOrchestrator::new(fetcher.clone(), sink.clone(), StatusBoard::new());

    let list: Vec<String> = ["a", "b", "a", "c", "b"]
        .iter()
        .map(|s| format!("https://cdn.site.com/{}.jpg", s))
        .collect();
    let report = orchestrator
        .create_single_chapter_zip(&list, "F", &no_delay())
        .await
        .unwrap();

    assert_eq!(report.entries, 3);
    assert_eq!(fetcher.calls().len(), 3);
    let names: Vec<String> = zip_entries(&sink.file("F.zip").unwrap())
        .into_iter()
        .map(|(n, _)| n)
        .collect();
    assert_eq!(names, vec!["F/001.jpg", "F/002.jpg", "F/003.jpg"]);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_request_for_same_folder_is_rejected() {
    let orchestrator = Arc::new(DownloadOrchestrator::new(
        FakeFetcher::slow(Duration::from_millis(100)),
        MemorySink::new(),
        StatusBoard::new(),
    ));
    let list = urls(3);
    let delay = no_delay();

    let (first, second) = tokio::join!(
        orchestrator.create_single_chapter_zip(&list, "Dup", &delay),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert!(orchestrator.is_folder_in_progress("Dup"));
            orchestrator.create_single_chapter_zip(&list, "Dup", &no_delay()).await
        }
    );

    assert!(first.is_ok());
    assert!(matches!(second, Err(DownloadError::AlreadyInProgress)));

    // released once the first job finished
    assert!(!orchestrator.is_folder_in_progress("Dup"));
    assert!(orchestrator
        .create_single_chapter_zip(&list, "Dup", &no_delay())
        .await
        .is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_other_folders_run_concurrently() {
    let orchestrator = DownloadOrchestrator::new(
        FakeFetcher::slow(Duration::from_millis(100)),
        MemorySink::new(),
        StatusBoard::new(),
    );
    let list = urls(2);
    let delay = no_delay();

    let (a, b) = tokio::join!(
        orchestrator.create_single_chapter_zip(&list, "A", &delay),
        orchestrator.create_single_chapter_zip(&list, "B", &delay)
    );
    assert!(a.is_ok() && b.is_ok());
}

#[tokio::test]
async fn test_sink_failure_is_reported_and_folder_released() {
    let status = StatusBoard::new();
    let orchestrator = DownloadOrchestrator::new(FakeFetcher::new(), MemorySink::broken(), status.clone());

    let result = orchestrator
        .create_single_chapter_zip(&urls(2), "Broken", &no_delay())
        .await;

    assert!(matches!(result, Err(DownloadError::Io(_))));
    let snapshot = status.snapshot();
    assert!(snapshot.status.starts_with("Error creating ZIP file: "));
    assert_eq!((snapshot.current, snapshot.total), (0, 1));
    assert!(!orchestrator.is_folder_in_progress("Broken"));
}

#[tokio::test(start_paused = true)]
async fn test_items_are_paced_by_download_delay() {
    let orchestrator = DownloadOrchestrator::new(FakeFetcher::new(), MemorySink::new(), StatusBoard::new());
    let settings = DownloadSettings {
        download_delay: 250,
        ..DownloadSettings::default()
    };

    let start = tokio::time::Instant::now();
    orchestrator
        .create_single_chapter_zip(&urls(4), "Paced", &settings)
        .await
        .unwrap();
    let elapsed = start.elapsed();

    // three gaps, none after the last item
    assert!(elapsed >= Duration::from_millis(750), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1000), "{:?}", elapsed);
}

#[tokio::test]
async fn test_single_image_downloads_reject_repeats() {
    let sink = MemorySink::new();
    let orchestrator = DownloadOrchestrator::new(FakeFetcher::new(), sink.clone(), StatusBoard::new());

    let first = orchestrator
        .download_image("https://cdn.site.com/1.jpg", "Solo/001.jpg")
        .await
        .unwrap();
    let second = orchestrator
        .download_image("https://cdn.site.com/2.jpg", "Solo/002.jpg")
        .await
        .unwrap();
    assert_eq!((first, second), (1, 2));

    let repeat = orchestrator
        .download_image("https://cdn.site.com/1.jpg", "Solo/003.jpg")
        .await;
    assert!(matches!(repeat, Err(DownloadError::DuplicateImage)));
    assert_eq!(sink.urls.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_batched_downloads_report_completion() {
    let sink = MemorySink::new();
    let status = StatusBoard::new();
    let orchestrator = DownloadOrchestrator::new(FakeFetcher::new(), sink.clone(), status.clone());
    let settings = DownloadSettings {
        download_delay: 100,
        batch_size: 2,
        chapter_delay: 0,
    };

    let report = orchestrator
        .download_images_in_batches(&urls(5), "Solo/Chapter 7", "7", &settings)
        .await;

    assert_eq!((report.downloaded, report.failed), (5, 0));
    assert_eq!(
        status.snapshot().status,
        "Completed! Downloaded 5 images from chapter 7"
    );
    let saved: Vec<String> = sink.urls.lock().unwrap().iter().map(|(_, f)| f.clone()).collect();
    assert!(saved.contains(&"Solo/Chapter 7/005.jpg".to_string()));
}
