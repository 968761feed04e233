mod common;

use common::{FakeFetcher, MemorySink};
use manga_zip_downloader::config::DownloadConfig;
use manga_zip_downloader::orchestrator::DownloadOrchestrator;
use manga_zip_downloader::page::HttpPageLoader;
use manga_zip_downloader::progress::StatusBoard;
use manga_zip_downloader::series::SeriesDownloader;
use manga_zip_downloader::storage::Store;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Answers every request with a 503 and counts them
async fn unavailable_server() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let mut buf = [0u8; 4096];
            let _ = sock.read(&mut buf).await;
            let _ = sock
                .write_all(b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
            let _ = sock.shutdown().await;
        }
    });
    (format!("http://{}/series/solo-leveling", addr), hits)
}

fn downloader(section: &DownloadConfig) -> SeriesDownloader<HttpPageLoader, FakeFetcher, MemorySink> {
    let loader = HttpPageLoader::new(section.create_http_client().unwrap());
    let status = StatusBoard::new();
    let orchestrator = Arc::new(DownloadOrchestrator::new(
        FakeFetcher::new(),
        MemorySink::new(),
        status.clone(),
    ));
    SeriesDownloader::new(
        Arc::new(loader),
        orchestrator,
        Store::in_memory().unwrap(),
        status,
        section.series_config(),
    )
}

#[tokio::test]
async fn test_failing_page_is_requested_once_per_attempt() {
    let (url, hits) = unavailable_server().await;
    let section = DownloadConfig {
        page_retry_delay_ms: 20,
        page_settle_ms: 0,
        ..DownloadConfig::default()
    };

    let title = downloader(&section).manga_title(&url).await;

    assert_eq!(title, "Unknown Manga");
    assert_eq!(hits.load(Ordering::SeqCst), section.page_retries);
}

#[tokio::test]
async fn test_chapter_page_uses_the_configured_attempts() {
    let (url, hits) = unavailable_server().await;
    let section = DownloadConfig {
        page_retries: 2,
        page_retry_delay_ms: 20,
        page_settle_ms: 0,
        ..DownloadConfig::default()
    };
    let downloader = downloader(&section);

    let result = downloader
        .process_chapter(&format!("{}/chapter-1", url), "Chapter 1", "Solo Leveling")
        .await;

    assert!(result.is_err());
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}
