//! Top-level download jobs: deduplicate, assign archive paths, build the
//! archive and hand the blob to the download sink.

use crate::archive::{ArchiveBuilder, ArchiveReport};
use crate::error::DownloadError;
use crate::fetcher::ImageFetch;
use crate::helpers::{archive_path, dedupe_urls};
use crate::inflight::{InFlightGuard, InFlightSet, SeenSet};
use crate::models::{ArchiveItem, DownloadSettings};
use crate::progress::StatusBoard;
use crate::sink::DownloadSink;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Unique URLs paired with `{folder}/{NNN}.jpg`, numbered in first-seen order
pub fn archive_items<S: AsRef<str>>(urls: &[S], folder: &str) -> Vec<ArchiveItem> {
    dedupe_urls(urls)
        .into_iter()
        .enumerate()
        .map(|(i, url)| ArchiveItem {
            path: archive_path(folder, i + 1),
            url,
        })
        .collect()
}

/// Drop repeated URLs (and empty ones), keeping the first item's path
pub fn dedupe_items(items: Vec<ArchiveItem>) -> Vec<ArchiveItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| !item.url.is_empty() && seen.insert(item.url.clone()))
        .collect()
}

/// Result of the simple, non-archive download path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub downloaded: usize,
    pub failed: usize,
}

pub struct DownloadOrchestrator<F, S> {
    fetcher: Arc<F>,
    sink: Arc<S>,
    status: StatusBoard,
    folders_in_progress: InFlightSet,
    downloaded_images: SeenSet,
    next_download_id: AtomicU64,
}

impl<F: ImageFetch, S: DownloadSink> DownloadOrchestrator<F, S> {
    pub fn new(fetcher: Arc<F>, sink: Arc<S>, status: StatusBoard) -> Self {
        Self {
            fetcher,
            sink,
            status,
            folders_in_progress: InFlightSet::new(),
            downloaded_images: SeenSet::new(),
            next_download_id: AtomicU64::new(1),
        }
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    pub fn sink(&self) -> &Arc<S> {
        &self.sink
    }

    /// Claim a folder name for archiving; a second claim fails until the
    /// guard is dropped.
    pub fn reserve_folder(&self, folder: &str) -> Result<InFlightGuard, DownloadError> {
        self.folders_in_progress.try_acquire(folder).ok_or_else(|| {
            log::warn!(
                "ZIP download already in progress for {}, ignoring duplicate request",
                folder
            );
            DownloadError::AlreadyInProgress
        })
    }

    pub fn is_folder_in_progress(&self, folder: &str) -> bool {
        self.folders_in_progress.contains(folder)
    }

    /// Archive one chapter's images as `{folder}.zip`
    pub async fn create_single_chapter_zip(
        &self,
        urls: &[String],
        folder: &str,
        settings: &DownloadSettings,
    ) -> Result<ArchiveReport, DownloadError> {
        let guard = self.reserve_folder(folder)?;
        self.zip_reserved(guard, archive_items(urls, folder), settings).await
    }

    /// Archive a raw URL list; paths are reassigned sequentially
    pub async fn download_as_zip(
        &self,
        urls: &[String],
        folder: &str,
        settings: &DownloadSettings,
    ) -> Result<ArchiveReport, DownloadError> {
        self.create_single_chapter_zip(urls, folder, settings).await
    }

    /// Archive pre-pathed items (the series aggregate), deduplicated by URL
    pub async fn download_items(
        &self,
        items: Vec<ArchiveItem>,
        folder: &str,
        settings: &DownloadSettings,
    ) -> Result<ArchiveReport, DownloadError> {
        let guard = self.reserve_folder(folder)?;
        self.zip_reserved(guard, dedupe_items(items), settings).await
    }

    /// Build and commit an archive for a folder already reserved by `guard`.
    /// The folder is released when this returns, on every path.
    pub async fn zip_reserved(
        &self,
        guard: InFlightGuard,
        items: Vec<ArchiveItem>,
        settings: &DownloadSettings,
    ) -> Result<ArchiveReport, DownloadError> {
        let folder = guard.key().to_string();
        let settings = settings.normalized();
        log::info!(
            "Creating {}.zip from {} unique images (delay {}ms)",
            folder,
            items.len(),
            settings.download_delay
        );

        let result = self.build_and_commit(&items, &folder, &settings).await;
        drop(guard);

        match result {
            Ok(report) => {
                let total = items.len();
                self.status
                    .update(report.completion_status(&folder), total, total);
                Ok(report)
            }
            Err(e) => {
                log::error!("Error creating ZIP {}: {}", folder, e);
                self.status
                    .update(format!("Error creating ZIP file: {}", e), 0, 1);
                Err(e)
            }
        }
    }

    async fn build_and_commit(
        &self,
        items: &[ArchiveItem],
        folder: &str,
        settings: &DownloadSettings,
    ) -> Result<ArchiveReport, DownloadError> {
        let builder = ArchiveBuilder::new(self.fetcher.clone(), self.status.clone())
            .with_delay(Duration::from_millis(settings.download_delay));
        let report = builder.build(items).await?;
        let filename = format!("{}.zip", folder);
        let path = self.sink.save_bytes(&filename, &report.bytes).await?;
        log::info!("ZIP saved to {}", path.display());
        Ok(report)
    }

    /// Save one image through the sink. Each URL is accepted once per
    /// process; repeats fail with [`DownloadError::DuplicateImage`].
    pub async fn download_image(&self, url: &str, filename: &str) -> Result<u64, DownloadError> {
        if !self.downloaded_images.insert(url) {
            log::info!("Skipping duplicate download: {}", url);
            return Err(DownloadError::DuplicateImage);
        }
        self.sink.save_url(url, filename).await?;
        let id = self.next_download_id.fetch_add(1, Ordering::SeqCst);
        log::debug!("Download {} finished: {}", id, filename);
        Ok(id)
    }

    /// Save images individually, `batch_size` at a time, pausing between
    /// batches.
    pub async fn download_images_in_batches(
        &self,
        urls: &[String],
        folder: &str,
        chapter_label: &str,
        settings: &DownloadSettings,
    ) -> BatchReport {
        let settings = settings.normalized();
        let items = archive_items(urls, folder);
        let total = items.len();
        let mut report = BatchReport {
            downloaded: 0,
            failed: 0,
        };

        let batches: Vec<&[ArchiveItem]> = items.chunks(settings.batch_size).collect();
        let batch_count = batches.len();
        let mut start = 0;
        for (b, batch) in batches.into_iter().enumerate() {
            let end = start + batch.len();
            self.status.update(
                format!("Downloading images {}-{}/{}...", start + 1, end, total),
                start,
                total,
            );

            let results =
                join_all(batch.iter().map(|item| self.download_image(&item.url, &item.path))).await;
            for (item, result) in batch.iter().zip(results) {
                match result {
                    Ok(_) => report.downloaded += 1,
                    Err(e) => {
                        log::warn!("Failed to download {}: {}", item.url, e);
                        report.failed += 1;
                    }
                }
            }

            start = end;
            if b + 1 < batch_count && settings.download_delay > 0 {
                tokio::time::sleep(Duration::from_millis(settings.download_delay)).await;
            }
        }

        self.status.update(
            format!(
                "Completed! Downloaded {} images from chapter {}",
                report.downloaded, chapter_label
            ),
            total,
            total,
        );
        report
    }
}
