//! Sequential fetch-and-archive engine.
//!
//! Items are fetched one at a time with a pause between them, staged in
//! memory, and then serialized into a single deflated ZIP blob.

use crate::error::DownloadError;
use crate::fetcher::ImageFetch;
use crate::models::{ArchiveEntry, ArchiveItem};
use crate::progress::StatusBoard;
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::time::Duration;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Deflate level used for every entry
pub const COMPRESSION_LEVEL: i32 = 6;

/// Outcome of one archive build
#[derive(Debug, Clone)]
pub struct ArchiveReport {
    pub bytes: Vec<u8>,
    /// Entries filled with real image data
    pub downloaded: usize,
    /// Entries filled with the placeholder
    pub failed: usize,
    pub entries: usize,
}

impl ArchiveReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }

    /// Terminal status line for this build
    pub fn completion_status(&self, folder_name: &str) -> String {
        if self.is_clean() {
            format!(
                "Completed! Downloaded {} images to {}.zip",
                self.downloaded, folder_name
            )
        } else {
            format!(
                "Completed with issues. Downloaded {} images, failed to download {} images.",
                self.downloaded, self.failed
            )
        }
    }
}

pub struct ArchiveBuilder<F> {
    fetcher: Arc<F>,
    status: StatusBoard,
    delay: Duration,
}

impl<F: ImageFetch> ArchiveBuilder<F> {
    pub fn new(fetcher: Arc<F>, status: StatusBoard) -> Self {
        Self {
            fetcher,
            status,
            delay: Duration::from_millis(300),
        }
    }

    /// Pause between consecutive items
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fetch every item in order and serialize the archive.
    ///
    /// `items` must already be unique by URL and by path. Failed fetches
    /// still occupy their slot (placeholder) and are counted in
    /// [`ArchiveReport::failed`].
    pub async fn build(&self, items: &[ArchiveItem]) -> Result<ArchiveReport, DownloadError> {
        let total = items.len();
        self.status
            .update(format!("Creating ZIP file with {} images...", total), 0, total);

        let mut staged = Vec::with_capacity(total);
        let mut downloaded = 0;
        let mut failed = 0;

        for (i, item) in items.iter().enumerate() {
            self.status
                .update(format!("Adding image {}/{} to ZIP...", i + 1, total), i, total);
            log::info!("Processing image {}/{}: {} -> {}", i + 1, total, item.url, item.path);

            let outcome = self.fetcher.fetch(&item.url).await;
            if outcome.is_placeholder() {
                log::warn!("Inserted placeholder for {} at {}", item.url, item.path);
                failed += 1;
            } else {
                downloaded += 1;
            }
            staged.push(ArchiveEntry {
                path: item.path.clone(),
                bytes: outcome.into_bytes(),
            });

            if i + 1 < total && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        self.status.update("Generating ZIP file...", total, total);
        let bytes = self.serialize(&staged, total).await?;
        log::info!(
            "Archive ready: {} entries, {} bytes, {} failed",
            staged.len(),
            bytes.len(),
            failed
        );

        Ok(ArchiveReport {
            bytes,
            downloaded,
            failed,
            entries: staged.len(),
        })
    }

    async fn serialize(&self, entries: &[ArchiveEntry], total: usize) -> Result<Vec<u8>, DownloadError> {
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(COMPRESSION_LEVEL));

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let count = entries.len().max(1);
        for (i, entry) in entries.iter().enumerate() {
            writer.start_file(entry.path.as_str(), options)?;
            writer.write_all(&entry.bytes)?;

            let percent = (i + 1) as f64 / count as f64 * 100.0;
            self.status
                .update(format!("Compressing ZIP file: {:.1}%", percent), total, total);
            tokio::task::yield_now().await;
        }

        Ok(writer.finish()?.into_inner())
    }
}
