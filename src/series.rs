//! Whole-series downloads.
//!
//! Each chapter page is opened through [`PageAutomation`], its images are
//! selected and recorded in the pending store under `{manga}/{chapter}`, and
//! once the loop finishes every pending chapter goes into one archive.
//!
//! ```text
//! Idle -> Processing(0) -> ... -> Processing(n-1) -> Aggregating -> Archiving -> Done
//!                 \ stop                                                \-> Error
//!                  -> Stopped
//! ```

use crate::archive::ArchiveReport;
use crate::chapter_enumerator::{scrape_chapter_list, series_title, ChapterRange, ExpansionTimings};
use crate::error::{DownloadError, PageError, ScrapeError};
use crate::fetcher::ImageFetch;
use crate::helpers::{archive_path, sanitize_filename};
use crate::image_selector::{select_image_urls, SelectionMode};
use crate::inflight::{InFlightGuard, InFlightSet};
use crate::models::{ArchiveItem, Chapter, DownloadSettings};
use crate::orchestrator::DownloadOrchestrator;
use crate::page::PageAutomation;
use crate::progress::StatusBoard;
use crate::sink::DownloadSink;
use crate::storage::Store;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Series jobs share one stop flag, so only one runs at a time
const SERIES_JOB: &str = "series";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesConfig {
    /// Attempts per page load, including the first
    pub page_retries: usize,
    pub page_retry_delay: Duration,
    pub expansion: ExpansionTimings,
    pub selection: SelectionMode,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            page_retries: 3,
            page_retry_delay: Duration::from_millis(1000),
            expansion: ExpansionTimings::default(),
            selection: SelectionMode::Union,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesPhase {
    Idle,
    Processing(usize),
    Aggregating,
    Archiving,
    Done,
    Stopped,
    Error,
}

/// Cooperative stop flag, checked between chapters
#[derive(Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub struct SeriesReport {
    pub title: String,
    pub processed: usize,
    pub total: usize,
    pub stopped: bool,
    pub archive: Option<ArchiveReport>,
}

pub struct SeriesDownloader<A, F, S> {
    automation: Arc<A>,
    orchestrator: Arc<DownloadOrchestrator<F, S>>,
    store: Store,
    status: StatusBoard,
    processing: InFlightSet,
    series_job: InFlightSet,
    stop: StopHandle,
    phase: Mutex<SeriesPhase>,
    config: SeriesConfig,
}

impl<A, F, S> SeriesDownloader<A, F, S>
where
    A: PageAutomation,
    F: ImageFetch,
    S: DownloadSink,
{
    pub fn new(
        automation: Arc<A>,
        orchestrator: Arc<DownloadOrchestrator<F, S>>,
        store: Store,
        status: StatusBoard,
        config: SeriesConfig,
    ) -> Self {
        Self {
            automation,
            orchestrator,
            store,
            status,
            processing: InFlightSet::new(),
            series_job: InFlightSet::new(),
            stop: StopHandle::default(),
            phase: Mutex::new(SeriesPhase::Idle),
            config,
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn phase(&self) -> SeriesPhase {
        *self.phase.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_phase(&self, phase: SeriesPhase) {
        log::debug!("Series phase: {:?}", phase);
        *self.phase.lock().unwrap_or_else(|p| p.into_inner()) = phase;
    }

    /// Open a page, retrying with a fixed delay
    async fn open_with_retry(&self, url: &str) -> Result<A::Page, PageError> {
        let attempts = self.config.page_retries.max(1);
        let mut attempt = 1;
        loop {
            match self.automation.open(url).await {
                Ok(page) => return Ok(page),
                Err(e) if attempt < attempts => {
                    log::warn!(
                        "Page load failed for {} ({}), retrying ({} attempts left)...",
                        url,
                        e,
                        attempts - attempt
                    );
                    tokio::time::sleep(self.config.page_retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Series title, or `Unknown Manga` when the page cannot be loaded
    pub async fn manga_title(&self, series_url: &str) -> String {
        match self.open_with_retry(series_url).await {
            Ok(page) => series_title(&page).await,
            Err(e) => {
                log::error!("Error getting manga title: {}", e);
                "Unknown Manga".to_string()
            }
        }
    }

    /// Expand and enumerate a series page, then apply a range filter
    pub async fn fetch_chapters(&self, series_url: &str, range: &str) -> Result<Vec<Chapter>, DownloadError> {
        let range: ChapterRange = range.parse()?;
        log::info!("Fetching chapter list from: {}", series_url);

        let page = self
            .open_with_retry(series_url)
            .await
            .map_err(ScrapeError::from)?;
        let chapters = scrape_chapter_list(&page, &self.config.expansion).await;
        drop(page);

        if chapters.is_empty() {
            return Err(ScrapeError::NoChapters.into());
        }
        log::info!("Found {} unique chapters", chapters.len());
        Ok(range.apply(&chapters))
    }

    /// Select one chapter's images and record them as pending.
    ///
    /// The `{manga_title}:{chapter_url}` key is held for the duration; a
    /// concurrent call for the same key fails with
    /// [`DownloadError::ChapterInProgress`].
    pub async fn process_chapter(
        &self,
        chapter_url: &str,
        chapter_name: &str,
        manga_title: &str,
    ) -> Result<usize, DownloadError> {
        let key = format!("{}:{}", manga_title, chapter_url);
        let _guard = self.processing.try_acquire(key).ok_or_else(|| {
            log::info!("Chapter already being processed: {} ({})", chapter_name, chapter_url);
            DownloadError::ChapterInProgress
        })?;

        let folder = format!(
            "{}/{}",
            sanitize_filename(manga_title),
            sanitize_filename(chapter_name)
        );
        self.status
            .update(format!("Downloading chapter: {}", chapter_name), 0, 1);

        let page = self
            .open_with_retry(chapter_url)
            .await
            .map_err(|e| self.fail(ScrapeError::from(e).into()))?;
        let urls = match select_image_urls(&page, self.config.selection).await {
            Ok(urls) => urls,
            Err(ScrapeError::NoImages) => {
                self.status.error(ScrapeError::NoImages);
                log::error!("Failed to extract images for chapter: {}", chapter_name);
                return Err(DownloadError::ExtractionFailed);
            }
            Err(e) => return Err(self.fail(e.into())),
        };
        drop(page);

        self.store
            .record_pending_chapter(&folder, &urls)
            .map_err(|e| self.fail(e.into()))?;
        log::info!("Stored {} images for chapter: {}", urls.len(), chapter_name);
        Ok(urls.len())
    }

    /// Put `e` on the status board as the job's terminal state
    fn fail(&self, e: DownloadError) -> DownloadError {
        self.status.error(&e);
        e
    }

    /// Archive every pending chapter as one `{manga}.zip`, then clear the
    /// pending store.
    pub async fn download_pending_chapters(
        &self,
        settings: &DownloadSettings,
    ) -> Result<ArchiveReport, DownloadError> {
        let pending = self
            .store
            .load_pending_chapters()
            .map_err(|e| self.fail(e.into()))?;
        let Some(first) = pending.first() else {
            return Err(DownloadError::NoPendingChapters);
        };
        let series_folder = first
            .folder
            .split('/')
            .next()
            .unwrap_or(first.folder.as_str())
            .to_string();

        let items: Vec<ArchiveItem> = pending
            .iter()
            .flat_map(|chapter| {
                chapter.urls.iter().enumerate().map(|(i, url)| ArchiveItem {
                    url: url.clone(),
                    path: archive_path(&chapter.folder, i + 1),
                })
            })
            .collect();

        log::info!("Downloading {} pending chapters as a single ZIP", pending.len());
        self.status.update(
            format!(
                "Creating ZIP file with {} images from {} chapters...",
                items.len(),
                pending.len()
            ),
            0,
            items.len(),
        );

        let report = match self
            .orchestrator
            .download_items(items, &series_folder, settings)
            .await
        {
            Ok(report) => report,
            // the folder was never reserved, so nothing reported it yet
            Err(DownloadError::AlreadyInProgress) => {
                return Err(self.fail(DownloadError::AlreadyInProgress))
            }
            Err(e) => return Err(e),
        };
        self.store
            .clear_pending_chapters()
            .map_err(|e| self.fail(e.into()))?;
        Ok(report)
    }

    /// Claim the series slot; fails while another series job holds it
    pub fn reserve_series(&self) -> Result<InFlightGuard, DownloadError> {
        self.series_job.try_acquire(SERIES_JOB).ok_or_else(|| {
            log::warn!("Series download already in progress, ignoring request");
            DownloadError::SeriesInProgress
        })
    }

    pub fn is_series_running(&self) -> bool {
        self.series_job.contains(SERIES_JOB)
    }

    /// Process `chapters` in order, then archive everything that was
    /// collected. A stop request ends the loop and skips archiving; the
    /// chapters already recorded stay pending.
    pub async fn download_series(
        &self,
        series_url: &str,
        chapters: &[Chapter],
        settings: &DownloadSettings,
    ) -> Result<SeriesReport, DownloadError> {
        let guard = self.reserve_series()?;
        self.download_series_reserved(guard, series_url, chapters, settings)
            .await
    }

    /// [`download_series`](Self::download_series) for a slot already taken
    /// with [`reserve_series`](Self::reserve_series). The slot is released
    /// when this returns.
    pub async fn download_series_reserved(
        &self,
        _guard: InFlightGuard,
        series_url: &str,
        chapters: &[Chapter],
        settings: &DownloadSettings,
    ) -> Result<SeriesReport, DownloadError> {
        self.stop.reset();
        let title = self.manga_title(series_url).await;
        log::info!("Starting download for manga: {}", title);

        let total = chapters.len();
        let chapter_delay = Duration::from_millis(settings.chapter_delay);
        let mut seen = HashSet::new();
        let mut processed = 0;
        let mut stopped = false;

        for (i, chapter) in chapters.iter().enumerate() {
            if self.stop.is_stopped() {
                log::info!("Download stopped by user");
                stopped = true;
                break;
            }
            if !seen.insert(chapter.url.as_str()) {
                log::info!("Skipping duplicate chapter: {} ({})", chapter.name, chapter.url);
                continue;
            }

            self.set_phase(SeriesPhase::Processing(i));
            self.status.update(
                format!("Processing chapter {}/{}: {}", i + 1, total, chapter.name),
                i + 1,
                total,
            );

            match self.process_chapter(&chapter.url, &chapter.name, &title).await {
                Ok(count) => {
                    processed += 1;
                    log::info!("Chapter {} yielded {} images", chapter.name, count);
                }
                Err(e) => log::warn!("Chapter {} failed: {}", chapter.name, e),
            }

            if i + 1 < total && !chapter_delay.is_zero() {
                tokio::time::sleep(chapter_delay).await;
            }
        }

        if stopped {
            self.set_phase(SeriesPhase::Stopped);
            return Ok(SeriesReport {
                title,
                processed,
                total,
                stopped: true,
                archive: None,
            });
        }

        if processed == 0 {
            self.set_phase(SeriesPhase::Error);
            self.status.error(DownloadError::ExtractionFailed);
            return Err(DownloadError::ExtractionFailed);
        }

        self.set_phase(SeriesPhase::Aggregating);
        self.status.update(
            format!("Creating ZIP file for {} chapters...", processed),
            total,
            total,
        );

        self.set_phase(SeriesPhase::Archiving);
        match self.download_pending_chapters(settings).await {
            Ok(report) => {
                self.set_phase(SeriesPhase::Done);
                Ok(SeriesReport {
                    title,
                    processed,
                    total,
                    stopped: false,
                    archive: Some(report),
                })
            }
            Err(e) => {
                self.set_phase(SeriesPhase::Error);
                Err(e)
            }
        }
    }
}
