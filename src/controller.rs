//! Message dispatch for the control surface.
//!
//! Every request arrives as a [`ControlMessage`] and gets one
//! [`ControlResponse`]. Archive jobs are fire-and-forget: the folder is
//! reserved before the task is spawned, so a duplicate request is rejected in
//! its own response, and progress is observed through the [`StatusBoard`].

use crate::error::DownloadError;
use crate::fetcher::ImageFetch;
use crate::models::{Chapter, DownloadSettings, JobProgress};
use crate::orchestrator::{archive_items, DownloadOrchestrator};
use crate::page::PageAutomation;
use crate::progress::StatusBoard;
use crate::series::SeriesDownloader;
use crate::sink::DownloadSink;
use crate::storage::Store;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ControlMessage {
    DownloadImage {
        url: String,
        filename: String,
    },
    DownloadAsZip {
        urls: Vec<String>,
        folder_name: String,
        #[serde(default)]
        is_current_chapter: bool,
        #[serde(default)]
        settings: Option<DownloadSettings>,
    },
    CreateSingleChapterZip {
        urls: Vec<String>,
        folder_name: String,
        #[serde(default)]
        settings: Option<DownloadSettings>,
    },
    DownloadMangaChapter {
        chapter_url: String,
        chapter_name: String,
        manga_title: String,
        #[serde(default)]
        settings: Option<DownloadSettings>,
    },
    DownloadPendingChapters {
        #[serde(default)]
        settings: Option<DownloadSettings>,
    },
    UpdateStatus {
        status: String,
        #[serde(default)]
        current: usize,
        #[serde(default)]
        total: usize,
    },
    GetStatus,
    ChaptersScraped {
        chapters: Vec<Chapter>,
    },
    FetchChapters {
        series_url: String,
        #[serde(default)]
        range: String,
    },
    DownloadSeries {
        series_url: String,
        chapters: Vec<Chapter>,
        #[serde(default)]
        settings: Option<DownloadSettings>,
    },
    StopDownload,
    SaveSettings {
        settings: DownloadSettings,
    },
    GetSettings,
    GetChapters,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapters: Option<Vec<Chapter>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scraped_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<DownloadSettings>,
}

impl ControlResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failed(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

impl From<Result<(), DownloadError>> for ControlResponse {
    fn from(result: Result<(), DownloadError>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(e) => Self::failed(e),
        }
    }
}

/// Notifications pushed to listeners other than the requester
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ControlEvent {
    ChaptersUpdated { count: usize },
}

pub struct Controller<A, F, S> {
    orchestrator: Arc<DownloadOrchestrator<F, S>>,
    series: Arc<SeriesDownloader<A, F, S>>,
    store: Store,
    status: StatusBoard,
    defaults: DownloadSettings,
    events: broadcast::Sender<ControlEvent>,
}

impl<A, F, S> Controller<A, F, S>
where
    A: PageAutomation + 'static,
    F: ImageFetch + 'static,
    S: DownloadSink + 'static,
{
    pub fn new(
        orchestrator: Arc<DownloadOrchestrator<F, S>>,
        series: Arc<SeriesDownloader<A, F, S>>,
        store: Store,
        status: StatusBoard,
        defaults: DownloadSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            orchestrator,
            series,
            store,
            status,
            defaults,
            events,
        }
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControlEvent> {
        self.events.subscribe()
    }

    /// Settings from the request, else persisted, else configured
    pub fn resolve_settings(&self, requested: Option<DownloadSettings>) -> DownloadSettings {
        if let Some(settings) = requested {
            return settings.normalized();
        }
        match self.store.load_settings() {
            Ok(Some(saved)) => saved.normalized(),
            Ok(None) => self.defaults,
            Err(e) => {
                log::warn!("Could not read saved settings, using defaults: {}", e);
                self.defaults
            }
        }
    }

    pub async fn handle(&self, message: ControlMessage) -> ControlResponse {
        match message {
            ControlMessage::DownloadImage { url, filename } => {
                log::info!("Downloading image: {} -> {}", url, filename);
                match self.orchestrator.download_image(&url, &filename).await {
                    Ok(id) => ControlResponse {
                        download_id: Some(id),
                        ..ControlResponse::ok()
                    },
                    Err(e) => ControlResponse::failed(e),
                }
            }
            ControlMessage::DownloadAsZip {
                urls,
                folder_name,
                is_current_chapter,
                settings,
            } => {
                log::info!(
                    "Received request to create ZIP with {} images for {} (current chapter: {})",
                    urls.len(),
                    folder_name,
                    is_current_chapter
                );
                self.spawn_zip(urls, folder_name, settings).into()
            }
            ControlMessage::CreateSingleChapterZip {
                urls,
                folder_name,
                settings,
            } => {
                log::info!(
                    "Received request to create single chapter ZIP with {} images for {}",
                    urls.len(),
                    folder_name
                );
                self.spawn_zip(urls, folder_name, settings).into()
            }
            ControlMessage::DownloadMangaChapter {
                chapter_url,
                chapter_name,
                manga_title,
                settings: _,
            } => self
                .series
                .process_chapter(&chapter_url, &chapter_name, &manga_title)
                .await
                .map(|_| ())
                .into(),
            ControlMessage::DownloadPendingChapters { settings } => {
                self.spawn_pending(settings).into()
            }
            ControlMessage::UpdateStatus {
                status,
                current,
                total,
            } => {
                self.status.update(status, current, total);
                ControlResponse::ok()
            }
            ControlMessage::GetStatus => ControlResponse {
                status: Some(self.status.snapshot()),
                ..ControlResponse::ok()
            },
            ControlMessage::ChaptersScraped { chapters } => self.chapters_scraped(chapters),
            ControlMessage::FetchChapters { series_url, range } => {
                match self.series.fetch_chapters(&series_url, &range).await {
                    Ok(chapters) => ControlResponse {
                        chapters: Some(chapters),
                        ..ControlResponse::ok()
                    },
                    Err(e) => {
                        log::error!("Error fetching chapters from {}: {}", series_url, e);
                        ControlResponse::failed(e)
                    }
                }
            }
            ControlMessage::DownloadSeries {
                series_url,
                chapters,
                settings,
            } => {
                self.spawn_series(series_url, chapters, settings).into()
            }
            ControlMessage::StopDownload => {
                log::info!("Stop requested");
                self.series.stop_handle().stop();
                ControlResponse::ok()
            }
            ControlMessage::SaveSettings { settings } => {
                match self.store.save_settings(&settings) {
                    Ok(()) => ControlResponse {
                        settings: Some(settings.normalized()),
                        ..ControlResponse::ok()
                    },
                    Err(e) => ControlResponse::failed(e),
                }
            }
            ControlMessage::GetSettings => ControlResponse {
                settings: Some(self.resolve_settings(None)),
                ..ControlResponse::ok()
            },
            ControlMessage::GetChapters => match self.store.load_scraped_chapters() {
                Ok(cached) => {
                    let (chapters, time) = cached
                        .map(|c| (c.chapters, Some(c.last_scraped_time)))
                        .unwrap_or_default();
                    ControlResponse {
                        chapters: Some(chapters),
                        last_scraped_time: time,
                        ..ControlResponse::ok()
                    }
                }
                Err(e) => ControlResponse::failed(e),
            },
        }
    }

    fn spawn_zip(
        &self,
        urls: Vec<String>,
        folder: String,
        settings: Option<DownloadSettings>,
    ) -> Result<(), DownloadError> {
        let guard = self.orchestrator.reserve_folder(&folder)?;
        let items = archive_items(&urls, &folder);
        log::info!(
            "After deduplication: {} unique URLs (was {})",
            items.len(),
            urls.len()
        );
        self.status.update(
            format!("Creating ZIP file with {} images...", items.len()),
            0,
            items.len(),
        );

        let settings = self.resolve_settings(settings);
        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            // failures are already on the status board
            if let Err(e) = orchestrator.zip_reserved(guard, items, &settings).await {
                log::debug!("ZIP job for {} ended with: {}", folder, e);
            }
        });
        Ok(())
    }

    fn spawn_pending(&self, settings: Option<DownloadSettings>) -> Result<(), DownloadError> {
        if self.store.load_pending_chapters()?.is_empty() {
            return Err(DownloadError::NoPendingChapters);
        }
        let settings = self.resolve_settings(settings);
        let series = self.series.clone();
        tokio::spawn(async move {
            if let Err(e) = series.download_pending_chapters(&settings).await {
                log::error!("Pending chapter download failed: {}", e);
            }
        });
        Ok(())
    }

    fn spawn_series(
        &self,
        series_url: String,
        chapters: Vec<Chapter>,
        settings: Option<DownloadSettings>,
    ) -> Result<(), DownloadError> {
        let guard = self.series.reserve_series()?;
        let settings = self.resolve_settings(settings);
        let series = self.series.clone();
        tokio::spawn(async move {
            match series
                .download_series_reserved(guard, &series_url, &chapters, &settings)
                .await
            {
                Ok(report) if report.stopped => log::info!(
                    "Series {} stopped after {}/{} chapters",
                    report.title,
                    report.processed,
                    report.total
                ),
                Ok(report) => log::info!(
                    "Series {} finished: {} chapters archived",
                    report.title,
                    report.processed
                ),
                Err(e) => log::error!("Series download from {} failed: {}", series_url, e),
            }
        });
        Ok(())
    }

    fn chapters_scraped(&self, chapters: Vec<Chapter>) -> ControlResponse {
        log::info!("Received scraped chapters: {}", chapters.len());
        match self.store.save_scraped_chapters(&chapters) {
            Ok(saved) => {
                let count = saved.chapters.len();
                if self.events.send(ControlEvent::ChaptersUpdated { count }).is_err() {
                    log::debug!("No listener to receive chapter update");
                }
                ControlResponse::ok()
            }
            Err(e) => {
                log::error!("Failed to store scraped chapters: {}", e);
                ControlResponse::failed(e)
            }
        }
    }
}
