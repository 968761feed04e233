//! Error types for each seam of the pipeline.

use thiserror::Error;

/// Errors raised by a page (static HTML or a live browser tab)
#[derive(Debug, Error)]
pub enum PageError {
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("JavaScript execution error: {0}")]
    Script(String),

    #[error("Operation not supported by this page: {0}")]
    Unsupported(&'static str),

    #[error("Failed to load page: {0}")]
    Load(String),
}

/// Errors raised while extracting images or chapters from a page
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("No manga images found on this page")]
    NoImages,

    #[error("No chapters found for this manga")]
    NoChapters,

    #[error("Invalid chapter range: {0}")]
    InvalidRange(String),

    #[error(transparent)]
    Page(#[from] PageError),
}

/// Errors raised by the persistent key-value store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Stored value is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Errors surfaced to the caller of a download job
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("ZIP download already in progress")]
    AlreadyInProgress,

    #[error("Chapter already being processed")]
    ChapterInProgress,

    #[error("Series download already in progress")]
    SeriesInProgress,

    #[error("Duplicate image")]
    DuplicateImage,

    #[error("No pending chapters to download")]
    NoPendingChapters,

    #[error("Failed to extract images")]
    ExtractionFailed,

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
