use serde::{Deserialize, Serialize};

/// One image discovered on a chapter page.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ImageRef {
    pub url: String,
    /// 1-based position, used for the zero-padded archive filename
    pub ordinal: usize,
}

/// Where a chapter's number came from
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum NumberSource {
    Url,
    Text,
    /// `total - index`, assumes the listing is newest-first
    Fallback,
    /// Re-derived from the display name after enumeration
    Name,
    #[default]
    Unknown,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Chapter {
    pub url: String,
    pub name: String,
    pub number: Option<f64>,
    #[serde(default, rename = "numberSource")]
    pub number_source: NumberSource,
}

impl Chapter {
    /// Sort key: missing numbers sort as 0
    pub fn sort_number(&self) -> f64 {
        self.number.filter(|n| !n.is_nan()).unwrap_or(0.0)
    }
}

/// Process-wide progress snapshot observed by the control surface.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub status: String,
    pub current: usize,
    pub total: usize,
    pub in_progress: bool,
}

impl JobProgress {
    /// Terminal states are the completion and error messages
    pub fn is_terminal_status(status: &str) -> bool {
        status.contains("Completed") || status.contains("Error")
    }
}

/// One (URL, archive path) pair handed to the archive builder.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ArchiveItem {
    pub url: String,
    pub path: String,
}

/// Bytes staged for one archive slot.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub path: String,
    pub bytes: Vec<u8>,
}

/// Images recorded for one chapter folder, waiting to be archived.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PendingChapter {
    pub folder: String,
    pub urls: Vec<String>,
}

/// Per-job knobs supplied by the control surface.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadSettings {
    #[serde(default = "default_download_delay")]
    pub download_delay: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_chapter_delay")]
    pub chapter_delay: u64,
}

pub const MAX_DOWNLOAD_DELAY_MS: u64 = 5000;
pub const MAX_BATCH_SIZE: usize = 10;

fn default_download_delay() -> u64 {
    300
}

fn default_batch_size() -> usize {
    3
}

fn default_chapter_delay() -> u64 {
    1000
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            download_delay: default_download_delay(),
            batch_size: default_batch_size(),
            chapter_delay: default_chapter_delay(),
        }
    }
}

impl DownloadSettings {
    /// Clamp values into the ranges the settings form allows
    pub fn normalized(self) -> Self {
        Self {
            download_delay: self.download_delay.min(MAX_DOWNLOAD_DELAY_MS),
            batch_size: self.batch_size.clamp(1, MAX_BATCH_SIZE),
            chapter_delay: self.chapter_delay,
        }
    }
}

/// Cached result of the last chapter scrape.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedChapters {
    pub chapters: Vec<Chapter>,
    /// Unix milliseconds
    pub last_scraped_time: i64,
}
