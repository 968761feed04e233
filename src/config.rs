use crate::models::{DownloadSettings, MAX_BATCH_SIZE, MAX_DOWNLOAD_DELAY_MS};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_download_dir")]
    pub download_dir: String,

    /// SQLite file holding pending chapters, the chapter cache and settings
    #[serde(default = "default_data_file")]
    pub data_file: String,

    /// Inclusive range of ports tried for the control server
    #[serde(default = "default_port_range")]
    pub port_range: [u16; 2],

    #[serde(default)]
    pub download: DownloadConfig,

    #[serde(default)]
    pub browser: BrowserSection,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DownloadConfig {
    /// Pause between archive items in milliseconds
    #[serde(default = "default_download_delay")]
    pub download_delay_ms: u64,

    /// Concurrent downloads in the non-archive path
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between chapters of a series in milliseconds
    #[serde(default = "default_chapter_delay")]
    pub chapter_delay_ms: u64,

    /// Timeout per image fetch strategy in seconds
    #[serde(default = "default_timeout")]
    pub fetch_timeout_secs: u64,

    /// Attempts per page load
    #[serde(default = "default_page_retries")]
    pub page_retries: usize,

    #[serde(default = "default_page_retry_delay")]
    pub page_retry_delay_ms: u64,

    /// Wait after a page loads before it is read
    #[serde(default = "default_page_settle")]
    pub page_settle_ms: u64,

    #[serde(default = "default_expand_click_settle")]
    pub expand_click_settle_ms: u64,

    #[serde(default = "default_expand_extra_settle")]
    pub expand_extra_settle_ms: u64,

    #[serde(default = "default_expand_final_settle")]
    pub expand_final_settle_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrowserSection {
    /// Use headless Chrome instead of plain HTTP for page loads
    #[serde(default = "default_false")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

fn default_download_dir() -> String {
    "downloads".to_string()
}

fn default_data_file() -> String {
    "manga_zip.db".to_string()
}

fn default_port_range() -> [u16; 2] {
    [8080, 8090]
}

fn default_download_delay() -> u64 {
    300
}

fn default_batch_size() -> usize {
    3
}

fn default_chapter_delay() -> u64 {
    1000
}

fn default_timeout() -> u64 {
    30
}

fn default_page_retries() -> usize {
    3
}

fn default_page_retry_delay() -> u64 {
    1000
}

fn default_page_settle() -> u64 {
    3000
}

fn default_expand_click_settle() -> u64 {
    2000
}

fn default_expand_extra_settle() -> u64 {
    1500
}

fn default_expand_final_settle() -> u64 {
    1000
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_delay_ms: default_download_delay(),
            batch_size: default_batch_size(),
            chapter_delay_ms: default_chapter_delay(),
            fetch_timeout_secs: default_timeout(),
            page_retries: default_page_retries(),
            page_retry_delay_ms: default_page_retry_delay(),
            page_settle_ms: default_page_settle(),
            expand_click_settle_ms: default_expand_click_settle(),
            expand_extra_settle_ms: default_expand_extra_settle(),
            expand_final_settle_ms: default_expand_final_settle(),
        }
    }
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            enabled: false, // requires Chrome
            headless: true,
            timeout_secs: default_timeout(),
            user_agent: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            data_file: default_data_file(),
            port_range: default_port_range(),
            download: DownloadConfig::default(),
            browser: BrowserSection::default(),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(Path::new("config.toml"))
    }

    /// Parse a config file, falling back to defaults when it is missing or
    /// malformed
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<Config>(&content) {
                    Ok(cfg) => return cfg,
                    Err(e) => log::warn!("Ignoring malformed {}: {}", path.display(), e),
                },
                Err(e) => log::warn!("Could not read {}: {}", path.display(), e),
            }
        }
        Self::default()
    }

    pub fn ports(&self) -> std::ops::RangeInclusive<u16> {
        let [start, end] = self.port_range;
        start..=end.max(start)
    }
}

impl DownloadConfig {
    /// Settings used when a request carries none and none are persisted
    pub fn default_settings(&self) -> DownloadSettings {
        DownloadSettings {
            download_delay: self.download_delay_ms.min(MAX_DOWNLOAD_DELAY_MS),
            batch_size: self.batch_size.clamp(1, MAX_BATCH_SIZE),
            chapter_delay: self.chapter_delay_ms,
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Page-level HTTP client. It makes a single attempt per load; the
    /// series downloader owns the `page_retries` budget.
    pub fn create_http_client(&self) -> Result<crate::http_client::EnhancedHttpClient, reqwest::Error> {
        use crate::http_client::{EnhancedHttpClient, HttpClientConfig};

        EnhancedHttpClient::with_config(HttpClientConfig {
            timeout: self.fetch_timeout(),
            max_attempts: 1,
            retry_delay: Duration::from_millis(self.page_retry_delay_ms),
            enable_cookies: true,
        })
    }

    pub fn series_config(&self) -> crate::series::SeriesConfig {
        use crate::chapter_enumerator::ExpansionTimings;
        use crate::series::SeriesConfig;

        SeriesConfig {
            page_retries: self.page_retries.max(1),
            page_retry_delay: Duration::from_millis(self.page_retry_delay_ms),
            expansion: ExpansionTimings {
                click_settle: Duration::from_millis(self.expand_click_settle_ms),
                extra_settle: Duration::from_millis(self.expand_extra_settle_ms),
                final_settle: Duration::from_millis(self.expand_final_settle_ms),
            },
            ..SeriesConfig::default()
        }
    }
}

impl BrowserSection {
    pub fn browser_config(&self, settle_ms: u64) -> crate::browser::BrowserConfig {
        let defaults = crate::browser::BrowserConfig::default();
        crate::browser::BrowserConfig {
            headless: self.headless,
            timeout_seconds: self.timeout_secs,
            settle_ms,
            user_agent: self.user_agent.clone().or(defaults.user_agent.clone()),
            ..defaults
        }
    }
}
