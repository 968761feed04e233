//! In-process collaborators shared by the integration tests
#![allow(dead_code)]

use manga_zip_downloader::error::{DownloadError, PageError};
use manga_zip_downloader::fetcher::{FetchOutcome, ImageFetch};
use manga_zip_downloader::page::{PageAutomation, StaticPage};
use manga_zip_downloader::sink::DownloadSink;
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Serves `url` bytes for every URL, a placeholder for the failing ones
#[derive(Default)]
pub struct FakeFetcher {
    failing: HashSet<String>,
    delay: Duration,
    pub calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(urls: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing: urls.iter().map(|u| u.to_string()).collect(),
            ..Self::default()
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ImageFetch for FakeFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        self.calls.lock().unwrap().push(url.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.contains(url) {
            FetchOutcome::Placeholder
        } else {
            FetchOutcome::Fetched(url.as_bytes().to_vec())
        }
    }
}

/// Keeps saved files in memory
#[derive(Default)]
pub struct MemorySink {
    pub files: Mutex<Vec<(String, Vec<u8>)>>,
    pub urls: Mutex<Vec<(String, String)>>,
    pub fail_saves: bool,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            fail_saves: true,
            ..Self::default()
        })
    }

    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, bytes)| bytes.clone())
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
    }
}

impl DownloadSink for MemorySink {
    async fn save_bytes(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, DownloadError> {
        if self.fail_saves {
            return Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "disk is read-only").into());
        }
        self.files.lock().unwrap().push((filename.to_string(), bytes.to_vec()));
        Ok(PathBuf::from(filename))
    }

    async fn save_url(&self, url: &str, filename: &str) -> Result<PathBuf, DownloadError> {
        self.urls
            .lock()
            .unwrap()
            .push((url.to_string(), filename.to_string()));
        Ok(PathBuf::from(filename))
    }
}

/// Serves canned HTML per URL; unknown URLs fail to load
#[derive(Default)]
pub struct FakeSite {
    pages: HashMap<String, String>,
    /// Loads that fail before the page is served
    flaky: Mutex<HashMap<String, usize>>,
    pub opened: Mutex<Vec<String>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.pages.insert(url.to_string(), html.into());
        self
    }

    pub fn flaky(self, url: &str, failures: usize) -> Self {
        self.flaky.lock().unwrap().insert(url.to_string(), failures);
        self
    }

    pub fn open_count(&self, url: &str) -> usize {
        self.opened.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

impl PageAutomation for FakeSite {
    type Page = StaticPage;

    async fn open(&self, url: &str) -> Result<StaticPage, PageError> {
        self.opened.lock().unwrap().push(url.to_string());
        if let Some(left) = self.flaky.lock().unwrap().get_mut(url) {
            if *left > 0 {
                *left -= 1;
                return Err(PageError::Load(format!("{}: connection reset", url)));
            }
        }
        self.pages
            .get(url)
            .map(|html| StaticPage::new(html.clone(), url))
            .ok_or_else(|| PageError::Load(format!("{}: 404", url)))
    }
}

/// Chapter page with `count` reader images
pub fn chapter_html(chapter: u32, count: u32) -> String {
    let images: String = (1..=count)
        .map(|i| {
            format!(
                r#"<img src="https://cdn.site.com/manga/solo/{}/{:03}.jpg" width="800">"#,
                chapter, i
            )
        })
        .collect();
    format!(
        r#"<html><head><title>Solo Leveling Chapter {} | Site</title></head>
        <body><img src="https://site.com/logo.png" width="300"><div class="reader">{}</div></body></html>"#,
        chapter, images
    )
}

/// Entry names and contents of a ZIP blob, in archive order
pub fn zip_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.to_vec())).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut file = archive.by_index(i).unwrap();
            let mut contents = Vec::new();
            file.read_to_end(&mut contents).unwrap();
            (file.name().to_string(), contents)
        })
        .collect()
}
