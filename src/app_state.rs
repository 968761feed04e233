//! Application state for the Actix-web server
//!
//! Wires the production collaborators (HTTP or Chrome page loading, the
//! two-strategy image fetcher, the download directory and the SQLite store)
//! into one [`Controller`] shared by every handler through `web::Data`.

use crate::browser::{BrowserError, BrowserManager, BrowserPage, BrowserPageLoader};
use crate::config::Config;
use crate::controller::Controller;
use crate::error::{PageError, StorageError};
use crate::fetcher::ResilientFetcher;
use crate::orchestrator::DownloadOrchestrator;
use crate::page::{HttpPageLoader, PageAutomation, PageDom, PageElement, StaticPage};
use crate::progress::StatusBoard;
use crate::series::SeriesDownloader;
use crate::sink::DirectorySink;
use crate::storage::Store;
use std::sync::Arc;
use std::time::Duration;

/// Page loading chosen at startup from `[browser] enabled`
pub enum PageLoader {
    Http(HttpPageLoader),
    Browser(BrowserPageLoader),
}

pub enum LoadedPage {
    Static(StaticPage),
    Browser(BrowserPage),
}

impl PageDom for LoadedPage {
    fn url(&self) -> &str {
        match self {
            LoadedPage::Static(p) => p.url(),
            LoadedPage::Browser(p) => p.url(),
        }
    }

    async fn title(&self) -> Result<String, PageError> {
        match self {
            LoadedPage::Static(p) => p.title().await,
            LoadedPage::Browser(p) => p.title().await,
        }
    }

    async fn query(&self, selector: &str) -> Result<Vec<PageElement>, PageError> {
        match self {
            LoadedPage::Static(p) => p.query(selector).await,
            LoadedPage::Browser(p) => p.query(selector).await,
        }
    }

    async fn click(&self, element: &PageElement) -> Result<(), PageError> {
        match self {
            LoadedPage::Static(p) => p.click(element).await,
            LoadedPage::Browser(p) => p.click(element).await,
        }
    }
}

impl PageAutomation for PageLoader {
    type Page = LoadedPage;

    async fn open(&self, url: &str) -> Result<LoadedPage, PageError> {
        match self {
            PageLoader::Http(loader) => loader.open(url).await.map(LoadedPage::Static),
            PageLoader::Browser(loader) => loader.open(url).await.map(LoadedPage::Browser),
        }
    }
}

pub type AppController = Controller<PageLoader, ResilientFetcher, DirectorySink>;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Failed to create HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

/// Shared application state for Actix-web handlers
pub struct AppState {
    pub controller: AppController,
    pub config: Config,
}

impl AppState {
    pub fn build(config: Config) -> Result<Self, StartupError> {
        let download = &config.download;
        let store = Store::open(&config.data_file)?;
        let status = StatusBoard::new();

        let fetcher = Arc::new(ResilientFetcher::new(download.fetch_timeout())?);
        let sink = Arc::new(DirectorySink::new(
            &config.download_dir,
            reqwest::Client::builder()
                .timeout(download.fetch_timeout())
                .build()?,
        ));
        let orchestrator = Arc::new(DownloadOrchestrator::new(fetcher, sink, status.clone()));

        let loader = if config.browser.enabled {
            let browser_config = config.browser.browser_config(download.page_settle_ms);
            let manager = Arc::new(BrowserManager::new(browser_config)?);
            PageLoader::Browser(BrowserPageLoader::new(manager))
        } else {
            let client = download.create_http_client()?;
            PageLoader::Http(
                HttpPageLoader::new(client).with_settle(Duration::from_millis(download.page_settle_ms)),
            )
        };

        let series = Arc::new(SeriesDownloader::new(
            Arc::new(loader),
            orchestrator.clone(),
            store.clone(),
            status.clone(),
            download.series_config(),
        ));
        let controller = Controller::new(
            orchestrator,
            series,
            store,
            status,
            download.default_settings(),
        );

        Ok(Self { controller, config })
    }
}
