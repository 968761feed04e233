//! Headless Chrome page automation
//!
//! Chapter pages and series listings are usually rendered by JavaScript and
//! lazy-load their images, so the extraction code runs against a live tab.
//! Element queries and clicks are injected as scripts and come back as JSON
//! [`PageElement`](crate::page::PageElement) snapshots.
//!
//! # Example
//!
//! ```no_run
//! use manga_zip_downloader::browser::{BrowserConfig, BrowserManager, BrowserPageLoader};
//! use manga_zip_downloader::page::{PageAutomation, PageDom};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = Arc::new(BrowserManager::new(BrowserConfig::default())?);
//! let loader = BrowserPageLoader::new(manager);
//!
//! let page = loader.open("https://example.com").await?;
//! let images = page.query("img").await?;
//! println!("Found {} images", images.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod manager;
pub mod page;

pub use config::BrowserConfig;
pub use manager::{BrowserError, BrowserManager};
pub use page::{BrowserPage, BrowserPageLoader};
