// Library interface for manga_zip_downloader
// The binary and the integration tests both build on these components

pub mod app_state;
pub mod archive;
pub mod browser;
pub mod chapter_enumerator;
pub mod config;
pub mod controller;
pub mod error;
pub mod fetcher;
pub mod helpers;
pub mod http_client;
pub mod image_selector;
pub mod inflight;
pub mod models;
pub mod orchestrator;
pub mod page;
pub mod progress;
pub mod series;
pub mod sink;
pub mod storage;
