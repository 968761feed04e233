use super::config::BrowserConfig;
use crate::error::PageError;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::Arc;

/// Owns the Chrome process and hands out configured tabs
pub struct BrowserManager {
    browser: Arc<Browser>,
    config: BrowserConfig,
}

impl BrowserManager {
    pub fn new(config: BrowserConfig) -> Result<Self, BrowserError> {
        let browser = {
            let args = config.launch_args();
            let launch_options = Self::build_launch_options(&config, &args)?;
            Browser::new(launch_options)
                .map_err(|e| BrowserError::InitializationError(e.to_string()))?
        };
        log::info!(
            "Browser started (headless: {}, timeout: {}s)",
            config.headless,
            config.timeout_seconds
        );

        Ok(Self {
            browser: Arc::new(browser),
            config,
        })
    }

    fn build_launch_options<'a>(
        config: &BrowserConfig,
        args: &'a [String],
    ) -> Result<LaunchOptions<'a>, BrowserError> {
        let args: Vec<&OsStr> = args.iter().map(OsStr::new).collect();

        LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some((config.window_size.0, config.window_size.1)))
            .idle_browser_timeout(config.timeout() * 10)
            .args(args)
            .build()
            .map_err(|e| BrowserError::ConfigurationError(e.to_string()))
    }

    /// New tab with the configured timeout and user agent
    pub fn new_tab(&self) -> Result<Arc<Tab>, BrowserError> {
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| BrowserError::TabCreationError(e.to_string()))?;
        tab.set_default_timeout(self.config.timeout());
        if let Some(ua) = &self.config.user_agent {
            tab.set_user_agent(ua, None, None)
                .map_err(|e| BrowserError::TabCreationError(e.to_string()))?;
        }
        Ok(tab)
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }
}

/// Errors that can occur during browser operations
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("Browser initialization failed: {0}")]
    InitializationError(String),

    #[error("Browser configuration error: {0}")]
    ConfigurationError(String),

    #[error("Tab creation failed: {0}")]
    TabCreationError(String),

    #[error("Navigation error: {0}")]
    NavigationError(String),

    #[error("JavaScript execution error: {0}")]
    JavaScriptError(String),
}

impl From<BrowserError> for PageError {
    fn from(e: BrowserError) -> Self {
        match e {
            BrowserError::JavaScriptError(msg) => PageError::Script(msg),
            BrowserError::NavigationError(msg) => PageError::Navigation(msg),
            other => PageError::Load(other.to_string()),
        }
    }
}
