use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// Flags needed to run Chrome inside containers
const CONTAINER_FLAGS: &[&str] = &["--disable-dev-shm-usage", "--no-sandbox"];

/// How Chrome is launched and how long a freshly opened tab is given to
/// render before extraction runs
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserConfig {
    pub headless: bool,
    pub window_size: (u32, u32),
    pub user_agent: Option<String>,
    /// Navigation timeout in seconds
    pub timeout_seconds: u64,
    /// Pause after navigation so lazy images and listings can render
    pub settle_ms: u64,
    pub extra_flags: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: (1280, 2000),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            timeout_seconds: 30,
            settle_ms: 3000,
            extra_flags: Vec::new(),
        }
    }
}

impl BrowserConfig {
    /// Visible window, for watching a listing expand
    pub fn visible() -> Self {
        Self {
            headless: false,
            ..Self::default()
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle_ms = settle.as_millis() as u64;
        self
    }

    /// Container flags followed by any configured extras
    pub fn launch_args(&self) -> Vec<String> {
        CONTAINER_FLAGS
            .iter()
            .map(|f| f.to_string())
            .chain(self.extra_flags.iter().cloned())
            .collect()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}
