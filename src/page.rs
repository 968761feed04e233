//! DOM read interface shared by the image selector and the chapter enumerator
//!
//! Extraction logic never touches a browser directly. It runs against
//! [`PageDom`], which hands back serializable [`PageElement`] snapshots, so the
//! same code works on a live Chrome tab, on static HTML, and on test fakes.

use crate::error::PageError;
use crate::helpers::resolve_url;
use crate::http_client::EnhancedHttpClient;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

static STYLE_WIDTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:^|;)\s*width\s*:\s*(\d+(?:\.\d+)?)px").unwrap());

/// Snapshot of one element, as seen by the page that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageElement {
    /// Stable identity within one page, used to click and to compare elements
    pub id: u64,
    pub tag: String,
    #[serde(default)]
    pub text: String,
    /// Absolute link target
    #[serde(default)]
    pub href: Option<String>,
    /// Absolute image source
    #[serde(default)]
    pub src: Option<String>,
    /// Rendered width in CSS pixels; `None` when the page has no layout
    #[serde(default)]
    pub width: Option<f64>,
    /// Vertical position, used to restore visual order
    #[serde(default)]
    pub top: f64,
}

/// Read (and minimal interaction) access to a loaded document.
///
/// Implementations backed by a live browser must not block the runtime.
pub trait PageDom: Send + Sync {
    /// Address of the loaded document
    fn url(&self) -> &str;

    /// `document.title`
    fn title(&self) -> impl Future<Output = Result<String, PageError>> + Send;

    /// All elements matching a CSS selector group, in document order
    fn query(&self, selector: &str) -> impl Future<Output = Result<Vec<PageElement>, PageError>> + Send;

    /// Click an element previously returned by [`PageDom::query`]
    fn click(&self, element: &PageElement) -> impl Future<Output = Result<(), PageError>> + Send;
}

/// Page-automation collaborator: opens a URL and hands back a live page
pub trait PageAutomation: Send + Sync {
    type Page: PageDom;

    fn open(&self, url: &str) -> impl Future<Output = Result<Self::Page, PageError>> + Send;
}

/// A [`PageDom`] over fetched HTML. No layout and no scripting, so clicks
/// are unsupported and widths come from markup only.
#[derive(Debug, Clone)]
pub struct StaticPage {
    url: String,
    html: String,
}

impl StaticPage {
    pub fn new(html: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    fn snapshot(&self, element: ElementRef<'_>, order: usize) -> PageElement {
        let value = element.value();
        let tag = value.name().to_ascii_lowercase();
        let href = if tag == "a" || tag == "area" {
            value.attr("href").and_then(|h| resolve_url(&self.url, h))
        } else {
            None
        };
        let src = if tag == "img" {
            value
                .attr("src")
                .filter(|s| !s.trim().is_empty())
                .or_else(|| value.attr("data-src"))
                .and_then(|s| resolve_url(&self.url, s))
        } else {
            None
        };

        PageElement {
            id: order as u64,
            tag,
            text: element.text().collect::<String>(),
            href,
            src,
            width: markup_width(element),
            top: order as f64,
        }
    }
}

/// Width declared by a `width` attribute or an inline `width: Npx` style
fn markup_width(element: ElementRef<'_>) -> Option<f64> {
    let value = element.value();
    if let Some(w) = value.attr("width") {
        if let Ok(n) = w.trim().trim_end_matches("px").parse::<f64>() {
            return Some(n);
        }
    }
    value
        .attr("style")
        .and_then(|style| STYLE_WIDTH_RE.captures(style))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

impl PageDom for StaticPage {
    fn url(&self) -> &str {
        &self.url
    }

    async fn title(&self) -> Result<String, PageError> {
        let document = Html::parse_document(&self.html);
        let selector = Selector::parse("title")
            .map_err(|e| PageError::InvalidSelector(format!("title: {:?}", e)))?;
        Ok(document
            .select(&selector)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .unwrap_or_default())
    }

    async fn query(&self, selector: &str) -> Result<Vec<PageElement>, PageError> {
        let parsed = Selector::parse(selector)
            .map_err(|e| PageError::InvalidSelector(format!("{}: {:?}", selector, e)))?;
        let document = Html::parse_document(&self.html);
        let order: HashMap<_, usize> = document
            .tree
            .root()
            .descendants()
            .enumerate()
            .map(|(i, node)| (node.id(), i))
            .collect();

        Ok(document
            .select(&parsed)
            .map(|el| {
                let position = order.get(&el.id()).copied().unwrap_or_default();
                self.snapshot(el, position)
            })
            .collect())
    }

    async fn click(&self, _element: &PageElement) -> Result<(), PageError> {
        Err(PageError::Unsupported("click on static HTML"))
    }
}

/// Loads pages over plain HTTP; used when the browser is disabled
#[derive(Clone)]
pub struct HttpPageLoader {
    client: EnhancedHttpClient,
    settle: Duration,
}

impl HttpPageLoader {
    pub fn new(client: EnhancedHttpClient) -> Self {
        Self {
            client,
            settle: Duration::ZERO,
        }
    }

    /// Pause after each load, to keep pacing identical to the browser path
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

impl PageAutomation for HttpPageLoader {
    type Page = StaticPage;

    async fn open(&self, url: &str) -> Result<StaticPage, PageError> {
        log::debug!("Loading page over HTTP: {}", url);
        let html = self
            .client
            .get_text(url)
            .await
            .map_err(|e| PageError::Load(format!("{}: {}", url, e)))?;
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }
        Ok(StaticPage::new(html, url))
    }
}
