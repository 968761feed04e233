use super::manager::{BrowserError, BrowserManager};
use crate::error::PageError;
use crate::page::{PageAutomation, PageDom, PageElement};
use headless_chrome::Tab;
use std::sync::Arc;
use std::time::Duration;

/// Attribute used to give queried elements a stable identity for clicks
const ID_ATTR: &str = "data-mzd-id";

/// Script returning a JSON array of element snapshots for `selector`
fn query_script(selector: &str) -> Result<String, PageError> {
    let selector = serde_json::to_string(selector).map_err(|e| PageError::Script(e.to_string()))?;
    Ok(format!(
        r#"(() => {{
  const out = [];
  for (const el of document.querySelectorAll({selector})) {{
    let id = el.getAttribute('{attr}');
    if (!id) {{
      window.__mzdNext = (window.__mzdNext || 0) + 1;
      id = String(window.__mzdNext);
      el.setAttribute('{attr}', id);
    }}
    const tag = el.tagName.toLowerCase();
    const rect = el.getBoundingClientRect();
    out.push({{
      id: Number(id),
      tag: tag,
      text: el.textContent || '',
      href: typeof el.href === 'string' && el.href ? el.href : null,
      src: tag === 'img' && el.src ? el.src : null,
      width: tag === 'img' ? el.width : rect.width,
      top: rect.top + window.scrollY
    }});
  }}
  return JSON.stringify(out);
}})()"#,
        selector = selector,
        attr = ID_ATTR
    ))
}

fn click_script(id: u64) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector('[{attr}="{id}"]');
  if (!el) return false;
  el.click();
  return true;
}})()"#,
        attr = ID_ATTR,
        id = id
    )
}

/// A live Chrome tab. The tab is closed when the page is dropped.
pub struct BrowserPage {
    tab: Arc<Tab>,
    url: String,
}

impl BrowserPage {
    /// Open `url` in a new tab and wait for navigation to finish
    pub fn open(manager: &BrowserManager, url: &str) -> Result<Self, BrowserError> {
        let tab = manager.new_tab()?;
        tab.navigate_to(url)
            .map_err(|e| BrowserError::NavigationError(format!("Failed to navigate to {}: {}", url, e)))?;
        tab.wait_until_navigated()
            .map_err(|e| BrowserError::NavigationError(format!("Navigation timeout for {}: {}", url, e)))?;

        Ok(Self {
            tab,
            url: url.to_string(),
        })
    }

    /// Run a CDP round-trip on the blocking pool
    async fn on_tab<T, F>(&self, work: F) -> Result<T, PageError>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T, PageError> + Send + 'static,
    {
        let tab = self.tab.clone();
        tokio::task::spawn_blocking(move || work(&*tab))
            .await
            .map_err(|e| PageError::Script(e.to_string()))?
    }
}

fn evaluate_string(tab: &Tab, script: &str) -> Result<String, PageError> {
    let result = tab
        .evaluate(script, false)
        .map_err(|e| PageError::Script(e.to_string()))?;
    result
        .value
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .ok_or_else(|| PageError::Script("Script returned no value".to_string()))
}

impl PageDom for BrowserPage {
    fn url(&self) -> &str {
        &self.url
    }

    async fn title(&self) -> Result<String, PageError> {
        self.on_tab(|tab| tab.get_title().map_err(|e| PageError::Script(e.to_string())))
            .await
    }

    async fn query(&self, selector: &str) -> Result<Vec<PageElement>, PageError> {
        let script = query_script(selector)?;
        let selector = selector.to_string();
        self.on_tab(move |tab| {
            let json = evaluate_string(tab, &script)?;
            serde_json::from_str(&json).map_err(|e| PageError::Script(format!("{}: {}", selector, e)))
        })
        .await
    }

    async fn click(&self, element: &PageElement) -> Result<(), PageError> {
        let id = element.id;
        self.on_tab(move |tab| {
            let result = tab
                .evaluate(&click_script(id), false)
                .map_err(|e| PageError::Script(format!("Click failed: {}", e)))?;
            match result.value.and_then(|v| v.as_bool()) {
                Some(true) => Ok(()),
                _ => Err(PageError::Script(format!("Element {} is no longer on the page", id))),
            }
        })
        .await
    }
}

impl Drop for BrowserPage {
    fn drop(&mut self) {
        let tab = self.tab.clone();
        let url = std::mem::take(&mut self.url);
        let close = move || {
            if let Err(e) = tab.close(true) {
                log::warn!("Error closing tab for {}: {}", url, e);
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(close);
            }
            Err(_) => close(),
        }
    }
}

/// [`PageAutomation`] backed by headless Chrome
#[derive(Clone)]
pub struct BrowserPageLoader {
    manager: Arc<BrowserManager>,
    settle: Duration,
}

impl BrowserPageLoader {
    pub fn new(manager: Arc<BrowserManager>) -> Self {
        let settle = manager.config().settle();
        Self { manager, settle }
    }
}

impl PageAutomation for BrowserPageLoader {
    type Page = BrowserPage;

    async fn open(&self, url: &str) -> Result<BrowserPage, PageError> {
        let manager = self.manager.clone();
        let target = url.to_string();
        let page = tokio::task::spawn_blocking(move || BrowserPage::open(&manager, &target))
            .await
            .map_err(|e| PageError::Load(e.to_string()))??;

        log::debug!("Opened {} in browser, settling for {:?}", url, self.settle);
        tokio::time::sleep(self.settle).await;
        Ok(page)
    }
}
