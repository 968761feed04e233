//! Locates the page images of a loaded chapter.
//!
//! Selectors run from most site-specific to most generic. In
//! [`SelectionMode::Union`] every selector contributes and the first element
//! seen for a URL wins; in [`SelectionMode::FirstMatch`] only the first
//! productive selector is used and results are put back in visual order.

use crate::error::ScrapeError;
use crate::models::ImageRef;
use crate::page::{PageDom, PageElement};
use std::collections::HashSet;

/// Candidate selectors, in priority order
pub const IMAGE_SELECTORS: &[&str] = &[
    r#"img[src*="/manga/"]"#,
    r#"img[src*="/chapters/"]"#,
    ".reader-content img",
    ".chapter-content img",
    ".manga-reader img",
    ".reader img",
    ".chapter img",
    r#".container img[src*="chapter"]"#,
    r#"img[src*="chapter"]"#,
    r#"img[src*=".jpg"], img[src*=".png"], img[src*=".jpeg"]"#,
];

/// URL fragments that mark decoration rather than page content
pub const BLOCKED_URL_PARTS: &[&str] = &["avatar", "icon", "logo", "banner", "brand"];

/// Images this narrow or narrower are icons and avatars
pub const MIN_IMAGE_WIDTH: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// Accumulate matches from every selector
    #[default]
    Union,
    /// Commit to the first selector that yields anything
    FirstMatch,
}

fn is_wide_enough(el: &PageElement) -> bool {
    el.width.map_or(true, |w| w > MIN_IMAGE_WIDTH)
}

fn has_source(el: &PageElement) -> bool {
    el.src.as_deref().is_some_and(|s| !s.is_empty())
}

fn is_blocked(url: &str) -> bool {
    let lower = url.to_lowercase();
    BLOCKED_URL_PARTS.iter().any(|part| lower.contains(part))
}

/// Query one selector and keep sized, sourced images. A failing selector
/// contributes nothing.
async fn candidates<P: PageDom + ?Sized>(page: &P, selector: &str) -> Vec<PageElement> {
    match page.query(selector).await {
        Ok(found) => {
            let kept: Vec<PageElement> = found
                .into_iter()
                .filter(|el| has_source(el) && is_wide_enough(el))
                .collect();
            log::debug!("Found {} images with selector: {}", kept.len(), selector);
            kept
        }
        Err(e) => {
            log::warn!("Selector {} failed: {}", selector, e);
            Vec::new()
        }
    }
}

async fn union_of_selectors<P: PageDom + ?Sized>(page: &P) -> Vec<PageElement> {
    let mut seen = HashSet::new();
    let mut images = Vec::new();
    for selector in IMAGE_SELECTORS {
        for el in candidates(page, selector).await {
            let src = el.src.clone().unwrap_or_default();
            if seen.insert(src) {
                images.push(el);
            }
        }
    }
    images
}

async fn first_productive_selector<P: PageDom + ?Sized>(page: &P) -> Vec<PageElement> {
    let mut images = Vec::new();
    for selector in IMAGE_SELECTORS {
        let found = candidates(page, selector).await;
        if !found.is_empty() {
            log::info!("Selected {} images using selector: {}", found.len(), selector);
            images = found;
            break;
        }
    }
    if images.is_empty() {
        log::info!("No images found with specific selectors, trying all images");
        images = candidates(page, "img")
            .await
            .into_iter()
            .filter(|el| !el.src.as_deref().unwrap_or_default().starts_with("data:"))
            .collect();
    }

    images.sort_by(|a, b| a.top.total_cmp(&b.top));

    let mut seen = HashSet::new();
    images.retain(|el| seen.insert(el.src.clone().unwrap_or_default()));
    images
}

/// Extract the ordered, deduplicated, filtered page images of a chapter.
///
/// Returns [`ScrapeError::NoImages`] when nothing survives filtering.
pub async fn select_images<P: PageDom + ?Sized>(
    page: &P,
    mode: SelectionMode,
) -> Result<Vec<ImageRef>, ScrapeError> {
    let elements = match mode {
        SelectionMode::Union => union_of_selectors(page).await,
        SelectionMode::FirstMatch => first_productive_selector(page).await,
    };

    let images: Vec<ImageRef> = elements
        .into_iter()
        .filter_map(|el| el.src)
        .filter(|src| !is_blocked(src))
        .enumerate()
        .map(|(i, url)| ImageRef { url, ordinal: i + 1 })
        .collect();

    log::info!("Final image count after filtering: {}", images.len());
    if images.is_empty() {
        return Err(ScrapeError::NoImages);
    }
    Ok(images)
}

/// Convenience wrapper returning only the URLs
pub async fn select_image_urls<P: PageDom + ?Sized>(
    page: &P,
    mode: SelectionMode,
) -> Result<Vec<String>, ScrapeError> {
    Ok(select_images(page, mode)
        .await?
        .into_iter()
        .map(|img| img.url)
        .collect())
}
