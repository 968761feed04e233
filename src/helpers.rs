//! Helper functions shared by the download pipeline
//!
//! This module provides small utilities used throughout the crate:
//! - Filename sanitising for archive folders
//! - URL deduplication and archive path assignment
//! - Origin extraction for Referer spoofing
//! - Folder naming for a single chapter page
//!
//! # Examples
//!
//! ```
//! use manga_zip_downloader::helpers::{archive_path, sanitize_filename};
//!
//! assert_eq!(archive_path("X", 1), "X/001.jpg");
//! assert_eq!(sanitize_filename("a/b:c"), "a_b_c");
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use std::collections::HashSet;

static TITLE_CHAPTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Chapter\s+(\d+)|Ch\.\s*(\d+)|Ch\s+(\d+)").unwrap());

/// Replace characters that are not allowed in file names
pub fn sanitize_filename(s: &str) -> String {
    s.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_")
}

/// `{folder}/{index:03}.jpg` for a 1-based index
pub fn archive_path(folder: &str, index: usize) -> String {
    format!("{}/{:03}.jpg", folder, index)
}

/// First-seen-wins unique list, empty URLs dropped
pub fn dedupe_urls<S: AsRef<str>>(urls: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.iter()
        .map(|u| u.as_ref())
        .filter(|u| !u.is_empty())
        .filter(|u| seen.insert(u.to_string()))
        .map(|u| u.to_string())
        .collect()
}

/// `scheme://host[:port]` of a URL, if it parses
pub fn url_origin(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}

/// Resolve a possibly relative reference against a base URL
pub fn resolve_url(base: &str, reference: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }
    if let Ok(abs) = Url::parse(reference) {
        return Some(abs.to_string());
    }
    Url::parse(base)
        .ok()?
        .join(reference)
        .ok()
        .map(|u| u.to_string())
}

/// "solo-leveling-ragnarok" -> "Solo Leveling Ragnarok"
pub fn title_from_slug(slug: &str) -> String {
    slug.split('-')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Folder name for the chapter currently open in a page.
///
/// The manga name is the document title before the first `|`; the chapter
/// label comes from the title, or the first 8 characters of the last path
/// segment when the title carries no chapter number.
pub fn chapter_folder_name(document_title: &str, page_url: &str) -> String {
    let manga = document_title
        .split('|')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("Manga");

    let chapter = TITLE_CHAPTER_RE
        .captures(document_title)
        .and_then(|c| c.get(1).or_else(|| c.get(2)).or_else(|| c.get(3)))
        .map(|m| m.as_str().to_string())
        .or_else(|| {
            let path = Url::parse(page_url)
                .map(|u| u.path().to_string())
                .unwrap_or_else(|_| page_url.to_string());
            path.rsplit('/')
                .next()
                .filter(|s| !s.is_empty())
                .map(|s| s.chars().take(8).collect())
        })
        .unwrap_or_else(|| "unknown".to_string());

    sanitize_filename(&format!("{}_ch{}", manga, chapter))
}
