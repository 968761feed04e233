//! Chapter discovery on a series listing page.
//!
//! Runs in two phases: [`expand_listing`] clicks "show more" style controls
//! so the full list is rendered, then [`enumerate_chapters`] harvests chapter
//! links, derives a number for each and returns them sorted ascending.

use crate::error::ScrapeError;
use crate::helpers::title_from_slug;
use crate::models::{Chapter, NumberSource};
use crate::page::{PageDom, PageElement};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::time::Duration;

/// Clickable elements that may expand a chapter list
pub const EXPAND_SELECTORS: &[&str] = &[
    "button:not([disabled])",
    "a.button",
    "a.btn",
    "div.button",
    "div.btn",
    "span.button",
    "span.btn",
    ".load-more",
    ".show-more",
    ".view-more",
];

pub const EXPAND_PHRASES: &[&str] = &["show all", "load more", "show all chapters", "view more"];

/// Harvest strategies, most specific first
const SITE_LINK_SELECTOR: &str = "div[x-data] > a";
const CHAPTER_HREF_SELECTOR: &str = r#"a[href*="chapter"]"#;
const LOOSE_HREF_PARTS: &[&str] = &["chapters/", "chapter/", "read/"];

const NUMBER_QUERY_PARAMS: &[&str] = &["chapter", "ch", "c", "num", "n"];

static URL_NUMBER_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)chapter[_-](\d+(?:\.\d+)?)",
        r"(?i)\bch[_-](\d+(?:\.\d+)?)",
        r"(?i)/chapter/(\d+(?:\.\d+)?)(?:/|$)",
        r"(?i)/ch/(\d+(?:\.\d+)?)(?:/|$)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static TEXT_NUMBER_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bchapter\s*(\d+(?:\.\d+)?)",
        r"(?i)\bch\.\s*(\d+(?:\.\d+)?)",
        r"(?i)\bch\s+(\d+(?:\.\d+)?)",
        r"(?i)\bepisode\s*(\d+(?:\.\d+)?)",
        r"(?i)\bep\.\s*(\d+(?:\.\d+)?)",
        r"(?i)\bep\s+(\d+(?:\.\d+)?)",
        r"^(\d+(?:\.\d+)?)$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static NUMERIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+(?:\.\d+)?$").unwrap());
static SVG_STYLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.st\d+\s*\{\s*fill:[^}]+\}").unwrap());
static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\s+\d{1,2},\s+\d{4}\b")
        .unwrap()
});
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static NAMED_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)chapter\s+(\d+(?:\.\d+)?)").unwrap());
static SHORT_NAMED_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)ch\.\s*\d+").unwrap());

/// Settle intervals used while expanding a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionTimings {
    /// After the first matching click
    pub click_settle: Duration,
    /// After each additional click
    pub extra_settle: Duration,
    /// Once, at the end of the pass
    pub final_settle: Duration,
}

impl Default for ExpansionTimings {
    fn default() -> Self {
        Self {
            click_settle: Duration::from_millis(2000),
            extra_settle: Duration::from_millis(1500),
            final_settle: Duration::from_millis(1000),
        }
    }
}

fn is_expander(el: &PageElement) -> bool {
    let text = el.text.to_lowercase();
    EXPAND_PHRASES.iter().any(|phrase| text.contains(phrase))
}

async fn click_logged<P: PageDom + ?Sized>(page: &P, el: &PageElement) {
    if let Err(e) = page.click(el).await {
        log::warn!("Could not click \"{}\": {}", el.text.trim(), e);
    }
}

/// Click the first "show more" control, then any other matching control
/// still present, waiting out a settle interval after each.
///
/// A single best-effort pass; returns the number of clicks issued.
pub async fn expand_listing<P: PageDom + ?Sized>(page: &P, timings: &ExpansionTimings) -> usize {
    for selector in EXPAND_SELECTORS {
        let elements = match page.query(selector).await {
            Ok(found) => found,
            Err(e) => {
                log::debug!("Expansion selector {} failed: {}", selector, e);
                continue;
            }
        };

        let Some(first) = elements.into_iter().find(is_expander) else {
            continue;
        };

        log::info!("Found \"show more\" control, clicking it: {}", first.text.trim());
        click_logged(page, &first).await;
        let mut clicks = 1;
        tokio::time::sleep(timings.click_settle).await;

        let remaining = page.query(selector).await.unwrap_or_default();
        for extra in remaining.iter().filter(|el| el.id != first.id && is_expander(el)) {
            log::info!("Found additional control, clicking it: {}", extra.text.trim());
            click_logged(page, extra).await;
            clicks += 1;
            tokio::time::sleep(timings.extra_settle).await;
        }

        tokio::time::sleep(timings.final_settle).await;
        return clicks;
    }

    log::info!("No \"show more\" controls found, all chapters should be visible");
    0
}

fn looks_like_chapter_url(url: &str) -> bool {
    url.contains("chapter") || LOOSE_HREF_PARTS.iter().any(|p| url.contains(p))
}

fn linked(elements: Vec<PageElement>) -> Vec<(String, String)> {
    elements
        .into_iter()
        .filter_map(|el| el.href.map(|href| (href, el.text)))
        .collect()
}

/// Chapter links as `(url, text)`, deduplicated by URL in discovery order.
///
/// Strategies are tried in order and the first one yielding any link wins.
pub async fn harvest_links<P: PageDom + ?Sized>(page: &P) -> Vec<(String, String)> {
    let mut links = linked(page.query(SITE_LINK_SELECTOR).await.unwrap_or_default());

    if links.is_empty() {
        log::info!("No chapters found with site selector, trying generic selectors");
        links = linked(page.query(CHAPTER_HREF_SELECTOR).await.unwrap_or_default());
    }

    if links.is_empty() {
        log::info!("No chapters found with chapter keyword, trying all links");
        links = linked(page.query("a").await.unwrap_or_default())
            .into_iter()
            .filter(|(href, _)| LOOSE_HREF_PARTS.iter().any(|p| href.contains(p)))
            .collect();
    }

    log::info!("Found {} potential chapter links", links.len());

    let mut order = Vec::new();
    let mut text_by_url: HashMap<String, String> = HashMap::new();
    for (url, text) in links.into_iter().filter(|(url, _)| looks_like_chapter_url(url)) {
        match text_by_url.get_mut(&url) {
            Some(existing) => {
                if existing.trim().is_empty() {
                    *existing = text;
                }
            }
            None => {
                order.push(url.clone());
                text_by_url.insert(url, text);
            }
        }
    }

    log::info!("Found {} unique chapter URLs", order.len());
    order
        .into_iter()
        .map(|url| {
            let text = text_by_url.remove(&url).unwrap_or_default();
            (url, text)
        })
        .collect()
}

fn first_capture(patterns: &[Regex], haystack: &str) -> Option<f64> {
    patterns
        .iter()
        .find_map(|re| re.captures(haystack))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Chapter number encoded in a URL.
///
/// Tries `chapter-N`/`ch-N` style fragments, then the last purely numeric
/// path segment, then common query parameters. Opaque IDs such as
/// `/chapters/01J76XYS...` yield nothing.
pub fn extract_number_from_url(url: &str) -> Option<f64> {
    let parsed = Url::parse(url).ok();
    let path = parsed
        .as_ref()
        .map(|u| u.path().to_string())
        .unwrap_or_else(|| url.to_string());

    if let Some(n) = first_capture(&URL_NUMBER_RES, &path) {
        return Some(n);
    }

    if let Some(n) = path
        .split('/')
        .rev()
        .filter(|part| !part.is_empty())
        .find(|part| NUMERIC_RE.is_match(part))
        .and_then(|part| part.parse::<f64>().ok())
    {
        return Some(n);
    }

    let parsed = parsed?;
    let params: HashMap<_, _> = parsed.query_pairs().collect();
    NUMBER_QUERY_PARAMS
        .iter()
        .filter_map(|name| params.get(*name))
        .find(|value| NUMERIC_RE.is_match(value))
        .and_then(|value| value.parse::<f64>().ok())
}

/// Chapter number in link text: "Chapter 10.5", "Ch. 3", "Episode 7", "42"
pub fn extract_number_from_text(text: &str) -> Option<f64> {
    first_capture(&TEXT_NUMBER_RES, text.trim())
}

/// Estimated number for a link at `index` in a listing of `total` links.
///
/// Assumes the listing is newest-first.
pub fn fallback_chapter_number(total: usize, index: usize) -> f64 {
    total.saturating_sub(index) as f64
}

/// Strip inline SVG styles, publication dates and the "Last Read" marker
pub fn clean_chapter_name(raw: &str) -> String {
    let name = SVG_STYLE_RE.replace_all(raw, "");
    let name = DATE_RE.replace_all(&name, "");
    let name = name.replace("Last Read", "");
    WHITESPACE_RE.replace_all(&name, " ").trim().to_string()
}

/// Display name for a chapter, prefixed with its number when the cleaned
/// link text does not already carry one.
pub fn display_name(raw_text: &str, number: f64) -> String {
    let cleaned = clean_chapter_name(raw_text);
    if cleaned.chars().count() < 2 {
        return format!("Chapter {}", number);
    }
    if NAMED_NUMBER_RE.is_match(&cleaned) || SHORT_NAMED_NUMBER_RE.is_match(&cleaned) {
        cleaned
    } else {
        format!("Chapter {} - {}", number, cleaned)
    }
}

/// Give every chapter without a usable number one from its name, or 0
pub fn validate_numbers(chapters: &mut [Chapter]) {
    for chapter in chapters.iter_mut() {
        if chapter.number.is_some_and(|n| !n.is_nan()) {
            continue;
        }
        log::warn!(
            "Chapter has invalid number: {}, URL: {}",
            chapter.name,
            chapter.url
        );
        match NAMED_NUMBER_RE
            .captures(&chapter.name)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
        {
            Some(n) => {
                chapter.number = Some(n);
                chapter.number_source = NumberSource::Name;
            }
            None => {
                chapter.number = Some(0.0);
                chapter.number_source = NumberSource::Unknown;
            }
        }
    }
}

/// Sort ascending by number; missing numbers sort as 0
pub fn sort_chapters(chapters: &mut [Chapter]) {
    chapters.sort_by(|a, b| a.sort_number().total_cmp(&b.sort_number()));
}

/// Harvest, number, validate and sort the chapters of an (expanded) page
pub async fn enumerate_chapters<P: PageDom + ?Sized>(page: &P) -> Vec<Chapter> {
    let links = harvest_links(page).await;
    let total = links.len();

    let mut chapters: Vec<Chapter> = links
        .into_iter()
        .enumerate()
        .map(|(index, (url, text))| {
            let cleaned = clean_chapter_name(&text);
            let (number, source) = match extract_number_from_url(&url) {
                Some(n) => (n, NumberSource::Url),
                None => match extract_number_from_text(&cleaned) {
                    Some(n) => (n, NumberSource::Text),
                    None => (fallback_chapter_number(total, index), NumberSource::Fallback),
                },
            };
            let name = display_name(&text, number);
            log::debug!("Processed chapter: {} ({}) - {}", name, number, url);
            Chapter {
                url,
                name,
                number: Some(number),
                number_source: source,
            }
        })
        .collect();

    validate_numbers(&mut chapters);
    sort_chapters(&mut chapters);
    chapters
}

/// Expand the listing, then enumerate its chapters
pub async fn scrape_chapter_list<P: PageDom + ?Sized>(
    page: &P,
    timings: &ExpansionTimings,
) -> Vec<Chapter> {
    let clicks = expand_listing(page, timings).await;
    log::debug!("Listing expansion issued {} clicks", clicks);
    enumerate_chapters(page).await
}

/// User chapter filter: empty, a single number, or `start-end`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChapterRange {
    All,
    Single(f64),
    Between(f64, f64),
}

impl FromStr for ChapterRange {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() {
            return Ok(ChapterRange::All);
        }

        let parse = |v: &str| {
            v.trim()
                .parse::<f64>()
                .map_err(|_| ScrapeError::InvalidRange(input.to_string()))
        };

        match input.split_once('-') {
            Some((start, end)) => Ok(ChapterRange::Between(parse(start)?, parse(end)?)),
            None => Ok(ChapterRange::Single(parse(input)?)),
        }
    }
}

impl ChapterRange {
    pub fn contains(&self, chapter: &Chapter) -> bool {
        let n = chapter.sort_number();
        match *self {
            ChapterRange::All => true,
            ChapterRange::Single(target) => n == target,
            ChapterRange::Between(start, end) => n >= start && n <= end,
        }
    }

    /// Matching chapters, deduplicated by URL, order preserved
    pub fn apply(&self, chapters: &[Chapter]) -> Vec<Chapter> {
        let mut seen = HashSet::new();
        chapters
            .iter()
            .filter(|c| self.contains(c))
            .filter(|c| seen.insert(c.url.clone()))
            .cloned()
            .collect()
    }
}

/// Filter chapters by a free-text range such as `""`, `"7"` or `"5-10"`
pub fn parse_chapter_range(input: &str, chapters: &[Chapter]) -> Result<Vec<Chapter>, ScrapeError> {
    Ok(input.parse::<ChapterRange>()?.apply(chapters))
}

const TITLE_SELECTORS: &[&str] = &["h1.text-2xl", "h1", ".manga-title", ".series-title"];

/// Series title from a listing page, falling back to the URL slug
pub async fn series_title<P: PageDom + ?Sized>(page: &P) -> String {
    for selector in TITLE_SELECTORS {
        if let Some(title) = page
            .query(selector)
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|el| el.text.trim().to_string())
            .find(|t| !t.is_empty())
        {
            return title;
        }
    }

    let path = Url::parse(page.url())
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| page.url().to_string());
    path.rsplit('/')
        .find(|s| !s.is_empty())
        .map(title_from_slug)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Unknown Manga".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::StaticPage;

    fn chapter(url: &str, number: f64) -> Chapter {
        Chapter {
            url: url.to_string(),
            name: format!("Chapter {}", number),
            number: Some(number),
            number_source: NumberSource::Url,
        }
    }

    #[test]
    fn test_number_from_url() {
        assert_eq!(extract_number_from_url("https://s.com/manga/x/chapter-12"), Some(12.0));
        assert_eq!(extract_number_from_url("https://s.com/read/ch_7.5"), Some(7.5));
        assert_eq!(extract_number_from_url("https://s.com/series/x/104"), Some(104.0));
        assert_eq!(extract_number_from_url("https://s.com/read?c=9"), Some(9.0));
        assert_eq!(
            extract_number_from_url("https://s.com/chapters/01J76XYSNJDQCG2T1AW43Z34Y1"),
            None
        );
    }

    #[test]
    fn test_number_from_text() {
        assert_eq!(extract_number_from_text("Chapter 10.5"), Some(10.5));
        assert_eq!(extract_number_from_text("Ch. 3 - The Return"), Some(3.0));
        assert_eq!(extract_number_from_text("Episode 7"), Some(7.0));
        assert_eq!(extract_number_from_text(" 42 "), Some(42.0));
        assert_eq!(extract_number_from_text("Prologue"), None);
    }

    #[test]
    fn test_fallback_assumes_newest_first() {
        assert_eq!(fallback_chapter_number(5, 0), 5.0);
        assert_eq!(fallback_chapter_number(5, 4), 1.0);
    }

    #[test]
    fn test_clean_and_display_name() {
        let raw = ".st0 { fill: #fff }  Chapter 12   Sep 7, 2024 Last Read";
        assert_eq!(clean_chapter_name(raw), "Chapter 12");
        assert_eq!(display_name("The Beginning", 1.0), "Chapter 1 - The Beginning");
        assert_eq!(display_name("Ch. 4", 4.0), "Ch. 4");
        assert_eq!(display_name("", 2.5), "Chapter 2.5");
    }

    #[tokio::test]
    async fn test_enumerate_static_listing() {
        let html = r#"<body>
            <div x-data="{}">
              <a href="/chapters/01J7C">Chapter 3 Sep 7, 2024</a>
              <a href="/chapters/01J7B">Chapter 2</a>
              <a href="/chapters/01J7B">Chapter 2</a>
              <a href="/chapters/01J7A">Bonus</a>
            </div>
            <a href="/about">About</a>
        </body>"#;
        let page = StaticPage::new(html, "https://site.com/series/abc/some-title");
        let chapters = enumerate_chapters(&page).await;

        assert_eq!(chapters.len(), 3);
        // Bonus has no number anywhere: fallback 3 - 2 = 1
        assert_eq!(chapters[0].name, "Chapter 1 - Bonus");
        assert_eq!(chapters[0].number_source, NumberSource::Fallback);
        assert_eq!(chapters[1].number, Some(2.0));
        assert_eq!(chapters[2].name, "Chapter 3");
        assert_eq!(chapters[2].url, "https://site.com/chapters/01J7C");
        assert!(chapters.windows(2).all(|w| w[0].sort_number() <= w[1].sort_number()));
    }

    #[tokio::test]
    async fn test_harvest_falls_back_to_loose_links() {
        let html = r#"<body><a href="/read/5">Five</a><a href="/home">Home</a></body>"#;
        let page = StaticPage::new(html, "https://site.com/");
        let links = harvest_links(&page).await;
        assert_eq!(links, vec![("https://site.com/read/5".to_string(), "Five".to_string())]);
    }

    #[test]
    fn test_validate_numbers_reads_name() {
        let mut chapters = vec![
            Chapter {
                url: "a".into(),
                name: "Chapter 8 - End".into(),
                number: None,
                number_source: NumberSource::Unknown,
            },
            Chapter {
                url: "b".into(),
                name: "Extra".into(),
                number: Some(f64::NAN),
                number_source: NumberSource::Unknown,
            },
        ];
        validate_numbers(&mut chapters);
        assert_eq!(chapters[0].number, Some(8.0));
        assert_eq!(chapters[0].number_source, NumberSource::Name);
        assert_eq!(chapters[1].number, Some(0.0));
    }

    #[test]
    fn test_range_filter() {
        let chapters: Vec<Chapter> = (1..=12)
            .map(|n| chapter(&format!("https://s.com/chapter-{}", n), n as f64))
            .collect();

        let picked = parse_chapter_range("5-10", &chapters).unwrap();
        assert_eq!(picked.len(), 6);
        assert!(picked.iter().all(|c| (5.0..=10.0).contains(&c.sort_number())));

        let single = parse_chapter_range("7", &chapters).unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].number, Some(7.0));

        assert_eq!(parse_chapter_range("", &chapters).unwrap(), chapters);
        assert_eq!(parse_chapter_range("   ", &chapters).unwrap(), chapters);
    }

    #[test]
    fn test_range_filter_dedupes_and_rejects_garbage() {
        let chapters = vec![chapter("https://s.com/1", 1.0), chapter("https://s.com/1", 1.0)];
        assert_eq!(parse_chapter_range("1", &chapters).unwrap().len(), 1);
        assert!(matches!(
            parse_chapter_range("a-b", &chapters),
            Err(ScrapeError::InvalidRange(_))
        ));
    }

    #[tokio::test]
    async fn test_series_title() {
        let page = StaticPage::new(
            r#"<h1 class="text-2xl"> Solo Leveling </h1>"#,
            "https://s.com/series/x/solo-leveling",
        );
        assert_eq!(series_title(&page).await, "Solo Leveling");

        let page = StaticPage::new("<p></p>", "https://s.com/series/x/tower-of-god");
        assert_eq!(series_title(&page).await, "Tower Of God");

        let page = StaticPage::new("<p></p>", "https://s.com/");
        assert_eq!(series_title(&page).await, "Unknown Manga");
    }
}
