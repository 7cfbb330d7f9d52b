//! Helpers shared by the site extractors: text cleanup, loose date parsing,
//! image URL resolution and filtering.

use crate::error::ExtractError;
use crate::models::ImageRecord;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

pub static ARTICLE: Lazy<Selector> = Lazy::new(|| Selector::parse("article").unwrap());
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Elements whose text is never article content.
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%b %d, %Y, %I:%M %p",
    "%b %d, %Y %I:%M %p",
    "%B %d, %Y, %I:%M %p",
    "%d %b %Y - %I:%M %p",
    "%d %b %Y, %I:%M %p",
    "%d %B %Y, %I:%M %p",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y%m%d",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d/%m/%Y",
];

pub fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|_| ExtractError::Selector(css.to_string()))
}

/// The main `<article>` container or a [`ExtractError::MissingElement`].
pub fn article(document: &Html) -> Result<ElementRef<'_>, ExtractError> {
    document
        .select(&ARTICLE)
        .next()
        .ok_or_else(|| ExtractError::MissingElement("article".into()))
}

/// Headline from the article `<h1>`, else the document `<title>`, else `(untitled)`.
pub fn title(document: &Html, article: ElementRef<'_>) -> String {
    article
        .select(&H1)
        .next()
        .or_else(|| document.select(&TITLE).next())
        .map(|el| inline_text(el))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "(untitled)".to_string())
}

/// Text of an element on one line, whitespace collapsed.
pub fn inline_text(el: ElementRef<'_>) -> String {
    let joined = el.text().collect::<Vec<_>>().join(" ");
    WHITESPACE.replace_all(joined.trim(), " ").into_owned()
}

/// Visible text of a container: each non-empty text node trimmed, joined by
/// blank lines, with script/style content left out.
pub fn block_text(el: ElementRef<'_>) -> String {
    el.descendants()
        .filter_map(|node| match node.value() {
            Node::Text(text) => {
                let skipped = node.ancestors().any(|a| {
                    a.value()
                        .as_element()
                        .is_some_and(|e| SKIPPED_TAGS.contains(&e.name()))
                });
                let trimmed = text.trim();
                (!skipped && !trimmed.is_empty()).then(|| trimmed.to_string())
            }
            _ => None,
        })
        .join("\n\n")
}

/// Parse a date in any of the shapes news sites print and return ISO-8601.
///
/// Timestamps with offsets keep them; naive timestamps render without one;
/// bare dates render as `YYYY-MM-DD`.
pub fn parse_date_loose(raw: &str) -> Option<String> {
    let cleaned = WHITESPACE.replace_all(raw.trim(), " ");
    let s = cleaned.as_ref();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.to_rfc3339());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.to_rfc3339());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.format("%Y-%m-%dT%H:%M:%S").to_string());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d.format("%Y-%m-%d").to_string());
        }
    }
    None
}

/// Keep only the date part of an ISO string produced by [`parse_date_loose`].
pub fn date_only(iso: &str) -> String {
    iso.chars().take(10).collect()
}

/// Resolve `src` against the page URL. Data URIs and blanks resolve to `None`.
pub fn resolve(page_url: &str, src: &str) -> Option<String> {
    let src = src.trim();
    if src.is_empty() || is_data_uri(src) {
        return None;
    }
    match Url::parse(page_url) {
        Ok(base) => base.join(src).ok().map(|u| u.to_string()),
        Err(_) => Url::parse(src).ok().map(|u| u.to_string()),
    }
}

pub fn is_data_uri(u: &str) -> bool {
    u.trim().to_ascii_lowercase().starts_with("data:")
}

/// First non-empty of `src`, `data-src`, `data-original`.
pub fn img_src<'a>(img: ElementRef<'a>) -> Option<&'a str> {
    ["src", "data-src", "data-original"]
        .into_iter()
        .filter_map(|attr| img.value().attr(attr))
        .find(|v| !v.trim().is_empty())
}

/// Non-empty `alt` text.
pub fn alt_text(img: ElementRef<'_>) -> Option<String> {
    img.value()
        .attr("alt")
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
}

/// Split a `srcset` into `(url, width)` candidates; missing widths count as 0.
pub fn srcset_candidates(srcset: &str) -> Vec<(String, u32)> {
    srcset
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.split_whitespace();
            let url = pieces.next()?;
            let width = pieces
                .next()
                .and_then(|w| w.strip_suffix('w'))
                .and_then(|w| w.parse().ok())
                .unwrap_or(0);
            Some((url.to_string(), width))
        })
        .collect()
}

/// Drops image URLs matching any configured pattern.
#[derive(Debug, Clone, Default)]
pub struct ImageFilter {
    patterns: Vec<Regex>,
}

impl ImageFilter {
    pub fn new(patterns: &[String]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn excludes(&self, url: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(url))
    }

    /// Remove excluded URLs and repeats, keeping first-seen order.
    pub fn apply(&self, images: Vec<ImageRecord>) -> Vec<ImageRecord> {
        images
            .into_iter()
            .filter(|img| !self.excludes(&img.image_url))
            .unique_by(|img| img.image_url.clone())
            .collect()
    }
}
