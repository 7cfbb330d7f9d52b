//! Tamil Murasu extractor.
//!
//! Same image rules as The New Paper. The publication date is read from the
//! `storyYYYYMMDD` token in the URL when present, else from the on-page
//! `<p data-testid="date">` line; only the date part is kept.

use super::Extractor;
use super::common::{self, ImageFilter, date_only, inline_text, parse_date_loose};
use super::straits_times::StraitsTimes;
use super::the_new_paper::TheNewPaper;
use crate::error::ExtractError;
use crate::models::ArticleRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

static STORY_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"story(\d{8})").unwrap());
static DATE_LINE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"p[data-testid="date"]"#).unwrap());
// "01 Jul 2025 - 8:39 pm" -> "01 Jul 2025"
static LEADING_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d{1,2}\s+\w+\s+\d{4})").unwrap());

pub struct TamilMurasu {
    inner: TheNewPaper,
}

impl TamilMurasu {
    pub fn new(images: ImageFilter) -> Self {
        Self {
            inner: TheNewPaper::new(images),
        }
    }
}

impl Extractor for TamilMurasu {
    fn name(&self) -> &'static str {
        "tamil_murasu"
    }

    fn fetch_attempts(&self) -> usize {
        3
    }

    fn extract(&self, document: &Html, url: &str) -> Result<ArticleRecord, ExtractError> {
        let article = common::article(document)?;
        let mut record = StraitsTimes::text_fields(document, article, url);
        record.publish_date = date_from_url(url).or_else(|| date_from_page(document));
        record.images = self.inner.images(article, url);
        Ok(record)
    }
}

fn date_from_url(url: &str) -> Option<String> {
    let caps = STORY_DATE.captures(url)?;
    parse_date_loose(&caps[1]).map(|d| date_only(&d))
}

fn date_from_page(document: &Html) -> Option<String> {
    let raw = inline_text(document.select(&DATE_LINE).next()?);
    parse_date_loose(&raw)
        .or_else(|| {
            LEADING_DATE
                .captures(&raw)
                .and_then(|c| parse_date_loose(&c[1]))
        })
        .map(|d| date_only(&d))
}
