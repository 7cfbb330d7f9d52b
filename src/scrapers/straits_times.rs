//! The Straits Times article extractor.
//!
//! # Fields
//!
//! - **Title**: `<article> h1`, falling back to `<title>`
//! - **Date**: first of `<time datetime>`, `<time>` text, a "Published …"
//!   span, or the `article:published_time` meta tag
//! - **Body**: all visible text inside `<article>`
//! - **Images**: the `<img>` inside each `<picture>` (`src`, `data-src` or
//!   `data-original`), with the alt text of the picture's first image

use super::Extractor;
use super::common::{
    self, ImageFilter, alt_text, block_text, img_src, inline_text, parse_date_loose, resolve,
};
use crate::error::ExtractError;
use crate::models::{ArticleRecord, ImageRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument, warn};

static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time").unwrap());
static SPAN: Lazy<Selector> = Lazy::new(|| Selector::parse("span").unwrap());
static PUBLISHED_META: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="article:published_time"]"#).unwrap());
static PICTURE: Lazy<Selector> = Lazy::new(|| Selector::parse("picture").unwrap());
static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());

static PUBLISHED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bpublished\b").unwrap());
static PUBLISHED_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i:published)[:·\s]*").unwrap());

pub struct StraitsTimes {
    images: ImageFilter,
}

impl StraitsTimes {
    pub fn new(images: ImageFilter) -> Self {
        Self { images }
    }

    /// Title, date and body, shared with the sites that reuse this layout.
    pub fn text_fields(
        document: &Html,
        article: ElementRef<'_>,
        url: &str,
    ) -> ArticleRecord {
        let body_text = block_text(article);
        if body_text.is_empty() {
            warn!(%url, "No text content extracted from article");
        }
        ArticleRecord {
            title: Some(common::title(document, article)),
            publish_date: publish_date(document, article),
            body_text,
            ..ArticleRecord::new(url)
        }
    }
}

impl Extractor for StraitsTimes {
    fn name(&self) -> &'static str {
        "straits_times"
    }

    #[instrument(level = "debug", skip_all, fields(%url))]
    fn extract(&self, document: &Html, url: &str) -> Result<ArticleRecord, ExtractError> {
        let article = common::article(document)?;
        let mut record = Self::text_fields(document, article, url);
        record.images = self.images.apply(picture_images(article, url));
        debug!(images = record.images.len(), "Extracted article");
        Ok(record)
    }
}

fn publish_date(document: &Html, article: ElementRef<'_>) -> Option<String> {
    let from_time = article.select(&TIME).next().and_then(|t| {
        t.value()
            .attr("datetime")
            .and_then(parse_date_loose)
            .or_else(|| parse_date_loose(&inline_text(t)))
    });

    from_time
        .or_else(|| {
            article
                .select(&SPAN)
                .map(inline_text)
                .find(|text| PUBLISHED.is_match(text))
                .and_then(|text| parse_date_loose(&PUBLISHED_PREFIX.replace(&text, "")))
        })
        .or_else(|| {
            document
                .select(&PUBLISHED_META)
                .next()
                .and_then(|m| m.value().attr("content"))
                .and_then(parse_date_loose)
        })
}

fn picture_images(article: ElementRef<'_>, url: &str) -> Vec<ImageRecord> {
    let mut images = Vec::new();
    for picture in article.select(&PICTURE) {
        let alt = picture.select(&IMG).next().and_then(alt_text);
        for img in picture.select(&IMG) {
            if let Some(src) = img_src(img).and_then(|s| resolve(url, s)) {
                images.push(ImageRecord {
                    image_url: src,
                    alt_text: alt.clone(),
                    caption: None,
                });
            }
        }
    }
    images
}
