//! Tabla! extractor.
//!
//! Text fields follow The Straits Times layout, except that the date is
//! printed in the `<p>` of the article's `button.dropdown-button`. Images
//! only come from the numbered carousels (`div.article-carousel-wrapper-N`);
//! each carousel's `div.text-grey-200` is the caption for all its images.

use super::Extractor;
use super::common::{
    self, ImageFilter, alt_text, img_src, inline_text, parse_date_loose, resolve,
    srcset_candidates,
};
use super::straits_times::StraitsTimes;
use crate::error::ExtractError;
use crate::models::{ArticleRecord, ImageRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};

static DATE_BUTTON_TEXT: Lazy<Selector> =
    Lazy::new(|| Selector::parse("button.dropdown-button p").unwrap());
static CAROUSEL_CANDIDATE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"div[class*="article-carousel-wrapper-"]"#).unwrap());
static CAROUSEL_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^article-carousel-wrapper-\d+$").unwrap());
static CAPTION: Lazy<Selector> = Lazy::new(|| Selector::parse("div.text-grey-200").unwrap());
static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());

pub struct Tabla {
    images: ImageFilter,
}

impl Tabla {
    pub fn new(images: ImageFilter) -> Self {
        Self { images }
    }

    fn images(&self, article: ElementRef<'_>, url: &str) -> Vec<ImageRecord> {
        let mut images = Vec::new();
        for carousel in article.select(&CAROUSEL_CANDIDATE).filter(is_carousel) {
            let caption = carousel
                .select(&CAPTION)
                .next()
                .map(inline_text)
                .filter(|c| !c.is_empty());
            for img in carousel.select(&IMG) {
                let Some(src) = carousel_src(img).and_then(|s| resolve(url, &s)) else {
                    continue;
                };
                images.push(ImageRecord {
                    image_url: src,
                    alt_text: alt_text(img),
                    caption: caption.clone(),
                });
            }
        }
        self.images.apply(images)
    }
}

impl Extractor for Tabla {
    fn name(&self) -> &'static str {
        "tabla"
    }

    #[instrument(level = "debug", skip_all, fields(%url))]
    fn extract(&self, document: &Html, url: &str) -> Result<ArticleRecord, ExtractError> {
        let article = common::article(document)?;
        let mut record = StraitsTimes::text_fields(document, article, url);
        if let Some(date) = article
            .select(&DATE_BUTTON_TEXT)
            .map(inline_text)
            .find(|t| !t.is_empty())
            .and_then(|raw| parse_date_loose(&raw))
        {
            record.publish_date = Some(date);
        }
        record.images = self.images(article, url);
        debug!(images = record.images.len(), "Extracted article");
        Ok(record)
    }
}

fn is_carousel(div: &ElementRef<'_>) -> bool {
    div.value().classes().any(|c| CAROUSEL_CLASS.is_match(c))
}

/// Widest `srcset` candidate (first one when none has a width), else
/// `src` / `data-src`.
fn carousel_src(img: ElementRef<'_>) -> Option<String> {
    match img.value().attr("srcset") {
        Some(srcset) => srcset_candidates(srcset)
            .into_iter()
            .rev()
            .max_by_key(|(_, w)| *w)
            .map(|(u, _)| u),
        None => img_src(img).map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://www.tabla.com.sg/singapore/festival";

    #[test]
    fn test_extracts_date_and_carousel_images() {
        let doc = Html::parse_document(
            r#"<article>
                 <h1>Deepavali lights</h1>
                 <button class="dropdown-button flex leading-7"><p>Oct 28, 2024</p></button>
                 <div class="article-carousel-wrapper-0">
                   <img srcset="/s.jpg 320w, /l.jpg 1280w, /m.jpg 640w" src="/fallback.jpg" alt="Lights">
                   <img data-src="/lazy.jpg">
                   <div class="text-grey-200"> Serangoon Road at night </div>
                 </div>
                 <div class="article-carousel-wrapper-extra"><img src="/skip.jpg"></div>
                 <img src="/inline-not-carousel.jpg">
                 <p>Crowds gathered.</p>
               </article>"#,
        );
        let rec = Tabla::new(ImageFilter::default()).extract(&doc, URL).unwrap();

        assert_eq!(rec.title.as_deref(), Some("Deepavali lights"));
        assert_eq!(rec.publish_date.as_deref(), Some("2024-10-28"));
        let urls: Vec<_> = rec.images.iter().map(|i| i.image_url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://www.tabla.com.sg/l.jpg", "https://www.tabla.com.sg/lazy.jpg"]
        );
        assert_eq!(rec.images[0].alt_text.as_deref(), Some("Lights"));
        assert!(
            rec.images
                .iter()
                .all(|i| i.caption.as_deref() == Some("Serangoon Road at night"))
        );
    }

    #[test]
    fn test_srcset_without_widths_takes_first() {
        let doc = Html::parse_document(
            r#"<article><h1>T</h1>
                 <div class="mt-4 article-carousel-wrapper-12"><img srcset="/a.jpg, /b.jpg"></div>
               </article>"#,
        );
        let rec = Tabla::new(ImageFilter::default()).extract(&doc, URL).unwrap();
        assert_eq!(rec.images.len(), 1);
        assert_eq!(rec.images[0].image_url, "https://www.tabla.com.sg/a.jpg");
        assert_eq!(rec.images[0].caption, None);
    }

    #[test]
    fn test_missing_date_button_keeps_page_date() {
        let doc = Html::parse_document(
            r#"<article><h1>T</h1><time datetime="2024-01-02T10:00:00+08:00">x</time></article>"#,
        );
        let rec = Tabla::new(ImageFilter::default()).extract(&doc, URL).unwrap();
        assert_eq!(rec.publish_date.as_deref(), Some("2024-01-02T10:00:00+08:00"));
    }
}
