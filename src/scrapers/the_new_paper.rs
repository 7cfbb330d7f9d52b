//! The New Paper extractor.
//!
//! Pages here render slowly, so three fetch attempts are allowed. Every
//! `<img>` in the article is considered; when it carries a `srcset` the
//! widest acceptable candidate is used. Placeholders, reaction images and
//! outbrain widgets are never recorded.

use super::Extractor;
use super::common::{
    self, ImageFilter, alt_text, inline_text, is_data_uri, parse_date_loose, resolve,
    srcset_candidates,
};
use super::straits_times::StraitsTimes;
use crate::error::ExtractError;
use crate::models::{ArticleRecord, ImageRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

static DATE_TIME: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"time[data-testid="date"]"#).unwrap());
static ANY_TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time").unwrap());
static IMG_WITH_SRC: Lazy<Selector> = Lazy::new(|| Selector::parse("img[src]").unwrap());
static CAPTION_WRAPPER: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"div[data-testid="image-caption-wrapper"]"#).unwrap());
static FIGCAPTION: Lazy<Selector> = Lazy::new(|| Selector::parse("figcaption").unwrap());

static UNWANTED_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
          /assets/image-placeholder-.*\.(?:png|jpe?g|webp)$
        | /reactions/\d+\.(?:gif|png|webp)$
        | (?:^|//|://)[^/]*\boutbrainimg\.com/
        ",
    )
    .unwrap()
});

pub struct TheNewPaper {
    images: ImageFilter,
}

impl TheNewPaper {
    pub fn new(images: ImageFilter) -> Self {
        Self { images }
    }

    /// Images with captions, filtered and deduplicated.
    pub fn images(&self, article: ElementRef<'_>, url: &str) -> Vec<ImageRecord> {
        let images = article
            .select(&IMG_WITH_SRC)
            .filter_map(|img| {
                let chosen = match img.value().attr("srcset") {
                    Some(srcset) => widest_wanted(srcset)?,
                    None => img.value().attr("src")?.to_string(),
                };
                if is_unwanted(&chosen) {
                    return None;
                }
                Some(ImageRecord {
                    image_url: resolve(url, &chosen)?,
                    alt_text: alt_text(img),
                    caption: caption_for(img),
                })
            })
            .collect();
        self.images.apply(images)
    }
}

impl Extractor for TheNewPaper {
    fn name(&self) -> &'static str {
        "the_new_paper"
    }

    fn fetch_attempts(&self) -> usize {
        3
    }

    fn extract(&self, document: &Html, url: &str) -> Result<ArticleRecord, ExtractError> {
        let article = common::article(document)?;
        let mut record = StraitsTimes::text_fields(document, article, url);
        record.publish_date = document
            .select(&DATE_TIME)
            .next()
            .or_else(|| document.select(&ANY_TIME).next())
            .map(inline_text)
            .and_then(|raw| parse_date_loose(&raw));
        record.images = self.images(article, url);
        Ok(record)
    }
}

fn is_unwanted(u: &str) -> bool {
    is_data_uri(u) || UNWANTED_IMAGE.is_match(u)
}

fn widest_wanted(srcset: &str) -> Option<String> {
    srcset_candidates(srcset)
        .into_iter()
        .filter(|(u, _)| !is_unwanted(u))
        .rev()
        .max_by_key(|(_, w)| *w)
        .map(|(u, _)| u)
}

/// Caption from a caption wrapper beside the image, else from the
/// enclosing `<figure>`'s `<figcaption>`.
fn caption_for(img: ElementRef<'_>) -> Option<String> {
    let parent = img.parent().and_then(ElementRef::wrap);
    let from_wrapper = parent
        .and_then(|p| p.select(&CAPTION_WRAPPER).next())
        .map(inline_text);

    from_wrapper
        .or_else(|| {
            img.ancestors()
                .filter_map(ElementRef::wrap)
                .find(|a| a.value().name() == "figure")
                .and_then(|fig| fig.select(&FIGCAPTION).next())
                .map(inline_text)
        })
        .filter(|c| !c.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
        <time data-testid="date">15 Jan 2024</time>
        <article>
          <h1>Hawker hero</h1>
          <div>
            <img src="/fallback.jpg" srcset="/small.jpg 400w, /big.jpg 1600w" alt="Chef">
            <div data-testid="image-caption-wrapper">Chef at work</div>
          </div>
          <figure><img src="/two.jpg"><figcaption>Second shot</figcaption></figure>
          <img src="/assets/image-placeholder-16x9.png">
          <img src="https://cdn.tnp.sg/reactions/3.gif">
          <img src="https://images.outbrainimg.com/x.jpg">
          <img src="/two.jpg">
          <p>Story text.</p>
        </article></body></html>"#;

    #[test]
    fn test_extracts_images_with_captions() {
        let doc = Html::parse_document(PAGE);
        let rec = TheNewPaper::new(ImageFilter::default())
            .extract(&doc, "https://tnp.straitstimes.com/news/a")
            .unwrap();

        assert_eq!(rec.publish_date.as_deref(), Some("2024-01-15"));
        assert_eq!(rec.images.len(), 2);
        assert_eq!(rec.images[0].image_url, "https://tnp.straitstimes.com/big.jpg");
        assert_eq!(rec.images[0].alt_text.as_deref(), Some("Chef"));
        assert_eq!(rec.images[0].caption.as_deref(), Some("Chef at work"));
        assert_eq!(rec.images[1].image_url, "https://tnp.straitstimes.com/two.jpg");
        assert_eq!(rec.images[1].caption.as_deref(), Some("Second shot"));
    }

    #[test]
    fn test_unwanted_patterns() {
        assert!(is_unwanted("https://x/assets/image-placeholder-1x1.PNG"));
        assert!(is_unwanted("https://x/reactions/12.webp"));
        assert!(is_unwanted("//widgets.outbrainimg.com/p.jpg"));
        assert!(is_unwanted("data:image/png;base64,AA"));
        assert!(!is_unwanted("https://x/news/photo.jpg"));
    }
}
