//! Lianhe Zaobao extractor.
//!
//! Text fields follow The Straits Times layout. Images are one hero image
//! followed by every image in the article body:
//!
//! 1. the first `<img src>` inside a `button.w-full`
//! 2. else the first `<img src>` inside any `<button>`
//! 3. else the first `<img src>` inside a header-like `<div>`
//!    (class containing `header`, `hero`, `banner` or `flex-col`)
//!
//! Body images come from the first `div` whose class contains `articleBody`.
//! A body image whose parent is a `<figure>` takes that figure's
//! `<figcaption>` as caption.

use super::Extractor;
use super::common::{self, ImageFilter, alt_text, inline_text, resolve};
use super::straits_times::StraitsTimes;
use crate::error::ExtractError;
use crate::models::{ArticleRecord, ImageRecord};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};

static HERO_BUTTON: Lazy<Selector> = Lazy::new(|| Selector::parse("button.w-full").unwrap());
static BUTTON: Lazy<Selector> = Lazy::new(|| Selector::parse("button").unwrap());
static HEADER_DIV: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        r#"div[class*="header"], div[class*="hero"], div[class*="banner"], div[class*="flex-col"]"#,
    )
    .unwrap()
});
static ARTICLE_BODY: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"div[class*="articleBody"]"#).unwrap());
static IMG_WITH_SRC: Lazy<Selector> = Lazy::new(|| Selector::parse("img[src]").unwrap());
static FIGCAPTION: Lazy<Selector> = Lazy::new(|| Selector::parse("figcaption").unwrap());

pub struct Zaobao {
    images: ImageFilter,
}

impl Zaobao {
    pub fn new(images: ImageFilter) -> Self {
        Self { images }
    }

    fn images(&self, article: ElementRef<'_>, url: &str) -> Vec<ImageRecord> {
        let mut images: Vec<ImageRecord> = hero_image(article, url).into_iter().collect();

        match article.select(&ARTICLE_BODY).next() {
            Some(body) => {
                let before = images.len();
                images.extend(body.select(&IMG_WITH_SRC).filter_map(|img| {
                    Some(ImageRecord {
                        image_url: resolve(url, img.value().attr("src")?)?,
                        alt_text: alt_text(img),
                        caption: figure_caption(img),
                    })
                }));
                debug!(body_images = images.len() - before, "Collected article body images");
            }
            None => debug!("No articleBody container"),
        }
        self.images.apply(images)
    }
}

impl Extractor for Zaobao {
    fn name(&self) -> &'static str {
        "zaobao"
    }

    #[instrument(level = "debug", skip_all, fields(%url))]
    fn extract(&self, document: &Html, url: &str) -> Result<ArticleRecord, ExtractError> {
        let article = common::article(document)?;
        let mut record = StraitsTimes::text_fields(document, article, url);
        record.images = self.images(article, url);
        debug!(images = record.images.len(), "Extracted article");
        Ok(record)
    }
}

/// First usable image under any element matched by `sel`, in document order.
fn first_image_under(article: ElementRef<'_>, sel: &Selector, url: &str) -> Option<ImageRecord> {
    article
        .select(sel)
        .filter_map(|el| el.select(&IMG_WITH_SRC).next())
        .find_map(|img| {
            Some(ImageRecord {
                image_url: resolve(url, img.value().attr("src")?)?,
                alt_text: alt_text(img),
                caption: None,
            })
        })
}

fn hero_image(article: ElementRef<'_>, url: &str) -> Option<ImageRecord> {
    let found = [
        ("w-full button", &*HERO_BUTTON),
        ("any button", &*BUTTON),
        ("header div", &*HEADER_DIV),
    ]
    .into_iter()
    .find_map(|(source, sel)| first_image_under(article, sel, url).map(|img| (source, img)));

    match found {
        Some((source, img)) => {
            debug!(source, image_url = %img.image_url, "Found hero image");
            Some(img)
        }
        None => {
            debug!("No hero image");
            None
        }
    }
}

fn figure_caption(img: ElementRef<'_>) -> Option<String> {
    img.parent()
        .and_then(ElementRef::wrap)
        .filter(|p| p.value().name() == "figure")
        .and_then(|fig| fig.select(&FIGCAPTION).next())
        .map(inline_text)
        .filter(|c| !c.is_empty())
}
