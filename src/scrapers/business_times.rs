//! The Business Times extractor, also used for Berita Harian.
//!
//! Text fields follow the Straits Times layout. Images differ: each
//! `<picture>` contributes one image, the widest candidate across its
//! `<source srcset>` entries (falling back to the `<img src>`). Author
//! thumbnails served at `w=100&h=100&dpr=1` are dropped.

use super::Extractor;
use super::common::{self, ImageFilter, alt_text, resolve, srcset_candidates};
use super::straits_times::StraitsTimes;
use crate::error::ExtractError;
use crate::models::{ArticleRecord, ImageRecord};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use url::Url;

static PICTURE: Lazy<Selector> = Lazy::new(|| Selector::parse("picture").unwrap());
static SOURCE: Lazy<Selector> = Lazy::new(|| Selector::parse("source").unwrap());
static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());

pub struct BusinessTimes {
    images: ImageFilter,
}

impl BusinessTimes {
    pub fn new(images: ImageFilter) -> Self {
        Self { images }
    }
}

impl Extractor for BusinessTimes {
    fn name(&self) -> &'static str {
        "business_times"
    }

    fn extract(&self, document: &Html, url: &str) -> Result<ArticleRecord, ExtractError> {
        let article = common::article(document)?;
        let mut record = StraitsTimes::text_fields(document, article, url);
        let images = article
            .select(&PICTURE)
            .filter_map(|p| best_from_picture(p, url))
            .collect();
        record.images = self.images.apply(images);
        Ok(record)
    }
}

fn best_from_picture(picture: ElementRef<'_>, page_url: &str) -> Option<ImageRecord> {
    let img = picture.select(&IMG).next();

    let mut candidates: Vec<(String, u32)> = picture
        .select(&SOURCE)
        .filter_map(|s| s.value().attr("srcset"))
        .flat_map(srcset_candidates)
        .filter_map(|(u, w)| resolve(page_url, &u).map(|u| (u, w)))
        .collect();

    if candidates.is_empty() {
        if let Some(src) = img
            .and_then(|i| i.value().attr("src"))
            .and_then(|s| resolve(page_url, s))
        {
            candidates.push((src, 0));
        }
    }

    // First of the widest wins on ties.
    let (best, _) = candidates
        .into_iter()
        .rev()
        .max_by_key(|(_, w)| *w)?;
    if is_author_thumbnail(&best) {
        return None;
    }
    Some(ImageRecord {
        image_url: best,
        alt_text: img.and_then(alt_text),
        caption: None,
    })
}

fn is_author_thumbnail(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let query = |key: &str| {
        parsed
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    };
    query("w").as_deref() == Some("100")
        && query("h").as_deref() == Some("100")
        && query("dpr").as_deref() == Some("1")
}
