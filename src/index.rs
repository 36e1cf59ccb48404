//! Chapter list from the manual's index page.

use std::collections::HashSet;

use scraper::Html;
use url::Url;

use crate::error::ExtractionError;
use crate::extract::parse_selector;
use crate::formats::{ChapterRef, canonical_url, chapter_id_from_url};

/// Cache key of the index page itself. Chapter keys always end in a hex
/// digest, so this one can never collide with a chapter.
pub const INDEX_CACHE_KEY: &str = "_index";

/// Chapter links in index order. In-page links (`#...`) are ignored and a
/// page linked more than once keeps its first position.
pub fn parse_chapter_list(
    html: &str,
    index_url: &Url,
    link_selector: &str,
) -> Result<Vec<ChapterRef>, ExtractionError> {
    let selector = parse_selector(link_selector)?;
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    let mut chapters = Vec::new();
    for link in document.select(&selector) {
        let Some(href) = link.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty() || href.contains('#') {
            continue;
        }
        let Ok(url) = index_url.join(href) else {
            tracing::debug!(href, "skipping unparseable chapter link");
            continue;
        };
        if url.scheme() != "http" && url.scheme() != "https" {
            continue;
        }
        if !seen.insert(canonical_url(&url)) {
            continue;
        }

        let id = chapter_id_from_url(&url);
        let title = link.text().collect::<Vec<_>>().join(" ");
        let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
        let title = if title.is_empty() { id.clone() } else { title };

        chapters.push(ChapterRef {
            id,
            title,
            ordinal: chapters.len() + 1,
            url,
        });
    }

    Ok(chapters)
}
