use sha2::Digest as _;
use url::Url;

/// One chapter link found on the manual's index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterRef {
    /// Stable cache key derived from the URL; see [`chapter_id_from_url`].
    pub id: String,
    pub title: String,
    /// 1-based position on the index page.
    pub ordinal: usize,
    pub url: Url,
}

/// Markdown extracted from one chapter page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub title: Option<String>,
    pub markdown: String,
}

/// A chapter ready for assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub anchor: String,
    pub title: String,
    pub markdown: String,
}

/// A chapter that was dropped from the document, and why.
#[derive(Debug, Clone)]
pub struct ChapterFailure {
    pub title: String,
    pub url: String,
    pub reason: String,
}

/// Readable path segments joined by `_`, then the first 12 hex digits of the
/// canonical URL's sha256. Two pages share a key only if they are the same
/// page.
pub fn chapter_id_from_url(url: &Url) -> String {
    let segments: Vec<&str> = url
        .path()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    let stem = if segments.is_empty() {
        "index".to_owned()
    } else {
        segments.join("_")
    };

    let digest = sha2::Sha256::digest(canonical_url(url).as_bytes());
    format!("{stem}-{}", &hex::encode(digest)[..12])
}

/// URL with fragment, query and trailing slashes removed, used to recognise
/// the same page behind slightly different hrefs.
pub fn canonical_url(url: &Url) -> String {
    let mut canonical = url.clone();
    canonical.set_fragment(None);
    canonical.set_query(None);
    let mut path = canonical.path().to_owned();
    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    canonical.set_path(&path);
    canonical.to_string()
}
