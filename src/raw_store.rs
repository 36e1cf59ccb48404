//! On-disk cache of raw chapter HTML.
//!
//! An entry that exists is returned as-is on every later run; nothing is
//! revalidated against the remote page. Delete the file to force a refetch.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use url::Url;

use crate::error::FetchError;
use crate::fetch::Fetcher;

/// Raw HTML together with where it came from.
#[derive(Debug)]
pub enum Page {
    Fetched(String),
    Cached(String),
}

impl Page {
    pub fn contents(&self) -> &str {
        match self {
            Page::Fetched(contents) | Page::Cached(contents) => contents,
        }
    }

    pub fn into_contents(self) -> String {
        match self {
            Page::Fetched(contents) | Page::Cached(contents) => contents,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Page::Cached(_))
    }
}

pub struct PageCache<'a> {
    dir: PathBuf,
    fetcher: &'a dyn Fetcher,
}

impl<'a> PageCache<'a> {
    pub fn open(dir: impl Into<PathBuf>, fetcher: &'a dyn Fetcher) -> Result<Self, FetchError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| FetchError::Cache {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir, fetcher })
    }

    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(cache_file_name(key))
    }

    /// Returns the cached HTML for `key`, fetching `url` only on a miss.
    pub fn get(&self, key: &str, url: &Url) -> Result<Page, FetchError> {
        let path = self.entry_path(key);
        if path.is_file() {
            let bytes = std::fs::read(&path).map_err(|source| FetchError::Cache {
                path: path.clone(),
                source,
            })?;
            tracing::debug!(key, path = %path.display(), "page cache hit");
            return Ok(Page::Cached(String::from_utf8_lossy(&bytes).into_owned()));
        }

        tracing::info!(key, %url, "downloading page");
        let bytes = self.fetcher.fetch(url)?;
        write_atomically(&self.dir, &path, &bytes)?;
        Ok(Page::Fetched(String::from_utf8_lossy(&bytes).into_owned()))
    }
}

/// Writes to a temp file in `dir` and renames it over `path`, so a crash
/// never leaves a truncated entry behind.
fn write_atomically(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), FetchError> {
    let cache_err = |source| FetchError::Cache {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(cache_err)?;
    tmp.write_all(bytes).map_err(cache_err)?;
    tmp.flush().map_err(cache_err)?;
    tmp.persist(path).map_err(|err| cache_err(err.error))?;
    Ok(())
}

pub fn cache_file_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() {
        name.push('_');
    }
    name.push_str(".html");
    name
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    struct StubFetcher {
        calls: Cell<usize>,
        body: Option<&'static str>,
    }

    impl Fetcher for StubFetcher {
        fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
            self.calls.set(self.calls.get() + 1);
            match self.body {
                Some(body) => Ok(body.as_bytes().to_vec()),
                None => Err(FetchError::Status {
                    url: url.to_string(),
                    status: 500,
                }),
            }
        }
    }

    fn url() -> Url {
        Url::parse("https://example.com/docs/intro").unwrap()
    }

    #[test]
    fn second_get_is_served_from_disk() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let fetcher = StubFetcher {
            calls: Cell::new(0),
            body: Some("<html>intro</html>"),
        };
        let cache = PageCache::open(temp.path().join("html"), &fetcher)?;

        let first = cache.get("docs_intro", &url())?;
        assert!(!first.is_cached());
        let second = cache.get("docs_intro", &url())?;
        assert!(second.is_cached());
        assert_eq!(second.contents(), "<html>intro</html>");
        assert_eq!(fetcher.calls.get(), 1);
        Ok(())
    }

    #[test]
    fn existing_entry_is_never_refetched() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let fetcher = StubFetcher {
            calls: Cell::new(0),
            body: None,
        };
        let cache = PageCache::open(temp.path(), &fetcher)?;
        std::fs::write(cache.entry_path("docs_intro"), "stale but trusted")?;

        let page = cache.get("docs_intro", &url())?;
        assert_eq!(page.into_contents(), "stale but trusted");
        assert_eq!(fetcher.calls.get(), 0);
        Ok(())
    }

    #[test]
    fn failed_fetch_leaves_no_entry() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let fetcher = StubFetcher {
            calls: Cell::new(0),
            body: None,
        };
        let cache = PageCache::open(temp.path(), &fetcher)?;

        let err = cache.get("docs_intro", &url()).unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 500, .. }));
        assert!(!cache.entry_path("docs_intro").exists());
        assert_eq!(std::fs::read_dir(temp.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn cache_file_names_are_sanitized() {
        assert_eq!(cache_file_name("pine-script-docs_intro"), "pine-script-docs_intro.html");
        assert_eq!(cache_file_name("a/b?c"), "a_b_c.html");
        assert_eq!(cache_file_name(""), "_.html");
    }
}
