//! Rewrites WebP image references to local PNG copies, which pandoc's PDF
//! engines can embed.
//!
//! An image that cannot be converted is skipped: its reference is left as it
//! was, a warning is logged and the failure is listed in the report.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::Digest as _;
use url::Url;

use crate::error::ImageConversionError;
use crate::fetch::Fetcher;
use crate::markdown::FenceTracker;

static IMAGE_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"!\[[^\]]*\]\(\s*(?:<([^>\n]+)>|([^)\s]+))(?:\s+"[^"]*")?\s*\)"#)
        .unwrap_or_else(|err| panic!("invalid image link regex: {err}"))
});

#[derive(Debug)]
pub struct LocalizeReport {
    pub markdown: String,
    /// Original target -> written PNG path.
    pub converted: Vec<(String, PathBuf)>,
    pub failed: Vec<(String, ImageConversionError)>,
}

pub struct ImageLocalizer<'a> {
    fetcher: &'a dyn Fetcher,
    images_dir: PathBuf,
    /// Directory of the Markdown file; relative targets resolve against it
    /// and rewritten links are expressed relative to it.
    base_dir: PathBuf,
}

impl<'a> ImageLocalizer<'a> {
    pub fn new(
        fetcher: &'a dyn Fetcher,
        images_dir: impl Into<PathBuf>,
        base_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            images_dir: images_dir.into(),
            base_dir: base_dir.into(),
        }
    }

    pub fn localize(&self, markdown: &str) -> LocalizeReport {
        let targets = webp_targets(markdown);
        let mut converted = Vec::new();
        let mut failed = Vec::new();
        let mut replacements: HashMap<String, String> = HashMap::new();

        for target in targets {
            match self.convert(&target) {
                Ok(path) => {
                    tracing::info!(%target, png = %path.display(), "converted image");
                    replacements.insert(target.clone(), self.link_for(&path));
                    converted.push((target, path));
                }
                Err(err) => {
                    tracing::warn!(%target, error = %err, "image conversion failed; keeping original reference");
                    failed.push((target, err));
                }
            }
        }

        let markdown = rewrite_targets(markdown, &replacements);
        LocalizeReport {
            markdown,
            converted,
            failed,
        }
    }

    fn convert(&self, target: &str) -> Result<PathBuf, ImageConversionError> {
        let bytes = self.load(target)?;
        let image =
            image::load_from_memory(&bytes).map_err(|source| ImageConversionError::Decode {
                target: target.to_owned(),
                source,
            })?;

        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|source| ImageConversionError::Encode {
                target: target.to_owned(),
                source,
            })?;

        let path = self.images_dir.join(png_file_name(target));
        let write_err = |source| ImageConversionError::Write {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(&self.images_dir).map_err(write_err)?;
        std::fs::write(&path, &png).map_err(write_err)?;
        Ok(path)
    }

    fn load(&self, target: &str) -> Result<Vec<u8>, ImageConversionError> {
        if let Ok(url) = Url::parse(target) {
            match url.scheme() {
                "http" | "https" => {
                    return self
                        .fetcher
                        .fetch(&url)
                        .map_err(|source| ImageConversionError::Fetch {
                            target: target.to_owned(),
                            source,
                        });
                }
                "file" => {
                    let path = url.to_file_path().unwrap_or_else(|()| PathBuf::from(url.path()));
                    return read_file(&path);
                }
                _ => {}
            }
        }
        read_file(&self.base_dir.join(target))
    }

    fn link_for(&self, path: &Path) -> String {
        let relative = if self.base_dir.as_os_str().is_empty() {
            path
        } else {
            path.strip_prefix(&self.base_dir).unwrap_or(path)
        };
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, ImageConversionError> {
    std::fs::read(path).map_err(|source| ImageConversionError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Distinct WebP image targets outside code blocks, in order of appearance.
pub fn webp_targets(markdown: &str) -> Vec<String> {
    let mut targets: Vec<String> = Vec::new();
    let mut fences = FenceTracker::default();
    for line in markdown.lines() {
        if fences.consume(line) {
            continue;
        }
        for caps in IMAGE_LINK_RE.captures_iter(line) {
            let Some(target) = caps.get(1).or_else(|| caps.get(2)) else {
                continue;
            };
            let target = target.as_str().trim();
            if is_webp(target) && !targets.iter().any(|t| t == target) {
                targets.push(target.to_owned());
            }
        }
    }
    targets
}

fn rewrite_targets(markdown: &str, replacements: &HashMap<String, String>) -> String {
    if replacements.is_empty() {
        return markdown.to_owned();
    }

    let mut out = String::with_capacity(markdown.len());
    let mut fences = FenceTracker::default();
    for line in markdown.split_inclusive('\n') {
        if fences.consume(line.trim_end_matches(['\n', '\r'])) {
            out.push_str(line);
            continue;
        }
        let rewritten = IMAGE_LINK_RE.replace_all(line, |caps: &regex::Captures<'_>| {
            let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            let Some(target) = caps.get(1).or_else(|| caps.get(2)) else {
                return whole.to_owned();
            };
            let Some(new_target) = replacements.get(target.as_str().trim()) else {
                return whole.to_owned();
            };
            let start = target.start() - caps.get(0).map_or(0, |m| m.start());
            let end = start + target.as_str().len();
            format!("{}{new_target}{}", &whole[..start], &whole[end..])
        });
        out.push_str(&rewritten);
    }
    out
}

fn is_webp(target: &str) -> bool {
    let path = target.split(['?', '#']).next().unwrap_or_default();
    path.to_ascii_lowercase().ends_with(".webp")
}

/// Stable file name: the original stem plus a hash of the full target, so
/// the same reference always maps to the same PNG.
fn png_file_name(target: &str) -> String {
    let path = target.split(['?', '#']).next().unwrap_or_default();
    let stem = path
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .rsplit_once('.')
        .map_or("", |(stem, _)| stem);
    let stem: String = stem
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect();
    let stem = if stem.is_empty() { "image".to_owned() } else { stem };

    let digest = sha2::Sha256::digest(target.as_bytes());
    format!("{stem}-{}.png", &hex::encode(digest)[..16])
}
