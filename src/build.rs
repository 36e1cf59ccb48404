use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::config::{BuildConfig, ExportConfig, PdfConfig, localized_markdown_path};
use crate::export::PdfExporter;
use crate::extract::{ChapterLinks, Extractor};
use crate::fetch::Fetcher;
use crate::formats::{ChapterFailure, Section};
use crate::images::ImageLocalizer;
use crate::index::{INDEX_CACHE_KEY, parse_chapter_list};
use crate::raw_store::PageCache;

#[derive(Debug)]
pub struct RunSummary {
    pub chapters_total: usize,
    pub succeeded: Vec<String>,
    pub failed: Vec<ChapterFailure>,
    pub network_fetches: usize,
    pub markdown: PathBuf,
    pub pdf: Option<PdfReport>,
}

#[derive(Debug)]
pub struct PdfReport {
    pub images_converted: usize,
    /// Image target and reason, for images left unconverted.
    pub images_failed: Vec<(String, String)>,
    pub outcome: Result<PathBuf, String>,
}

impl RunSummary {
    pub fn pdf_failed(&self) -> bool {
        self.pdf.as_ref().is_some_and(|pdf| pdf.outcome.is_err())
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "chapters: {} succeeded, {} failed (of {}); {} downloaded",
            self.succeeded.len(),
            self.failed.len(),
            self.chapters_total,
            self.network_fetches,
        );
        for title in &self.succeeded {
            let _ = writeln!(out, "  ok: {title}");
        }
        for failure in &self.failed {
            let _ = writeln!(out, "  failed: {} ({}): {}", failure.title, failure.url, failure.reason);
        }
        let _ = writeln!(out, "markdown: {}", self.markdown.display());
        match &self.pdf {
            None => {
                let _ = writeln!(out, "pdf: not requested");
            }
            Some(pdf) => out.push_str(&pdf.render()),
        }
        out
    }
}

impl PdfReport {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "images: {} converted, {} skipped",
            self.images_converted,
            self.images_failed.len()
        );
        for (target, reason) in &self.images_failed {
            let _ = writeln!(out, "  skipped: {target}: {reason}");
        }
        match &self.outcome {
            Ok(path) => {
                let _ = writeln!(out, "pdf: {}", path.display());
            }
            Err(reason) => {
                let _ = writeln!(out, "pdf: failed: {reason}");
            }
        }
        out
    }
}

/// Fetches every chapter listed on the index page, writes the combined
/// Markdown and, when configured, the PDF.
///
/// Chapters that cannot be fetched or extracted are skipped and reported.
/// The run fails only if no chapter survives.
pub fn run(config: &BuildConfig, fetcher: &dyn Fetcher) -> anyhow::Result<RunSummary> {
    let cache = PageCache::open(&config.cache_dir, fetcher).context("open page cache")?;

    tracing::info!(url = %config.source.index_url, "build: read chapter index");
    let index = cache
        .get(INDEX_CACHE_KEY, &config.source.index_url)
        .context("fetch manual index page")?;
    let mut network_fetches = usize::from(!index.is_cached());
    let chapters = parse_chapter_list(
        index.contents(),
        &config.source.index_url,
        &config.source.link_selector,
    )
    .context("parse chapter list")?;
    if chapters.is_empty() {
        anyhow::bail!(
            "no chapter links matched {:?} on {}",
            config.source.link_selector,
            config.source.index_url
        );
    }
    tracing::info!(chapters = chapters.len(), "build: found chapters");

    let extractor =
        Extractor::new(&config.source.content_selectors).context("build content extractor")?;

    // First pass: fetch every chapter and keep those whose content extracts.
    // Links are left absolute here; anchors exist only once survivors are known.
    let no_links = ChapterLinks::default();
    let mut survivors = Vec::new();
    let mut failed = Vec::new();
    for chapter in &chapters {
        let page = match cache.get(&chapter.id, &chapter.url) {
            Ok(page) => page,
            Err(err) => {
                tracing::warn!(chapter = %chapter.title, url = %chapter.url, error = %err, "fetch failed; skipping chapter");
                failed.push(ChapterFailure {
                    title: chapter.title.clone(),
                    url: chapter.url.to_string(),
                    reason: format!("{:#}", anyhow::Error::new(err)),
                });
                continue;
            }
        };
        if page.is_cached() {
            tracing::info!(chapter = %chapter.title, "using cached html");
        } else {
            network_fetches += 1;
        }

        let extracted = extractor.extract(page.contents(), &chapter.url, &no_links);
        match extracted {
            Ok(fragment) => survivors.push((chapter, page.into_contents(), fragment)),
            Err(err) => {
                tracing::warn!(chapter = %chapter.title, url = %chapter.url, error = %err, "extraction failed; skipping chapter");
                failed.push(ChapterFailure {
                    title: chapter.title.clone(),
                    url: chapter.url.to_string(),
                    reason: err.to_string(),
                });
            }
        }
    }

    if survivors.is_empty() {
        anyhow::bail!(
            "all {} chapters failed; no markdown written",
            chapters.len()
        );
    }

    let titles: Vec<&str> = survivors
        .iter()
        .map(|(chapter, _, _)| chapter.title.as_str())
        .collect();
    let (toc, anchors) = crate::toc::build_toc(&titles);
    let mut links = ChapterLinks::default();
    for ((chapter, _, _), anchor) in survivors.iter().zip(&anchors) {
        links.insert(&chapter.url, anchor.as_str());
    }

    // Second pass: convert again with links to surviving chapters as anchors.
    let mut sections = Vec::with_capacity(survivors.len());
    for ((chapter, html, first_pass), anchor) in survivors.into_iter().zip(anchors) {
        let fragment = match extractor.extract(&html, &chapter.url, &links) {
            Ok(fragment) => fragment,
            Err(err) => {
                tracing::warn!(chapter = %chapter.title, error = %err, "link rewrite failed; keeping absolute links");
                first_pass
            }
        };
        tracing::debug!(
            chapter = %chapter.title,
            ordinal = chapter.ordinal,
            page_title = fragment.title.as_deref().unwrap_or_default(),
            "extracted chapter"
        );
        sections.push(Section {
            anchor,
            title: chapter.title.clone(),
            markdown: fragment.markdown,
        });
    }

    let document = crate::book::assemble(&toc, &sections);
    write_output(&config.markdown_out, &document).context("write markdown")?;
    tracing::info!(path = %config.markdown_out.display(), "markdown manual saved");

    let pdf = config
        .pdf
        .as_ref()
        .map(|pdf| export_pdf(&config.markdown_out, pdf, fetcher))
        .transpose()?;

    Ok(RunSummary {
        chapters_total: chapters.len(),
        succeeded: sections.into_iter().map(|s| s.title).collect(),
        failed,
        network_fetches,
        markdown: config.markdown_out.clone(),
        pdf,
    })
}

/// `export` subcommand: PDF from an existing Markdown file.
pub fn run_export(config: &ExportConfig, fetcher: &dyn Fetcher) -> anyhow::Result<PdfReport> {
    export_pdf(&config.input, &config.pdf, fetcher)
}

/// Writes a sibling copy of `markdown` with images localized (when
/// configured) and chapter anchors turned into heading ids, then converts that
/// copy. The original Markdown file is never modified. Converter failures are
/// carried in the report; only local I/O errors abort.
pub fn export_pdf(
    markdown: &Path,
    config: &PdfConfig,
    fetcher: &dyn Fetcher,
) -> anyhow::Result<PdfReport> {
    let mut images_converted = 0;
    let mut images_failed = Vec::new();

    let mut contents = std::fs::read_to_string(markdown)
        .with_context(|| format!("read markdown: {}", markdown.display()))?;

    if let Some(images_dir) = &config.images_dir {
        let base_dir = markdown.parent().unwrap_or(Path::new(""));
        tracing::info!("pdf: localize images");
        let localizer = ImageLocalizer::new(fetcher, base_dir.join(images_dir), base_dir);
        let report = localizer.localize(&contents);
        images_converted = report.converted.len();
        images_failed = report
            .failed
            .into_iter()
            .map(|(target, err)| (target, format!("{:#}", anyhow::Error::new(err))))
            .collect();
        contents = report.markdown;
    }

    let input = localized_markdown_path(markdown);
    let prepared = crate::book::heading_ids_from_anchors(&contents);
    write_output(&input, &prepared).context("write localized markdown")?;

    tracing::info!(input = %input.display(), "pdf: convert");
    let outcome = match PdfExporter::new(config).export(&input, &config.out) {
        Ok(()) => {
            tracing::info!(path = %config.out.display(), "pdf manual saved");
            Ok(config.out.clone())
        }
        Err(err) => {
            let reason = format!("{:#}", anyhow::Error::new(err));
            tracing::error!(error = %reason, "pdf export failed; markdown output is unaffected");
            Err(reason)
        }
    };

    Ok(PdfReport {
        images_converted,
        images_failed,
        outcome,
    })
}

fn write_output(path: &Path, contents: &str) -> anyhow::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)
        .with_context(|| format!("create output dir: {}", parent.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    tmp.write_all(contents.as_bytes())
        .with_context(|| format!("write output: {}", path.display()))?;
    tmp.flush()
        .with_context(|| format!("flush output: {}", path.display()))?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("persist output: {}", path.display()))?;
    Ok(())
}
