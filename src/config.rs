use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use url::Url;

use crate::cli::{BuildArgs, ExportArgs, FetchOptions, PdfOptions};

pub const DEFAULT_INDEX_URL: &str = "https://www.tradingview.com/pine-script-docs/";
pub const DEFAULT_LINK_SELECTOR: &str = "a.page-link";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";
pub const DEFAULT_CONTENT_SELECTORS: &[&str] =
    &[".sl-markdown-content", "article", "main", "[role=\"main\"]"];

/// Where the manual lives and how its pages are laid out.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub index_url: Url,
    pub link_selector: String,
    pub content_selectors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub retries: u32,
    pub retry_backoff: Duration,
    pub delay: Duration,
}

#[derive(Debug, Clone)]
pub struct PdfConfig {
    pub out: PathBuf,
    pub pandoc: String,
    pub pdf_engines: Vec<String>,
    pub title: Option<String>,
    pub timeout: Duration,
    /// `None` disables WebP localization.
    pub images_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub source: SourceConfig,
    pub fetch: FetchConfig,
    pub cache_dir: PathBuf,
    pub markdown_out: PathBuf,
    pub pdf: Option<PdfConfig>,
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub input: PathBuf,
    pub fetch: FetchConfig,
    pub pdf: PdfConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            timeout: Duration::from_secs(30),
            retries: 2,
            retry_backoff: Duration::from_millis(500),
            delay: Duration::from_millis(200),
        }
    }
}

impl SourceConfig {
    pub fn new(index_url: Url) -> Self {
        Self {
            index_url,
            link_selector: DEFAULT_LINK_SELECTOR.to_owned(),
            content_selectors: DEFAULT_CONTENT_SELECTORS
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
        }
    }
}

impl From<&FetchOptions> for FetchConfig {
    fn from(options: &FetchOptions) -> Self {
        Self {
            user_agent: options.user_agent.clone(),
            timeout: Duration::from_secs(options.timeout_secs.max(1)),
            retries: options.retries,
            delay: Duration::from_millis(options.delay_ms),
            ..Self::default()
        }
    }
}

impl PdfConfig {
    fn from_options(options: &PdfOptions, out: PathBuf) -> Self {
        Self {
            out,
            pandoc: options.pandoc.clone(),
            pdf_engines: options.pdf_engines.clone(),
            title: options.title.clone(),
            timeout: Duration::from_secs(options.pdf_timeout_secs.max(1)),
            images_dir: (!options.no_localize_images).then(|| PathBuf::from(&options.images_dir)),
        }
    }
}

impl BuildConfig {
    pub fn from_args(args: &BuildArgs) -> anyhow::Result<Self> {
        let index_url = parse_http_url(&args.index_url).context("parse --index-url")?;

        let mut source = SourceConfig::new(index_url);
        source.link_selector = args.link_selector.clone();
        if !args.content_selectors.is_empty() {
            source.content_selectors = args.content_selectors.clone();
        }

        let markdown_out = PathBuf::from(&args.out);
        let pdf = args.pdf.then(|| {
            let out = args
                .pdf_out
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(|| markdown_out.with_extension("pdf"));
            PdfConfig::from_options(&args.pdf_options, out)
        });

        Ok(Self {
            source,
            fetch: FetchConfig::from(&args.fetch_options),
            cache_dir: PathBuf::from(&args.cache_dir),
            markdown_out,
            pdf,
        })
    }
}

impl ExportConfig {
    pub fn from_args(args: &ExportArgs) -> anyhow::Result<Self> {
        let input = PathBuf::from(&args.input);
        if !input.is_file() {
            anyhow::bail!("input markdown does not exist: {}", input.display());
        }
        Ok(Self {
            input,
            fetch: FetchConfig::from(&args.fetch_options),
            pdf: PdfConfig::from_options(&args.pdf_options, PathBuf::from(&args.out)),
        })
    }
}

fn parse_http_url(raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("invalid url: {raw}"))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("url must be http/https: {url}");
    }
    Ok(url)
}

/// Path of the image-localized Markdown fed to the PDF converter.
pub fn localized_markdown_path(markdown: &Path) -> PathBuf {
    let stem = markdown
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "manual".to_owned());
    markdown.with_file_name(format!("{stem}.localized.md"))
}
