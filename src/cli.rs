use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch every chapter and write the combined Markdown (and optionally PDF).
    Build(BuildArgs),
    /// Localize images and convert an existing Markdown file to PDF.
    Export(ExportArgs),
}

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Manual index page listing every chapter (must be http/https).
    #[arg(long, default_value = crate::config::DEFAULT_INDEX_URL)]
    pub index_url: String,

    /// CSS selector for chapter links on the index page.
    #[arg(long, default_value = crate::config::DEFAULT_LINK_SELECTOR)]
    pub link_selector: String,

    /// CSS selector for the main content container (repeatable, tried in order).
    #[arg(long = "content-selector")]
    pub content_selectors: Vec<String>,

    /// Directory holding one cached HTML file per chapter.
    #[arg(long, default_value = "html")]
    pub cache_dir: String,

    /// Output path for the combined Markdown.
    #[arg(long, default_value = "PineScript_v6_Manual.md")]
    pub out: String,

    /// Also convert the Markdown output to PDF (requires pandoc).
    #[arg(long)]
    pub pdf: bool,

    /// Output path for the PDF (default: `--out` with a `.pdf` extension).
    #[arg(long)]
    pub pdf_out: Option<String>,

    #[command(flatten)]
    pub pdf_options: PdfOptions,

    #[command(flatten)]
    pub fetch_options: FetchOptions,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Input Markdown file.
    #[arg(long)]
    pub input: String,

    /// Output PDF path.
    #[arg(long)]
    pub out: String,

    #[command(flatten)]
    pub pdf_options: PdfOptions,

    #[command(flatten)]
    pub fetch_options: FetchOptions,
}

#[derive(Debug, Args)]
pub struct PdfOptions {
    /// Directory for PNG copies of WebP images, relative to the Markdown file.
    #[arg(long, default_value = "images")]
    pub images_dir: String,

    /// Keep WebP image references as they are.
    #[arg(long)]
    pub no_localize_images: bool,

    /// Path to the pandoc executable.
    #[arg(long, default_value = "pandoc")]
    pub pandoc: String,

    /// PDF engine passed to pandoc (repeatable, tried in order).
    #[arg(long = "pdf-engine")]
    pub pdf_engines: Vec<String>,

    /// Document title written to the PDF metadata.
    #[arg(long)]
    pub title: Option<String>,

    /// Kill pandoc after this many seconds.
    #[arg(long, default_value_t = 600)]
    pub pdf_timeout_secs: u64,
}

#[derive(Debug, Args)]
pub struct FetchOptions {
    /// User-Agent header sent with every request.
    #[arg(long, default_value = crate::config::DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Per-request timeout.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Extra attempts after a transient network failure.
    #[arg(long, default_value_t = 2)]
    pub retries: u32,

    /// Delay before each network request (politeness).
    #[arg(long, default_value_t = 200)]
    pub delay_ms: u64,
}
