use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use manualbook::cli::{Cli, Command};
use manualbook::config::{BuildConfig, ExportConfig};
use manualbook::fetch::HttpFetcher;

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn try_main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    manualbook::logging::init(cli.verbose).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        Command::Build(args) => {
            let config = BuildConfig::from_args(&args).context("build config")?;
            let fetcher = HttpFetcher::new(&config.fetch).context("http client")?;
            let summary = manualbook::build::run(&config, &fetcher).context("build")?;
            print!("{}", summary.render());
            if summary.pdf_failed() {
                anyhow::bail!("pdf export failed; markdown is at {}", summary.markdown.display());
            }
        }
        Command::Export(args) => {
            let config = ExportConfig::from_args(&args).context("export config")?;
            let fetcher = HttpFetcher::new(&config.fetch).context("http client")?;
            let report = manualbook::build::run_export(&config, &fetcher).context("export")?;
            print!("{}", report.render());
            if let Err(reason) = &report.outcome {
                anyhow::bail!("pdf export failed: {reason}");
            }
        }
    }

    Ok(())
}
