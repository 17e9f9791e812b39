use anyhow::{Context, Result};
use clap::Parser;
use feedcheck::config::{DEFAULT_CONFIG_FILE, DEFAULT_FEED_LIST};
use feedcheck::{
    validate_feeds_from_file, validate_feeds_from_list, Config, FeedChecker, MissingListPolicy,
};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "feedcheck", about = "Validate RSS/Atom feeds")]
struct Args {
    /// File containing feed URLs (one per line)
    #[arg(short, long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// Feed URL to validate (can be used multiple times)
    #[arg(short, long = "url", value_name = "URL")]
    urls: Vec<String>,

    /// Configuration file [default: ./feedcheck.toml if present]
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

/// Where the URLs to check come from.
#[derive(Debug, PartialEq, Eq)]
enum FeedSource {
    File {
        path: PathBuf,
        missing: MissingListPolicy,
    },
    Urls(Vec<String>),
}

impl Args {
    /// `--file` wins over `--url`. With neither, the default list is read if present.
    fn feed_source(&self) -> FeedSource {
        if let Some(path) = &self.file {
            FeedSource::File {
                path: path.clone(),
                missing: MissingListPolicy::Fail,
            }
        } else if !self.urls.is_empty() {
            FeedSource::Urls(self.urls.clone())
        } else {
            FeedSource::File {
                path: PathBuf::from(DEFAULT_FEED_LIST),
                missing: MissingListPolicy::Skip,
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    // Diagnostics go to stderr; stdout carries the report
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    if args.config.is_some() && !config_path.exists() {
        anyhow::bail!("Config file not found: {}", config_path.display());
    }
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let checker = FeedChecker::from_config(config).context("Failed to build HTTP client")?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let source = args.feed_source();
    tracing::debug!(source = ?source, "Resolved feed source");

    let code = match source {
        FeedSource::File { path, missing } => {
            validate_feeds_from_file(&checker, &path, missing, &mut out).await
        }
        FeedSource::Urls(urls) => validate_feeds_from_list(&checker, &urls, &mut out).await,
    }
    .context("Failed to write report")?;

    out.flush().context("Failed to write report")?;
    Ok(ExitCode::from(code))
}
