//! esdump - parallel sliced export of Elasticsearch indices
//!
//! Exports every index matching a name or glob pattern to gzip-compressed
//! NDJSON, one artifact per slice, optionally combined into one file per index.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use esdump_core::{
    CancelToken, ExportConfig, ExportError, ProgressContext, SharedProgress, SliceMode,
    export_index, init_logging,
};
use esdump_elastic::{ElasticClient, ElasticConfig, resolve_indices};

mod config;
mod summary;

use config::{Config, parse_slice_mode};
use summary::{RunSummary, print_index_summary, print_table};

#[derive(Parser, Debug)]
#[command(name = "esdump")]
#[command(about = "Parallel sliced export of Elasticsearch indices to gzip NDJSON")]
#[command(version)]
struct Cli {
    /// Index name or glob pattern (e.g. `logs-*`)
    #[arg(short, long)]
    index: String,

    /// Cluster URL [default: http://localhost:9200]
    #[arg(long, env = "ES_URL")]
    url: Option<String>,

    /// Slices per index: `auto` or a positive integer
    #[arg(short, long, value_parser = parse_slice_mode)]
    slices: Option<SliceMode>,

    /// Output directory [default: export]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Combine slice files into one file per index
    #[arg(long)]
    combine: bool,

    /// Keep slice files after a successful combine
    #[arg(long, requires = "combine")]
    keep_slices: bool,

    /// Basic-auth username
    #[arg(short, long, env = "ES_USERNAME")]
    username: Option<String>,

    /// Basic-auth password
    #[arg(short, long, env = "ES_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Maximum slices exported concurrently
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Documents requested per page
    #[arg(long)]
    page_size: Option<u32>,

    /// Maximum retry attempts per request for transient failures
    #[arg(long)]
    max_retries: Option<u32>,

    /// Only list matching indices without exporting
    #[arg(long)]
    list_only: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "debug")]
    quiet: bool,

    /// Config file path (default: ./esdump.toml or ~/.config/esdump/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Merge CLI flags (and their env fallbacks) over file settings.
fn resolve_settings(cli: &Cli, file: &Config) -> Result<(ElasticConfig, ExportConfig)> {
    let es = &file.elasticsearch;
    let elastic = ElasticConfig {
        url: cli.url.clone().unwrap_or_else(|| es.url.clone()),
        username: cli.username.clone().or_else(|| es.username.clone()),
        password: cli.password.clone().or_else(|| es.password.clone()),
        insecure: es.insecure,
        request_timeout: Duration::from_secs(es.request_timeout_secs),
        connect_timeout: Duration::from_secs(es.connect_timeout_secs),
        scroll_keepalive: es.scroll_keepalive.clone(),
        pool_size: es.pool_size,
    };
    if elastic.username.is_some() && elastic.password.is_none() {
        bail!("username given without password (use --password or ES_PASSWORD)");
    }

    let ex = &file.export;
    let slices = match cli.slices {
        Some(mode) => mode,
        None => parse_slice_mode(&ex.slices)
            .map_err(anyhow::Error::msg)
            .context("invalid [export] slices")?,
    };
    let mut retry = file.retry.policy();
    if let Some(n) = cli.max_retries {
        retry.max_retries = n;
    }
    let concurrency = cli.concurrency.unwrap_or(ex.concurrency);
    let page_size = cli.page_size.unwrap_or(ex.page_size);
    if concurrency == 0 || page_size == 0 {
        bail!("concurrency and page size must be at least 1");
    }
    let export = ExportConfig {
        output_dir: cli.output.clone().unwrap_or_else(|| ex.output_dir.clone()),
        slices,
        max_slices: ex.max_slices.max(1),
        min_docs_per_slice: ex.min_docs_per_slice.max(1),
        page_size,
        concurrency,
        combine: cli.combine || ex.combine,
        keep_slices: cli.keep_slices || ex.keep_slices,
        compression_level: ex.compression_level.min(9),
        retry,
    };
    Ok((elastic, export))
}

/// First SIGINT/SIGTERM cancels the run; a second one exits with 130.
fn setup_signal_handler(cancel: &CancelToken) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::flag;

    for signal in [SIGINT, SIGTERM] {
        // Registered first so it sees the flag before the second handler sets it
        flag::register_conditional_shutdown(signal, 130, Arc::clone(cancel.flag()))
            .context("Failed to register signal handler")?;
        flag::register(signal, Arc::clone(cancel.flag()))
            .context("Failed to register signal handler")?;
    }
    Ok(())
}

fn print_settings(indices: &[String], elastic: &ElasticConfig, export: &ExportConfig) {
    print_table(
        "Setting",
        &[
            ("Matched indices", indices.len().to_string()),
            ("Cluster", elastic.url.clone()),
            ("Slices per index", export.slices.to_string()),
            ("Concurrency", export.concurrency.to_string()),
            ("Page size", export.page_size.to_string()),
            ("Output directory", format!("{}/", export.output_dir.display())),
            (
                "Authentication",
                match &elastic.username {
                    Some(user) => format!("basic ({user})"),
                    None => "none".to_string(),
                },
            ),
            ("Combine", if export.combine { "yes" } else { "no" }.to_string()),
            ("Max retries", export.retry.max_retries.to_string()),
        ],
    );
}

fn run(cli: Cli, progress: &SharedProgress, cancel: &CancelToken) -> Result<ExitCode> {
    let file = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    let (elastic, export) = resolve_settings(&cli, &file)?;
    log::debug!("{elastic:?}");

    let client = ElasticClient::new(elastic).context("Failed to create cluster client")?;
    let indices = resolve_indices(&client, &cli.index)
        .with_context(|| format!("Failed to resolve indices for '{}'", cli.index))?;

    if indices.is_empty() {
        log::error!(
            "No indices found matching pattern '{}' (use --list-only with '*' to see all)",
            cli.index
        );
        return Ok(ExitCode::from(1));
    }

    if cli.list_only {
        for index in &indices {
            println!("{index}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    print_settings(&indices, client.config(), &export);

    let start = Instant::now();
    let mut summary = RunSummary::default();
    for index in &indices {
        if cancel.is_cancelled() {
            break;
        }
        match export_index(index, &export, &client, cancel, progress) {
            Ok(report) => {
                print_index_summary(&report);
                summary.record(&report);
            }
            Err(e) => {
                log::error!("{index}: {e}");
                summary.record_error(index);
                // Credentials apply to every index
                if matches!(e, ExportError::Authentication(_)) || e.is_cancelled() {
                    break;
                }
            }
        }
    }
    summary.elapsed = start.elapsed();
    summary.print();

    if cancel.is_cancelled() {
        log::warn!("Export interrupted");
    }
    Ok(summary.exit_code(cancel.is_cancelled()))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(ProgressContext::new());
    let multi = if progress.is_tty() {
        Some(progress.multi())
    } else {
        None
    };
    init_logging(cli.quiet, cli.debug, multi);

    let cancel = CancelToken::new();
    if let Err(e) = setup_signal_handler(&cancel) {
        log::warn!("{e:#}");
    }

    match run(cli, &progress, &cancel) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
