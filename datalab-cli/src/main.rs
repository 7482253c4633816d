//! DataLab CLI: fetch and cache management commands.
//!
//! Commands:
//! - `prices`: daily (or intraday) prices per ticker from Yahoo Finance
//! - `trends`: Google Trends search interest per keyword
//! - `news`: NewsAPI articles matching a query
//! - `fetch-all`: all three sources in parallel, one CSV per source
//! - `cache status`: report cached entries and size per source
//! - `cache clear`: remove cached entries

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use datalab_core::data::{write_csv, FingerprintCache};
use datalab_core::domain::ProviderId;
use datalab_core::providers;
use datalab_core::{
    DataConfig, DataSource, DateRange, Loaded, NewsSource, Origin, PriceSource, QueryParams,
    TrendSource,
};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Days fetched when `--from` is omitted.
const DEFAULT_WINDOW_DAYS: i64 = 30;

#[derive(Parser)]
#[command(
    name = "datalab",
    about = "DataLab CLI: cached, rate-limited fetching of prices, search trends and news"
)]
struct Cli {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache directory. Overrides the config file.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct Window {
    /// First day (YYYY-MM-DD). Defaults to 30 days before --to.
    #[arg(long)]
    from: Option<String>,

    /// Last day, inclusive (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    to: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch prices for one or more tickers.
    Prices {
        /// Tickers (e.g., BTC-USD ETH-USD). Defaults to the configured list.
        tickers: Vec<String>,

        /// Bar interval (e.g., 1d, 1h, 15m). Defaults to the configured one.
        #[arg(long)]
        interval: Option<String>,

        #[command(flatten)]
        window: Window,

        /// Write CSV here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Fetch search interest for one or more keywords.
    Trends {
        /// Keywords. Defaults to the configured list.
        keywords: Vec<String>,

        #[command(flatten)]
        window: Window,

        /// Write CSV here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Fetch news articles, one request per day.
    News {
        /// Search query. Defaults to the configured one.
        #[arg(long)]
        query: Option<String>,

        #[command(flatten)]
        window: Window,

        /// Write CSV here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Fetch every source with its configured defaults, in parallel.
    FetchAll {
        #[command(flatten)]
        window: Window,

        /// Directory receiving prices.csv, trends.csv and news.csv.
        #[arg(long, default_value = "out")]
        out_dir: PathBuf,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report cached entries and size per source.
    Status {
        /// Only this source.
        #[arg(long, value_enum)]
        provider: Option<ProviderArg>,
    },
    /// Remove cached entries.
    Clear {
        /// Only this source.
        #[arg(long, value_enum)]
        provider: Option<ProviderArg>,

        /// Actually delete (without this flag, only previews what would be removed).
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProviderArg {
    Prices,
    Trends,
    News,
}

impl From<ProviderArg> for ProviderId {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Prices => ProviderId::Prices,
            ProviderArg::Trends => ProviderId::Trends,
            ProviderArg::News => ProviderId::News,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.cache_dir)?;

    match cli.command {
        Commands::Prices {
            tickers,
            interval,
            window,
            out,
        } => {
            let mut params = QueryParams::new();
            if !tickers.is_empty() {
                params = params.with_list("tickers", tickers);
            }
            if let Some(interval) = interval {
                params = params.with_scalar("interval", interval);
            }
            let source = price_source(&config)?;
            run_fetch(&source, &window, &params, out.as_deref())
        }
        Commands::Trends {
            keywords,
            window,
            out,
        } => {
            let mut params = QueryParams::new();
            if !keywords.is_empty() {
                params = params.with_list("keywords", keywords);
            }
            let source = trend_source(&config)?;
            run_fetch(&source, &window, &params, out.as_deref())
        }
        Commands::News { query, window, out } => {
            let mut params = QueryParams::new();
            if let Some(query) = query {
                params = params.with_scalar("query", query);
            }
            let source = news_source(&config)?;
            run_fetch(&source, &window, &params, out.as_deref())
        }
        Commands::FetchAll { window, out_dir } => run_fetch_all(&config, &window, &out_dir),
        Commands::Cache { action } => match action {
            CacheAction::Status { provider } => run_cache_status(&config.cache_dir, provider),
            CacheAction::Clear { provider, confirm } => {
                run_cache_clear(&config.cache_dir, provider, confirm)
            }
        },
    }
}

fn load_config(path: Option<&Path>, cache_dir: Option<PathBuf>) -> Result<DataConfig> {
    let mut config = match path {
        Some(path) => DataConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => DataConfig::default().with_env_overrides().validated()?,
    };
    if let Some(dir) = cache_dir {
        config.cache_dir = dir;
    }
    Ok(config)
}

fn price_source(config: &DataConfig) -> Result<PriceSource> {
    let provider = Arc::new(providers::yahoo(config)?);
    Ok(PriceSource::new(provider, &config.cache_dir, config.prices.clone()))
}

fn trend_source(config: &DataConfig) -> Result<TrendSource> {
    let provider = Arc::new(providers::google_trends(config)?);
    Ok(TrendSource::new(provider, &config.cache_dir, config.trends.clone()))
}

fn news_source(config: &DataConfig) -> Result<NewsSource> {
    if config.news.api_key.is_none() {
        warn!(
            "no NewsAPI key configured; set news.api_key or {}",
            datalab_core::config::NEWS_API_KEY_ENV
        );
    }
    let provider = Arc::new(providers::newsapi(config)?);
    Ok(NewsSource::new(provider, &config.cache_dir, config.news.clone()))
}

fn parse_window(window: &Window) -> Result<DateRange> {
    let parse = |s: &str| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("bad date '{s}'"))
    };
    let to = window
        .to
        .as_deref()
        .map(parse)
        .transpose()?
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let from = window
        .from
        .as_deref()
        .map(parse)
        .transpose()?
        .unwrap_or_else(|| to - chrono::Duration::days(DEFAULT_WINDOW_DAYS));
    Ok(DateRange::new(from, to)?)
}

fn run_fetch(
    source: &dyn DataSource,
    window: &Window,
    params: &QueryParams,
    out: Option<&Path>,
) -> Result<()> {
    let range = parse_window(window)?;
    let loaded = source.load(range, params)?;
    report(source.provider(), &loaded);

    match out {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            write_csv(&loaded.table, BufWriter::new(file))?;
            info!(path = %path.display(), rows = loaded.table.len(), "written");
        }
        None => write_csv(&loaded.table, io::stdout().lock())?,
    }
    Ok(())
}

fn run_fetch_all(config: &DataConfig, window: &Window, out_dir: &Path) -> Result<()> {
    let range = parse_window(window)?;
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let sources: Vec<Box<dyn DataSource>> = vec![
        Box::new(price_source(config)?),
        Box::new(trend_source(config)?),
        Box::new(news_source(config)?),
    ];

    // Sources hit different hosts; running them together only overlaps their waits.
    let results: Vec<(ProviderId, Result<Loaded, _>)> = {
        use rayon::prelude::*;
        sources
            .par_iter()
            .map(|s| (s.provider(), s.load(range, &QueryParams::new())))
            .collect()
    };

    let mut failed = 0;
    for (provider, result) in results {
        match result {
            Ok(loaded) => {
                report(provider, &loaded);
                let path = out_dir.join(format!("{provider}.csv"));
                let file =
                    File::create(&path).with_context(|| format!("creating {}", path.display()))?;
                write_csv(&loaded.table, BufWriter::new(file))?;
                println!("{provider}: {} rows -> {}", loaded.table.len(), path.display());
            }
            Err(e) => {
                failed += 1;
                eprintln!("{provider}: {e}");
            }
        }
    }

    if failed > 0 {
        bail!("{failed} source(s) failed");
    }
    Ok(())
}

fn report(provider: ProviderId, loaded: &Loaded) {
    let origin = match loaded.origin {
        Origin::Cache => "cache",
        Origin::Remote => "remote",
    };
    info!(
        %provider,
        key = %loaded.key,
        rows = loaded.table.len(),
        columns = loaded.table.columns().len(),
        origin,
        "loaded"
    );
    if !loaded.dead_columns.is_empty() {
        warn!(%provider, columns = ?loaded.dead_columns, "columns without data");
    }
    if !loaded.failed_chunks.is_empty() {
        warn!(%provider, chunks = ?loaded.failed_chunks, "some chunks failed");
    }
}

fn selected(provider: Option<ProviderArg>) -> Vec<ProviderId> {
    match provider {
        Some(p) => vec![p.into()],
        None => ProviderId::ALL.to_vec(),
    }
}

fn run_cache_status(cache_dir: &Path, provider: Option<ProviderArg>) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    println!("Cache: {}", cache_dir.display());
    let mut total_size: u64 = 0;

    for id in selected(provider) {
        let cache = FingerprintCache::new(cache_dir, id.dir_name());
        let entries = cache.entries()?;
        let size = dir_size(cache.dir());
        total_size += size;

        println!();
        println!("{id}: {} entries, {}", entries.len(), format_size(size));
        if entries.is_empty() {
            continue;
        }
        println!("  {:<60} {:>8} {:>8}  {}", "Key", "Rows", "Columns", "Cached At");
        println!("  {}", "-".repeat(100));
        for meta in &entries {
            println!(
                "  {:<60} {:>8} {:>8}  {}",
                meta.key,
                meta.row_count,
                meta.columns.len(),
                meta.cached_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    println!();
    println!("Total size: {}", format_size(total_size));
    Ok(())
}

fn run_cache_clear(cache_dir: &Path, provider: Option<ProviderArg>, confirm: bool) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let caches: Vec<(ProviderId, FingerprintCache)> = selected(provider)
        .into_iter()
        .map(|id| (id, FingerprintCache::new(cache_dir, id.dir_name())))
        .collect();

    let mut found = 0;
    for (id, cache) in &caches {
        let count = cache.entries()?.len();
        found += count;
        println!("  {id}: {count} entries ({})", format_size(dir_size(cache.dir())));
    }

    if found == 0 {
        println!("Nothing to remove.");
        return Ok(());
    }

    if !confirm {
        println!();
        println!("Dry run: pass --confirm to actually delete.");
        return Ok(());
    }

    let mut removed = 0;
    for (id, cache) in &caches {
        let n = cache.clear()?;
        println!("Removed {n} entries from {id}");
        removed += n;
    }
    println!("Done. Removed {removed} entries.");
    Ok(())
}

fn dir_size(path: &Path) -> u64 {
    let mut size = 0u64;
    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            if let Ok(meta) = entry.metadata() {
                size += meta.len();
            }
        }
    }
    size
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(from: Option<&str>, to: Option<&str>) -> Window {
        Window {
            from: from.map(String::from),
            to: to.map(String::from),
        }
    }

    #[test]
    fn explicit_window_parses() {
        let range = parse_window(&window(Some("2024-01-01"), Some("2024-01-05"))).unwrap();
        assert_eq!(range.num_days(), 5);
    }

    #[test]
    fn from_defaults_relative_to_to() {
        let range = parse_window(&window(None, Some("2024-03-31"))).unwrap();
        assert_eq!(range.from_date(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn inverted_or_malformed_window_is_rejected() {
        assert!(parse_window(&window(Some("2024-02-01"), Some("2024-01-01"))).is_err());
        assert!(parse_window(&window(Some("01/02/2024"), None)).is_err());
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "datalab",
            "trends",
            "bitcoin",
            "btc",
            "--from",
            "2024-01-01",
            "--cache-dir",
            "/tmp/x",
        ])
        .unwrap();
        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/x")));
        match cli.command {
            Commands::Trends { keywords, window, .. } => {
                assert_eq!(keywords, vec!["bitcoin", "btc"]);
                assert_eq!(window.from.as_deref(), Some("2024-01-01"));
            }
            _ => panic!("expected trends"),
        }
    }

    #[test]
    fn format_size_units() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
