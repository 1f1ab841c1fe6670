use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use feedvane::config::Config;
use feedvane::engine::{EngineHandle, SourceEngine};
use feedvane::icon::IconStore;
use feedvane::store::MemoryStore;
use feedvane::util::normalize_source_url;

/// Get the config file path (~/.config/feedvane/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("feedvane")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(
    name = "feedvane",
    about = "Feed aggregation engine with per-source favicon caching"
)]
struct Args {
    /// Configuration file (default: ~/.config/feedvane/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the icon cache directory
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Run a single poll cycle, print the result store as JSON, and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = Config::load(&config_path).context("Failed to load configuration")?;

    if config.sources.is_empty() {
        eprintln!("No sources configured.");
        eprintln!();
        eprintln!("Add feed URLs to {}:", config_path.display());
        eprintln!("  sources = [\"https://example.com/feed.xml\"]");
        std::process::exit(1);
    }

    let mut sources = Vec::new();
    for raw in &config.sources {
        match normalize_source_url(raw) {
            Ok(url) => sources.push(url.to_string()),
            Err(e) => tracing::warn!(source = %raw, error = %e, "skipping invalid source"),
        }
    }
    if sources.is_empty() {
        anyhow::bail!("no valid sources in configuration");
    }

    let cache_dir = args
        .cache_dir
        .or_else(|| config.cache_dir.clone())
        .or_else(IconStore::default_dir)
        .context("could not determine a cache directory (set cache_dir in the config)")?;

    let store = MemoryStore::new();
    let engine = SourceEngine::new(store.clone(), IconStore::new(cache_dir))
        .context("Failed to build HTTP client")?
        .with_icon_ttl(config.icon_ttl());

    if args.once {
        let mut engine = engine;
        for source in &sources {
            engine.request_source(source);
        }
        engine.run_until_idle().await;
        println!("{}", serde_json::to_string_pretty(&store.snapshot())?);
        return Ok(());
    }

    let (handle, commands) = EngineHandle::channel();
    let engine_task = tokio::spawn(engine.run(commands));

    for source in &sources {
        handle.request(source.clone()).await;
    }

    let mut ticker = tokio::time::interval(config.poll_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await; // first tick fires immediately; sources were just requested

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tracing::info!(sources = sources.len(), "poll cycle");
                for source in &sources {
                    handle.update(source.clone()).await;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    // Dropping the last handle lets the engine drain and stop
    drop(handle);
    let _ = engine_task.await;
    println!("Goodbye!");
    Ok(())
}
