//! Command line entry point.

mod deliver;
mod error;

use crate::deliver::FileDelivery;
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use plumage_cache::CacheStore;
use plumage_config::Config;
use plumage_feed::DefaultSource;
use plumage_pipeline::{Delivery, DryRun, RunOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;

#[derive(Debug, Parser)]
#[command(name = "plumage", version, about = "Deliver syndication feeds to a mailbox, exactly once")]
struct Args {
    /// Configuration file
    #[arg(short = 'f', long, default_value = "config.yml", value_name = "FILE")]
    config: PathBuf,

    /// Use this cache file instead of the configured one
    #[arg(short = 'c', long, value_name = "FILE")]
    cache: Option<PathBuf>,

    /// Directory messages are delivered into
    #[arg(short = 'o', long, default_value = ".", value_name = "DIR")]
    output: PathBuf,

    /// More verbose logging (repeat for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Mark all feeds as seen without fetching or delivering anything
    #[arg(long)]
    build_cache: bool,

    /// Log what would be delivered instead of delivering it
    #[arg(long)]
    dry_run: bool,

    /// Print a cache summary, or one feed's items, and exit
    #[arg(long, value_name = "FEED_ID", num_args = 0..=1, default_missing_value = "")]
    show_cache: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match try_main(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:?}");
            ExitCode::FAILURE
        },
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

async fn try_main(args: Args) -> Result<()> {
    let mut cfg = Config::load(&args.config).or_raise(|| ErrorKind::Config)?;
    if let Some(cache) = args.cache {
        cfg.cache_path = cache;
    }

    if let Some(feed_id) = &args.show_cache {
        return show_cache(&cfg, feed_id);
    }

    let source = Arc::new(DefaultSource::new(cfg.timeout).or_raise(|| ErrorKind::Source)?);
    let delivery: Arc<dyn Delivery> = if args.dry_run {
        Arc::new(DryRun)
    } else {
        Arc::new(FileDelivery::new(args.output))
    };
    let options = RunOptions { build_cache: args.build_cache, ..RunOptions::default() };

    plumage_pipeline::run(&cfg, source, delivery, options).await.or_raise(|| ErrorKind::Run)
}

/// Print a summary of the whole cache, or everything known about one
/// feed. Loads without migrating so an old-version file can be inspected
/// as-is.
fn show_cache(cfg: &Config, feed_id: &str) -> Result<()> {
    let store = CacheStore::load(&cfg.cache_path, false).or_raise(|| ErrorKind::Inspect)?;
    if feed_id.is_empty() {
        print!("{}", store.summary());
    } else {
        match store.feed_info(feed_id) {
            Some(info) => print!("{info}"),
            None => println!("no feed with id {feed_id} in the cache"),
        }
    }
    Ok(())
}
