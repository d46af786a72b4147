//! Foresight CLI
//!
//! Use `optimise -f <set>` to source a fixture basket, or pass `--prices` and
//! `--basket` files to source a basket against an uploaded price sheet.
//! Use `ingest <file>` to validate a price sheet and preview trader prices.
//! Use `publish --by <name> <files>...` to publish sheets as snapshots in order.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use humanize_duration::{Truncate, prelude::DurationExt};
use tabled::{
    builder::Builder,
    settings::{Color, Style, object::Rows},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use foresight::{
    basket::DemandLine,
    config::Settings,
    fixtures::{Fixture, baskets::read_basket},
    ingest::{SheetFormat, SheetUpload, read_sheet},
    offers::{PriceOffer, PriceTable},
    optimiser::Optimiser,
    pricing::{apply_margins, write_price_list},
    snapshots::{InMemorySnapshotStore, SnapshotMeta, SnapshotStore},
    tiers::TierTable,
};

/// Supplier price snapshots and lowest-cost basket sourcing
#[derive(Debug, Parser)]
#[command(name = "foresight", version)]
struct Cli {
    /// Settings file (YAML); defaults apply when omitted
    #[arg(short, long, global = true, env = "FORESIGHT_SETTINGS")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Find the lowest-cost supplier allocation for a basket
    Optimise(OptimiseArgs),

    /// Validate a price sheet and preview trader prices
    Ingest {
        /// Price sheet (.xlsx or .csv)
        file: PathBuf,

        /// Only show offers matching this text
        #[arg(short = 'q', long)]
        search: Option<String>,
    },

    /// Publish price sheets as snapshots and list the history
    Publish(PublishArgs),
}

#[derive(Debug, Args)]
struct OptimiseArgs {
    /// Fixture set to load offers, tiers and basket from
    #[arg(short, long, conflicts_with_all = ["prices", "basket"])]
    fixture: Option<String>,

    /// Price sheet (.xlsx or .csv)
    #[arg(short, long, requires = "basket")]
    prices: Option<PathBuf>,

    /// Basket file (YAML)
    #[arg(short, long, requires = "prices")]
    basket: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct PublishArgs {
    /// Who is publishing
    #[arg(long = "by")]
    published_by: String,

    /// Price sheets to publish, oldest first
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Optimise this basket against the latest snapshot
    #[arg(short, long)]
    basket: Option<PathBuf>,

    /// Number of snapshots to list
    #[arg(short, long, default_value_t = 10)]
    limit: usize,
}

/// Foresight CLI
#[expect(clippy::print_stdout, reason = "CLI output")]
pub fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => Settings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };

    let stdout = io::stdout();
    let mut handle = stdout.lock();

    let elapsed = match cli.command {
        Command::Optimise(args) => optimise(&mut handle, &settings, &args)?,
        Command::Ingest { file, search } => {
            ingest(&mut handle, &settings, &file, search.as_deref().unwrap_or_default())?
        }
        Command::Publish(args) => publish(&mut handle, &settings, &args)?,
    };

    println!("\nElapsed: {}", elapsed.human(Truncate::Nano));

    Ok(())
}

fn read_upload(path: &Path) -> Result<(SheetUpload, Vec<u8>)> {
    let format = SheetFormat::from_path(path)?;
    let source = fs::read(path).with_context(|| format!("reading {}", path.display()))?;

    let upload = read_sheet(&source, format)
        .with_context(|| format!("validating {}", path.display()))?;

    Ok((upload, source))
}

fn optimise(out: &mut impl Write, settings: &Settings, args: &OptimiseArgs) -> Result<Duration> {
    let (prices, tiers, lines) = match (&args.fixture, &args.prices, &args.basket) {
        (Some(set), _, _) => {
            let fixture = Fixture::from_set(set)?;

            (fixture.price_table()?, fixture.tier_table(), fixture.lines().to_vec())
        }
        (None, Some(prices), Some(basket)) => {
            let (upload, _source) = read_upload(prices)?;

            (
                PriceTable::new(upload.offers, settings.currency())?,
                settings.tier_table(),
                read_basket(basket)?,
            )
        }
        _ => anyhow::bail!("pass either --fixture or both --prices and --basket"),
    };

    run_optimiser(out, settings, &lines, &prices, &tiers)
}

fn run_optimiser(
    out: &mut impl Write,
    settings: &Settings,
    lines: &[DemandLine],
    prices: &PriceTable,
    tiers: &TierTable,
) -> Result<Duration> {
    let optimiser = Optimiser::with_config(settings.optimiser_config());

    let start = Instant::now();
    let allocation = optimiser.optimise(lines, prices, tiers)?;
    let elapsed = start.elapsed();

    allocation.write_to(out)?;

    writeln!(
        out,
        " Suppliers: {}  Subsets evaluated: {}",
        allocation.suppliers().join(", "),
        allocation.subsets_evaluated()
    )?;

    Ok(elapsed)
}

fn ingest(out: &mut impl Write, settings: &Settings, path: &Path, search: &str) -> Result<Duration> {
    let start = Instant::now();
    let (upload, _source) = read_upload(path)?;
    let table = PriceTable::new(upload.offers, settings.currency())?;
    let elapsed = start.elapsed();

    let shown: Vec<PriceOffer> = table.search(search).into_iter().cloned().collect();
    let prices = apply_margins(&shown, settings.margins());

    write_price_list(out, &prices, settings.currency())?;

    writeln!(out, " Rows: {} of {}", shown.len(), table.len())?;
    writeln!(out, " Products: {}", table.products().join(", "))?;
    writeln!(out, " SHA-256: {}", upload.source_hash)?;

    Ok(elapsed)
}

fn publish(out: &mut impl Write, settings: &Settings, args: &PublishArgs) -> Result<Duration> {
    let store = InMemorySnapshotStore::new();
    let start = Instant::now();

    for path in &args.files {
        let (upload, source) = read_upload(path)?;

        let meta = store.publish(upload.offers, settings.currency(), &args.published_by, &source)?;

        info!(snapshot_id = %meta.id, file = %path.display(), "published price sheet");
    }

    let mut elapsed = start.elapsed();

    write_history(out, &store.list(args.limit)?)?;

    if let Some(basket) = &args.basket {
        let latest = store
            .latest()?
            .context("no snapshot has been published")?;

        let prices = store.prices(latest.id)?;

        writeln!(out, " Sourcing against snapshot {}", latest.id)?;

        elapsed += run_optimiser(
            out,
            settings,
            &read_basket(basket)?,
            &prices,
            &settings.tier_table(),
        )?;
    }

    Ok(elapsed)
}

fn write_history(out: &mut impl Write, history: &[SnapshotMeta]) -> Result<()> {
    let mut builder = Builder::default();

    builder.push_record(["Snapshot", "Published", "By", "Rows", "Source"]);

    for meta in history {
        builder.push_record([
            meta.id.to_string(),
            meta.published_at.to_string(),
            meta.published_by.clone(),
            meta.row_count.to_string(),
            meta.source_hash.get(..12).unwrap_or(&meta.source_hash).to_string(),
        ]);
    }

    let mut table = builder.build();

    table.with(Style::modern_rounded());
    table.modify(Rows::first(), Color::BOLD);

    writeln!(out, "\n{table}")?;

    Ok(())
}
