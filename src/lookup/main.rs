//! Ad-hoc place lookup against the city dataset.
//!
//! Resolves the given names (or the place names of one archive record) with
//! the same resolver the enrichment run uses and prints what matched.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use placemark::archive::{parse_record, ArchiveClient, RecordFilter, RecordSource};
use placemark::config::{Config, NearbySource};
use placemark::dataset::CityDataset;
use placemark::geocoder::{LocalFeatures, NearbyFeatures, NominatimClient, OverpassClient};
use placemark::resolver::{locate, BufferSchedule, BufferStrategy, Outcome, TieredResolver};

#[derive(Parser, Debug)]
#[command(name = "lookup")]
#[command(about = "Resolve place names against an OSM city extract")]
struct Args {
    /// Place names to intersect
    names: Vec<String>,

    /// Take the place names from this archive record instead, e.g. gm.42
    #[arg(short, long, conflicts_with = "names")]
    record: Option<String>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// OSM PBF extract of the city
    #[arg(long)]
    pbf: Option<PathBuf>,

    /// Buffer search strategy
    #[arg(long, value_enum)]
    strategy: Option<BufferStrategy>,

    /// Source of features around geocoded points
    #[arg(long, value_enum)]
    nearby: Option<NearbySource>,

    /// Log level, overridden by RUST_LOG
    #[arg(long, default_value = "warn")]
    log_level: String,
}

async fn record_places(config: &Config, id: &str) -> Result<Vec<String>> {
    let archive = ArchiveClient::new(&config.archive)?;
    let payload = archive.fetch(id).await?;
    let record = parse_record(&payload).with_context(|| format!("Unreadable record {}", id))?;

    println!("{}: {}", record.id, record.title);
    println!(
        "  type: {}, dates: {:?}..{:?}",
        record.object_type.as_deref().unwrap_or("-"),
        record.earliest_date,
        record.latest_date
    );
    if let Err(rejection) = RecordFilter::new(&config.filter).check(&record) {
        warn!("{} would be filtered out: {:?}", record.id, rejection);
    }
    Ok(record.places)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("Invalid log level")?;
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = Config::load_or_default(args.config.as_deref())?;
    if let Some(pbf) = &args.pbf {
        config.dataset.pbf = pbf.clone();
    }
    if let Some(strategy) = args.strategy {
        config.buffer.strategy = strategy;
    }
    if let Some(nearby) = args.nearby {
        config.nearby.source = nearby;
    }
    config.validate()?;

    let places = match &args.record {
        Some(id) => record_places(&config, id).await?,
        None => args.names.clone(),
    };
    if places.is_empty() {
        anyhow::bail!("No place names to look up");
    }

    let dataset = CityDataset::load(&config.dataset, &config.nearby)
        .context("Failed to load city dataset")?;
    info!("Dataset loaded");

    let geocoder = NominatimClient::new(&config.geocoder)?;
    let nearby = match config.nearby.source {
        NearbySource::Local => NearbyFeatures::Local(LocalFeatures::new(&dataset)),
        NearbySource::Overpass => {
            NearbyFeatures::Overpass(OverpassClient::new(&config.nearby, dataset.projection)?)
        }
    };
    let mut resolver = TieredResolver::new(
        &dataset,
        geocoder,
        nearby,
        &config.geocoder.city,
        config.nearby.radius,
    );

    for name in &places {
        match resolver.candidate(name).await {
            Some(candidate) => println!(
                "{:>24}  {} ({})",
                name,
                candidate.tier,
                candidate.sources.join(", ")
            ),
            None => println!("{:>24}  unresolved", name),
        }
    }

    let schedule = BufferSchedule::from(&config.buffer);
    let outcome = locate(&mut resolver, &places, &schedule, config.buffer.strategy).await;
    match outcome {
        Outcome::Located {
            point,
            buffer,
            attempts,
        } => {
            let location = dataset.projection.point_to_lonlat(point);
            println!(
                "Located at {:.6}, {:.6} with buffer {} m ({} attempts)",
                location.lat,
                location.lon,
                buffer,
                attempts.len()
            );
        }
        Outcome::Failed {
            kind,
            buffer,
            unresolved,
            attempts,
        } => {
            println!(
                "Not located: {:?} at buffer {} m after {} attempts",
                kind,
                buffer,
                attempts.len()
            );
            if !unresolved.is_empty() {
                println!("Unresolved: {}", unresolved.join(", "));
            }
        }
    }
    Ok(())
}
