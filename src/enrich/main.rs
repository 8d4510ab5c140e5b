//! Postcard enrichment run.
//!
//! Fetches every LIDO record in the configured id range, locates the accepted
//! postcards on the city map and writes the JSON markers and the failure log.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use placemark::archive::{ArchiveClient, RecordFilter};
use placemark::config::{Config, NearbySource};
use placemark::dataset::CityDataset;
use placemark::geocoder::{LocalFeatures, NearbyFeatures, NominatimClient, OverpassClient};
use placemark::output::{write_failures, write_results};
use placemark::pipeline::Pipeline;
use placemark::resolver::{BufferSchedule, BufferStrategy, TieredResolver};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "enrich")]
#[command(about = "Locate archive postcards on an OSM city map")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// OSM PBF extract of the city
    #[arg(long)]
    pbf: Option<PathBuf>,

    /// First record number
    #[arg(long)]
    from: Option<u32>,

    /// Last record number
    #[arg(long)]
    to: Option<u32>,

    /// JSON result file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Failure log
    #[arg(long)]
    errors: Option<PathBuf>,

    /// Buffer search strategy
    #[arg(long, value_enum)]
    strategy: Option<BufferStrategy>,

    /// Source of features around geocoded points
    #[arg(long, value_enum)]
    nearby: Option<NearbySource>,

    /// Log level, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(pbf) = &self.pbf {
            config.dataset.pbf = pbf.clone();
        }
        if let Some(from) = self.from {
            config.archive.first_id = from;
        }
        if let Some(to) = self.to {
            config.archive.last_id = to;
        }
        if let Some(output) = &self.output {
            config.output.results = output.clone();
        }
        if let Some(errors) = &self.errors {
            config.output.failures = errors.clone();
        }
        if let Some(strategy) = self.strategy {
            config.buffer.strategy = strategy;
        }
        if let Some(nearby) = self.nearby {
            config.nearby.source = nearby;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("Invalid log level")?;
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let started = Instant::now();
    info!("Placemark enrichment run");

    let mut config = Config::load_or_default(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    let dataset = CityDataset::load(&config.dataset, &config.nearby)
        .context("Failed to load city dataset")?;
    info!(
        "Dataset ready: {} streets, {} named features, {} nearby features",
        dataset.streets.len(),
        dataset.features.len(),
        dataset.nearby.len()
    );

    let geocoder =
        NominatimClient::new(&config.geocoder).context("Failed to build geocoder client")?;
    let nearby = match config.nearby.source {
        NearbySource::Local => NearbyFeatures::Local(LocalFeatures::new(&dataset)),
        NearbySource::Overpass => NearbyFeatures::Overpass(
            OverpassClient::new(&config.nearby, dataset.projection)
                .context("Failed to build Overpass client")?,
        ),
    };
    let resolver = TieredResolver::new(
        &dataset,
        geocoder,
        nearby,
        &config.geocoder.city,
        config.nearby.radius,
    );

    let archive = ArchiveClient::new(&config.archive).context("Failed to build archive client")?;
    let mut pipeline = Pipeline::new(
        archive,
        RecordFilter::new(&config.filter),
        resolver,
        dataset.projection,
        BufferSchedule::from(&config.buffer),
        config.buffer.strategy,
    );

    let ids = config.archive.record_ids();
    info!(
        "Processing {} records ({}{} to {}{}), {:?} buffer search",
        ids.len(),
        config.archive.id_prefix,
        config.archive.first_id,
        config.archive.id_prefix,
        config.archive.last_id,
        config.buffer.strategy
    );
    let report = pipeline.run(&ids).await;

    write_results(&config.output.results, &report.entries)?;
    write_failures(&config.output.failures, &report.failures)?;

    info!(
        "Done in {:.1}s: {} located, {} failed",
        started.elapsed().as_secs_f64(),
        report.stats.located,
        report.stats.failed
    );
    Ok(())
}
