//! Run configuration.
//!
//! Every field has a default matching the Graz postcard run, so a config file
//! only needs to name what differs.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::dataset::TagFilter;
use crate::resolver::BufferStrategy;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub archive: ArchiveConfig,
    pub filter: FilterConfig,
    pub dataset: DatasetConfig,
    pub geocoder: GeocoderConfig,
    pub nearby: NearbyConfig,
    pub buffer: BufferConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ArchiveConfig {
    /// URL with an `{id}` placeholder
    pub url_template: String,
    pub id_prefix: String,
    pub first_id: u32,
    pub last_id: u32,
    pub timeout_secs: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            url_template:
                "https://gams.uni-graz.at/archive/objects/o:{id}/datastreams/LIDO_SOURCE/content"
                    .to_string(),
            id_prefix: "gm.".to_string(),
            first_id: 1,
            last_id: 8820,
            timeout_secs: 20,
        }
    }
}

impl ArchiveConfig {
    /// Record ids in processing order
    pub fn record_ids(&self) -> Vec<String> {
        (self.first_id..=self.last_id)
            .map(|n| format!("{}{}", self.id_prefix, n))
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FilterConfig {
    pub accepted_object_type: String,
    pub excluded_decor: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            accepted_object_type: "Ansichtspostkarte".to_string(),
            excluded_decor: "Mehrbildkarte".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatasetConfig {
    /// OSM PBF extract of the city
    pub pbf: PathBuf,
    /// Projection origin as `[lon, lat]`; the extract's centre when unset
    pub origin: Option<[f64; 2]>,
    /// Tags selecting named features for the footprint tier
    pub feature_tags: TagFilter,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            pbf: PathBuf::from("graz.osm.pbf"),
            origin: None,
            feature_tags: TagFilter::named_features(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GeocoderConfig {
    pub url: String,
    /// Appended to every query as `"{name}, {city}"`
    pub city: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Minimum pause between two requests
    pub min_interval_ms: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            url: "https://nominatim.openstreetmap.org".to_string(),
            city: "Graz".to_string(),
            user_agent: concat!("placemark/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 10,
            min_interval_ms: 1000,
        }
    }
}

/// Where the geocoder fallback looks for features around its point
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NearbySource {
    #[default]
    Local,
    Overpass,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NearbyConfig {
    pub source: NearbySource,
    /// Search radius around a geocoded point, metres
    pub radius: f64,
    pub tags: TagFilter,
    pub overpass_url: String,
    pub timeout_secs: u64,
}

impl Default for NearbyConfig {
    fn default() -> Self {
        Self {
            source: NearbySource::Local,
            radius: 100.0,
            tags: TagFilter::nearby_features(),
            overpass_url: "https://overpass-api.de/api/interpreter".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BufferConfig {
    pub min: f64,
    pub step: f64,
    pub max: f64,
    pub strategy: BufferStrategy,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            min: 10.0,
            step: 10.0,
            max: 100.0,
            strategy: BufferStrategy::Linear,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub results: PathBuf,
    pub failures: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results: PathBuf::from("marker_graz_osm.json"),
            failures: PathBuf::from("marker_graz_osm_errors.txt"),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let b = &self.buffer;
        if !(b.min > 0.0 && b.step > 0.0 && b.max >= b.min) {
            anyhow::bail!(
                "invalid buffer range: min={} step={} max={}",
                b.min,
                b.step,
                b.max
            );
        }
        if !self.archive.url_template.contains("{id}") {
            anyhow::bail!("archive.url_template must contain an {{id}} placeholder");
        }
        if self.archive.first_id > self.archive.last_id {
            anyhow::bail!(
                "archive id range is empty: {}..={}",
                self.archive.first_id,
                self.archive.last_id
            );
        }
        Ok(())
    }
}
