//! Placemark - locating historical picture postcards on a city map
//!
//! This library provides the archive client, the OSM-backed place resolver and
//! the batch pipeline shared by the `enrich` and `lookup` binaries.

pub mod archive;
pub mod config;
pub mod dataset;
pub mod geocoder;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod projection;
pub mod resolver;

pub use config::Config;
pub use models::{Failure, FailureKind, Record, ResultEntry};
pub use projection::{LocalProjection, LonLat};
