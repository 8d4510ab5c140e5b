//! External lookups for the third resolver tier: a text geocoder and a
//! source of tagged features around the point it returns.

mod nominatim;
mod overpass;

pub use nominatim::NominatimClient;
pub use overpass::{features_from_response, OverpassClient, OverpassResponse};

use reqwest::StatusCode;
use std::sync::Arc;
use thiserror::Error;

use crate::dataset::{CityDataset, Feature};
use crate::projection::LonLat;

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("unusable response: {0}")]
    Response(String),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

/// Free-text place lookup returning at most one point
#[allow(async_fn_in_trait)]
pub trait Geocoder {
    async fn geocode(&self, query: &str) -> Result<Option<LonLat>, GeocodeError>;
}

impl<G: Geocoder> Geocoder for &G {
    async fn geocode(&self, query: &str) -> Result<Option<LonLat>, GeocodeError> {
        (**self).geocode(query).await
    }
}

/// Tagged features near a point, geometry in the dataset's projected metres
#[allow(async_fn_in_trait)]
pub trait FeatureSource {
    async fn features_around(
        &self,
        center: LonLat,
        radius: f64,
    ) -> Result<Vec<Arc<Feature>>, GeocodeError>;
}

/// Serves nearby features from the loaded extract
pub struct LocalFeatures<'a> {
    dataset: &'a CityDataset,
}

impl<'a> LocalFeatures<'a> {
    pub fn new(dataset: &'a CityDataset) -> Self {
        Self { dataset }
    }
}

impl FeatureSource for LocalFeatures<'_> {
    async fn features_around(
        &self,
        center: LonLat,
        radius: f64,
    ) -> Result<Vec<Arc<Feature>>, GeocodeError> {
        let center = self.dataset.projection.to_metres(center);
        Ok(self.dataset.nearby.around(center, radius))
    }
}

/// Either nearby source, picked from configuration
pub enum NearbyFeatures<'a> {
    Local(LocalFeatures<'a>),
    Overpass(OverpassClient),
}

impl FeatureSource for NearbyFeatures<'_> {
    async fn features_around(
        &self,
        center: LonLat,
        radius: f64,
    ) -> Result<Vec<Arc<Feature>>, GeocodeError> {
        match self {
            NearbyFeatures::Local(local) => local.features_around(center, radius).await,
            NearbyFeatures::Overpass(client) => client.features_around(center, radius).await,
        }
    }
}
