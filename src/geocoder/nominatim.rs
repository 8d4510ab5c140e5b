//! Nominatim search client.

use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use super::{GeocodeError, Geocoder};
use crate::config::GeocoderConfig;
use crate::projection::LonLat;

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: Option<String>,
}

/// Geocodes free text with Nominatim, one request at a time and never
/// faster than `min_interval`
pub struct NominatimClient {
    client: Client,
    base_url: String,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl NominatimClient {
    pub fn new(config: &GeocoderConfig) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            min_interval: Duration::from_millis(config.min_interval_ms),
            last_request: Mutex::new(None),
        })
    }

    fn search_url(&self, query: &str) -> Result<Url, GeocodeError> {
        let url = Url::parse_with_params(
            &format!("{}/search", self.base_url),
            &[("q", query), ("format", "jsonv2"), ("limit", "1")],
        )?;
        Ok(url)
    }
}

impl Geocoder for NominatimClient {
    async fn geocode(&self, query: &str) -> Result<Option<LonLat>, GeocodeError> {
        let url = self.search_url(query)?;

        // Held across the request so calls stay strictly serial
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        let response = self.client.get(url).send().await;
        *last = Some(Instant::now());
        drop(last);

        let response = response?;
        if !response.status().is_success() {
            return Err(GeocodeError::Status(response.status()));
        }

        let hits: Vec<SearchHit> = response.json().await?;
        let Some(hit) = hits.into_iter().next() else {
            debug!("Nominatim: no hit for {:?}", query);
            return Ok(None);
        };

        let lat: f64 = hit
            .lat
            .parse()
            .map_err(|_| GeocodeError::Response(format!("bad latitude {:?}", hit.lat)))?;
        let lon: f64 = hit
            .lon
            .parse()
            .map_err(|_| GeocodeError::Response(format!("bad longitude {:?}", hit.lon)))?;

        debug!(
            "Nominatim: {:?} -> {} ({}, {})",
            query,
            hit.display_name.as_deref().unwrap_or("?"),
            lat,
            lon
        );
        Ok(Some(LonLat::new(lon, lat)))
    }
}
