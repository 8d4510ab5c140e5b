//! Overpass API as a live source of nearby features.

use geo::{Coord, Geometry, LineString, MultiPolygon, Polygon};
use osmpbfreader::Tags;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{FeatureSource, GeocodeError};
use crate::config::NearbyConfig;
use crate::dataset::{assemble_polygons, is_area, Feature, TagFilter};
use crate::projection::{LocalProjection, LonLat};

#[derive(Debug, Deserialize)]
pub struct OverpassResponse {
    pub elements: Vec<Element>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Element {
    Node {
        id: i64,
    },
    Way {
        id: i64,
        #[serde(default)]
        tags: HashMap<String, String>,
        #[serde(default)]
        geometry: Vec<LatLon>,
    },
    Relation {
        id: i64,
        #[serde(default)]
        tags: HashMap<String, String>,
        #[serde(default)]
        members: Vec<Member>,
    },
}

#[derive(Debug, Deserialize)]
pub struct Member {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub geometry: Vec<LatLon>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

fn coords(points: &[LatLon]) -> Vec<Coord<f64>> {
    points.iter().map(|p| Coord { x: p.lon, y: p.lat }).collect()
}

fn to_tags(map: &HashMap<String, String>) -> Tags {
    let mut tags = Tags::new();
    for (k, v) in map {
        tags.insert(k.as_str().into(), v.as_str().into());
    }
    tags
}

/// Turn an `out geom` response into projected features. Nodes are dropped,
/// a point never contains another point.
pub fn features_from_response(
    response: OverpassResponse,
    projection: &LocalProjection,
) -> Vec<Feature> {
    let mut features = Vec::new();
    for element in response.elements {
        let (source_id, tags, geometry) = match element {
            Element::Node { .. } => continue,
            Element::Way { id, tags, geometry } => {
                let ring = coords(&geometry);
                if ring.len() < 2 {
                    continue;
                }
                let osm_tags = to_tags(&tags);
                let closed = ring.len() >= 4 && ring.first() == ring.last();
                let geometry: Geometry<f64> = if closed && is_area(&osm_tags) {
                    Polygon::new(LineString::new(ring), vec![]).into()
                } else {
                    LineString::new(ring).into()
                };
                (format!("way/{}", id), tags, geometry)
            }
            Element::Relation { id, tags, members } => {
                let rings = |outer: bool| -> Vec<Vec<Coord<f64>>> {
                    members
                        .iter()
                        .filter(|m| m.kind == "way")
                        .filter(|m| match m.role.as_str() {
                            "outer" | "" => outer,
                            "inner" => !outer,
                            _ => false,
                        })
                        .map(|m| coords(&m.geometry))
                        .filter(|r| r.len() >= 2)
                        .collect()
                };
                let polygons = assemble_polygons(rings(true), rings(false));
                if polygons.is_empty() {
                    continue;
                }
                (
                    format!("relation/{}", id),
                    tags,
                    MultiPolygon::new(polygons).into(),
                )
            }
        };

        let mut feature = Feature::new(source_id, projection.project(&geometry));
        feature.name = tags.get("name").cloned();
        feature.old_name = tags.get("old_name").cloned();
        features.push(feature);
    }
    features
}

/// Build the Overpass QL query for a bounding box `(south, west, north, east)`
pub fn build_query(filter: &TagFilter, bbox: [f64; 4], timeout_secs: u64) -> String {
    let [south, west, north, east] = bbox;
    let area = format!("({},{},{},{})", south, west, north, east);
    let mut query = format!("[out:json][timeout:{}];\n(\n", timeout_secs);
    for rule in filter.rules() {
        let selector = if rule.values.is_empty() {
            format!("[\"{}\"]", rule.key)
        } else {
            format!("[\"{}\"~\"^({})$\"]", rule.key, rule.values.join("|"))
        };
        query.push_str(&format!("  way{}{};\n", selector, area));
        query.push_str(&format!("  relation{}{};\n", selector, area));
    }
    query.push_str(");\nout geom;\n");
    query
}

/// Queries tagged features around a point from a live Overpass endpoint
pub struct OverpassClient {
    client: Client,
    url: String,
    tags: TagFilter,
    timeout_secs: u64,
    projection: LocalProjection,
}

impl OverpassClient {
    pub fn new(config: &NearbyConfig, projection: LocalProjection) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .user_agent(concat!("placemark/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.overpass_url.clone(),
            tags: config.tags.clone(),
            timeout_secs: config.timeout_secs,
            projection,
        })
    }
}

/// Square of half-width `radius` metres around `center`
fn bbox_around(center: LonLat, radius: f64) -> [f64; 4] {
    let local = LocalProjection::new(center);
    let sw = local.to_lonlat(Coord {
        x: -radius,
        y: -radius,
    });
    let ne = local.to_lonlat(Coord {
        x: radius,
        y: radius,
    });
    [sw.lat, sw.lon, ne.lat, ne.lon]
}

impl FeatureSource for OverpassClient {
    async fn features_around(
        &self,
        center: LonLat,
        radius: f64,
    ) -> Result<Vec<Arc<Feature>>, GeocodeError> {
        let query = build_query(&self.tags, bbox_around(center, radius), self.timeout_secs);
        let url = url::Url::parse_with_params(&self.url, &[("data", query.as_str())])?;

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(GeocodeError::Status(response.status()));
        }
        let body: OverpassResponse = response.json().await?;
        let features = features_from_response(body, &self.projection);
        debug!(
            "Overpass: {} features around ({}, {})",
            features.len(),
            center.lon,
            center.lat
        );
        Ok(features.into_iter().map(Arc::new).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Contains, Point};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ORIGIN: LonLat = LonLat {
        lon: 15.44,
        lat: 47.07,
    };

    const SAMPLE: &str = r#"{
        "elements": [
            {"type": "node", "id": 1, "lat": 47.07, "lon": 15.44},
            {"type": "way", "id": 10, "tags": {"building": "yes", "name": "Landhaus"},
             "geometry": [
                {"lat": 47.0695, "lon": 15.4395}, {"lat": 47.0695, "lon": 15.4405},
                {"lat": 47.0705, "lon": 15.4405}, {"lat": 47.0705, "lon": 15.4395},
                {"lat": 47.0695, "lon": 15.4395}
             ]},
            {"type": "way", "id": 11, "tags": {"highway": "footway"},
             "geometry": [{"lat": 47.071, "lon": 15.44}, {"lat": 47.072, "lon": 15.44}]},
            {"type": "relation", "id": 20, "tags": {"landuse": "cemetery", "type": "multipolygon"},
             "members": [
                {"type": "way", "ref": 1, "role": "outer",
                 "geometry": [{"lat": 47.08, "lon": 15.45}, {"lat": 47.08, "lon": 15.46}, {"lat": 47.09, "lon": 15.46}]},
                {"type": "way", "ref": 2, "role": "outer",
                 "geometry": [{"lat": 47.09, "lon": 15.46}, {"lat": 47.09, "lon": 15.45}, {"lat": 47.08, "lon": 15.45}]},
                {"type": "way", "ref": 3, "role": "inner",
                 "geometry": [{"lat": 47.084, "lon": 15.454}, {"lat": 47.084, "lon": 15.456},
                              {"lat": 47.086, "lon": 15.456}, {"lat": 47.086, "lon": 15.454},
                              {"lat": 47.084, "lon": 15.454}]}
             ]}
        ]
    }"#;

    #[test]
    fn test_features_from_response() {
        let projection = LocalProjection::new(ORIGIN);
        let response: OverpassResponse = serde_json::from_str(SAMPLE).unwrap();
        let features = features_from_response(response, &projection);
        let ids: Vec<&str> = features.iter().map(|f| f.source_id.as_str()).collect();
        assert_eq!(ids, vec!["way/10", "way/11", "relation/20"]);

        let landhaus = &features[0];
        assert_eq!(landhaus.name.as_deref(), Some("Landhaus"));
        assert!(matches!(landhaus.geometry, Geometry::Polygon(_)));
        // the origin sits inside the building, in projected metres
        assert!(landhaus.geometry.contains(&Point::new(0.0, 0.0)));

        assert!(matches!(features[1].geometry, Geometry::LineString(_)));
        let Geometry::MultiPolygon(cemetery) = &features[2].geometry else {
            panic!("expected a multipolygon");
        };
        assert_eq!(cemetery.0.len(), 1);
        assert_eq!(cemetery.0[0].interiors().len(), 1);
        let at = |lon, lat| Point::from(projection.to_metres(LonLat::new(lon, lat)));
        assert!(cemetery.contains(&at(15.452, 47.082)));
        // the inner ring is a hole
        assert!(!cemetery.contains(&at(15.455, 47.085)));
    }

    #[test]
    fn test_query_lists_every_rule() {
        let query = build_query(&TagFilter::nearby_features(), [47.0, 15.0, 47.1, 15.1], 25);
        assert!(query.starts_with("[out:json][timeout:25];"));
        assert!(query.contains("way[\"building\"](47,15,47.1,15.1);"));
        assert!(query.contains("relation[\"landuse\"~\"^(cemetery|forest)$\"](47,15,47.1,15.1);"));
        assert!(query.ends_with("out geom;\n"));
    }

    #[test]
    fn test_bbox_around() {
        let [south, west, north, east] = bbox_around(ORIGIN, 100.0);
        assert!(south < ORIGIN.lat && north > ORIGIN.lat);
        assert!(west < ORIGIN.lon && east > ORIGIN.lon);
        let height = LonLat::new(ORIGIN.lon, south).distance_m(LonLat::new(ORIGIN.lon, north));
        assert!((height - 200.0).abs() < 0.5);
    }

    #[tokio::test]
    async fn test_features_around_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE))
            .mount(&server)
            .await;

        let config = NearbyConfig {
            overpass_url: format!("{}/api/interpreter", server.uri()),
            ..NearbyConfig::default()
        };
        let client = OverpassClient::new(&config, LocalProjection::new(ORIGIN)).unwrap();
        let features = client.features_around(ORIGIN, 100.0).await.unwrap();
        assert_eq!(features.len(), 3);
    }
}
