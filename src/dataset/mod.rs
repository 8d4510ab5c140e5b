//! City dataset loaded from an OSM PBF extract.
//!
//! Three layers are kept, all projected into metres around the city:
//! named streets, named feature footprints, and the features the geocoder
//! fallback may pick around a point.

mod features;
mod geometry;
mod index;
mod tags;

pub use features::{normalize_name, Feature, NameIndex};
pub use geometry::{assemble_polygons, is_area, GeometryResolver};
pub use index::NearbyIndex;
pub use tags::{TagFilter, TagRule};

use anyhow::{Context, Result};
use geo::{BoundingRect, Coord, Geometry, Point, Rect};
use osmpbfreader::{Node, OsmObj, OsmPbfReader, Tags};
use std::fs::File;
use std::io::BufReader;
use tracing::{debug, info};

use crate::config::{DatasetConfig, NearbyConfig, NearbySource};
use crate::projection::{LocalProjection, LonLat};

/// Everything the resolver looks up, shared for the whole run
pub struct CityDataset {
    pub projection: LocalProjection,
    pub streets: NameIndex,
    pub features: NameIndex,
    pub nearby: NearbyIndex,
}

impl CityDataset {
    /// Assemble a dataset from features already in projected metres
    pub fn new(
        projection: LocalProjection,
        streets: Vec<Feature>,
        features: Vec<Feature>,
        nearby: Vec<Feature>,
    ) -> Self {
        Self {
            projection,
            streets: NameIndex::by_name(streets),
            features: NameIndex::by_name_or_old_name(features),
            nearby: NearbyIndex::build(nearby),
        }
    }

    pub fn load(config: &DatasetConfig, nearby_config: &NearbyConfig) -> Result<Self> {
        info!("Loading city dataset from {}", config.pbf.display());
        let file = File::open(&config.pbf)
            .with_context(|| format!("Failed to open PBF file {}", config.pbf.display()))?;
        let mut reader = OsmPbfReader::new(BufReader::new(file));

        let layers = Layers {
            feature_tags: &config.feature_tags,
            nearby_tags: (nearby_config.source == NearbySource::Local)
                .then_some(&nearby_config.tags),
        };

        let resolver = GeometryResolver::build(&mut reader, |tags| layers.any(tags))?;

        let mut streets = Vec::new();
        let mut features = Vec::new();
        let mut nearby = Vec::new();

        reader.rewind()?;
        for obj in reader.iter() {
            let obj = obj?;
            let tags = obj.tags();
            if !layers.any(tags) {
                continue;
            }

            let (source_id, geometry) = match &obj {
                OsmObj::Node(node) => {
                    // a point never contains anything, so it only serves name lookups
                    if layers.is_named_feature(tags) {
                        features.push(point_feature(node));
                    }
                    continue;
                }
                OsmObj::Way(way) => (format!("way/{}", way.id.0), resolver.resolve_way(way)),
                OsmObj::Relation(rel) if tags.contains("type", "multipolygon") => (
                    format!("relation/{}", rel.id.0),
                    resolver.resolve_relation(rel.id).map(Geometry::MultiPolygon),
                ),
                _ => continue,
            };
            let Some(geometry) = geometry else {
                debug!("Could not resolve geometry for {}", source_id);
                continue;
            };

            let feature = with_osm_names(Feature::new(source_id, geometry), tags);

            if layers.is_street(tags) {
                streets.push(feature.clone());
            }
            if layers.is_named_feature(tags) {
                features.push(feature.clone());
            }
            if layers.is_nearby(tags) {
                nearby.push(feature);
            }
        }

        info!(
            "Extracted {} streets, {} named features, {} nearby candidates",
            streets.len(),
            features.len(),
            nearby.len()
        );

        let projection = match config.origin {
            Some([lon, lat]) => LocalProjection::new(LonLat::new(lon, lat)),
            None => {
                let bounds = combined_bounds(streets.iter().chain(&features).chain(&nearby))
                    .context("Dataset contains no usable geometry")?;
                LocalProjection::centred_on(bounds)
            }
        };
        info!("Projection origin {:?}", projection.origin());

        let project = |list: Vec<Feature>| -> Vec<Feature> {
            list.into_iter()
                .map(|mut f| {
                    f.geometry = projection.project(&f.geometry);
                    f
                })
                .collect()
        };

        Ok(Self::new(
            projection,
            project(streets),
            project(features),
            project(nearby),
        ))
    }
}

/// Which layer an OSM object belongs to
struct Layers<'a> {
    feature_tags: &'a TagFilter,
    nearby_tags: Option<&'a TagFilter>,
}

impl Layers<'_> {
    fn is_street(&self, tags: &Tags) -> bool {
        tags.contains_key("highway") && tags.contains_key("name")
    }

    fn is_named_feature(&self, tags: &Tags) -> bool {
        (tags.contains_key("name") || tags.contains_key("old_name"))
            && self.feature_tags.matches_osm(tags)
    }

    fn is_nearby(&self, tags: &Tags) -> bool {
        self.nearby_tags.map_or(false, |f| f.matches_osm(tags))
    }

    fn any(&self, tags: &Tags) -> bool {
        self.is_street(tags) || self.is_named_feature(tags) || self.is_nearby(tags)
    }
}

fn with_osm_names(mut feature: Feature, tags: &Tags) -> Feature {
    feature.name = tags.get("name").map(|v| v.to_string());
    feature.old_name = tags.get("old_name").map(|v| v.to_string());
    feature
}

/// A tagged node as a lon/lat point feature
fn point_feature(node: &Node) -> Feature {
    let point = Point::new(node.lon(), node.lat());
    with_osm_names(Feature::new(format!("node/{}", node.id.0), point.into()), &node.tags)
}

fn combined_bounds<'a>(features: impl Iterator<Item = &'a Feature>) -> Option<Rect<f64>> {
    features
        .filter_map(|f| f.geometry.bounding_rect())
        .reduce(|a, b| {
            Rect::new(
                Coord {
                    x: a.min().x.min(b.min().x),
                    y: a.min().y.min(b.min().y),
                },
                Coord {
                    x: a.max().x.max(b.max().x),
                    y: a.max().y.max(b.max().y),
                },
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point};
    use osmpbfreader::NodeId;

    #[test]
    fn test_combined_bounds() {
        let line = line_string![(x: 15.40, y: 47.05), (x: 15.42, y: 47.06)];
        let a = Feature::new("way/1", line.into());
        let p: Point<f64> = point!(x: 15.45, y: 47.09);
        let b = Feature::new("node/2", p.into());
        let bounds = combined_bounds([a, b].iter()).unwrap();
        assert_eq!(bounds.min(), Coord { x: 15.40, y: 47.05 });
        assert_eq!(bounds.max(), Coord { x: 15.45, y: 47.09 });
    }

    #[test]
    fn test_named_node_becomes_point_feature() {
        let mut tags = Tags::new();
        tags.insert("historic".into(), "memorial".into());
        tags.insert("name".into(), "Erzherzog-Johann-Brunnen".into());
        tags.insert("old_name".into(), "Hauptplatzbrunnen".into());
        let node = Node {
            id: NodeId(42),
            tags,
            decimicro_lat: 470_710_000,
            decimicro_lon: 154_380_000,
        };

        let layers = Layers {
            feature_tags: &TagFilter::named_features(),
            nearby_tags: None,
        };
        assert!(layers.is_named_feature(&node.tags));

        let feature = point_feature(&node);
        assert_eq!(feature.source_id, "node/42");
        assert_eq!(feature.name.as_deref(), Some("Erzherzog-Johann-Brunnen"));
        assert_eq!(feature.old_name.as_deref(), Some("Hauptplatzbrunnen"));
        let Geometry::Point(p) = feature.geometry else {
            panic!("expected a point");
        };
        assert!((p.x() - 15.438).abs() < 1e-9);
        assert!((p.y() - 47.071).abs() < 1e-9);
    }

    #[test]
    fn test_layers() {
        let named = TagFilter::named_features();
        let nearby = TagFilter::nearby_features();
        let layers = Layers {
            feature_tags: &named,
            nearby_tags: Some(&nearby),
        };

        let mut street = Tags::new();
        street.insert("highway".into(), "residential".into());
        street.insert("name".into(), "Annenstraße".into());
        assert!(layers.is_street(&street));
        assert!(!layers.is_named_feature(&street));
        assert!(layers.is_nearby(&street));

        let mut school = Tags::new();
        school.insert("amenity".into(), "school".into());
        school.insert("name".into(), "Volksschule".into());
        assert!(!layers.any(&school));

        let offline = Layers {
            feature_tags: &named,
            nearby_tags: None,
        };
        let mut anonymous = Tags::new();
        anonymous.insert("building".into(), "yes".into());
        assert!(!offline.any(&anonymous));
        assert!(layers.any(&anonymous));
    }
}
