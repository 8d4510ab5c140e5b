//! Place-name resolution: streets, then named features, then the geocoder.

use geo::{BooleanOps, Buffer, Contains, Geometry, MultiPolygon, Point};
use hashbrown::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, warn};

use crate::dataset::{normalize_name, CityDataset, Feature};
use crate::geocoder::{FeatureSource, GeocodeError, Geocoder};

/// Something that turns a place name into a buffered polygon
#[allow(async_fn_in_trait)]
pub trait PlaceResolver {
    async fn resolve(&mut self, name: &str, buffer: f64) -> Option<MultiPolygon<f64>>;

    /// Called before the names of a new place set are resolved
    fn begin_lookup(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Street,
    Feature,
    Geocoded,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Street => write!(f, "street"),
            Tier::Feature => write!(f, "feature"),
            Tier::Geocoded => write!(f, "geocoded"),
        }
    }
}

/// Unbuffered geometry found for a name, in projected metres
#[derive(Debug, Clone)]
pub struct Candidate {
    pub tier: Tier,
    pub sources: Vec<String>,
    pub geometries: Vec<Geometry<f64>>,
}

impl Candidate {
    fn from_features<'f>(tier: Tier, features: impl IntoIterator<Item = &'f Feature>) -> Self {
        let (sources, geometries) = features
            .into_iter()
            .map(|f| (f.source_id.clone(), f.geometry.clone()))
            .unzip();
        Self {
            tier,
            sources,
            geometries,
        }
    }

    /// Union of all geometries grown by `radius`
    pub fn buffered(&self, radius: f64) -> MultiPolygon<f64> {
        buffer_union(&self.geometries, radius)
    }
}

/// Buffer each geometry and union the results
pub fn buffer_union(geometries: &[Geometry<f64>], radius: f64) -> MultiPolygon<f64> {
    geometries
        .iter()
        .map(|g| g.buffer(radius))
        .reduce(|acc, next| acc.union(&next))
        .unwrap_or_else(|| MultiPolygon::new(vec![]))
}

/// Three-tier resolver over a loaded dataset.
///
/// Tier results are cached per normalized name for the whole run, so the
/// buffer sweep never repeats a geocoder round-trip. Names whose lookup hit
/// a transport error are only skipped until the next place set.
pub struct TieredResolver<'a, G, S> {
    dataset: &'a CityDataset,
    geocoder: G,
    nearby: S,
    city: String,
    search_radius: f64,
    cache: HashMap<String, Option<Candidate>>,
    failed: HashSet<String>,
}

impl<'a, G: Geocoder, S: FeatureSource> TieredResolver<'a, G, S> {
    pub fn new(
        dataset: &'a CityDataset,
        geocoder: G,
        nearby: S,
        city: &str,
        search_radius: f64,
    ) -> Self {
        Self {
            dataset,
            geocoder,
            nearby,
            city: city.to_string(),
            search_radius,
            cache: HashMap::new(),
            failed: HashSet::new(),
        }
    }

    /// The unbuffered geometry a name resolves to, if any
    pub async fn candidate(&mut self, name: &str) -> Option<&Candidate> {
        let key = normalize_name(name);
        if !self.cache.contains_key(&key) && !self.failed.contains(&key) {
            match self.find(name).await {
                Ok(found) => {
                    match &found {
                        Some(c) => debug!("{:?} resolved via {} ({:?})", name, c.tier, c.sources),
                        None => debug!("{:?} not resolved", name),
                    }
                    self.cache.insert(key.clone(), found);
                }
                Err(e) => {
                    warn!("Lookup of {:?} failed, retried with the next record: {}", name, e);
                    self.failed.insert(key.clone());
                }
            }
        }
        self.cache.get(&key)?.as_ref()
    }

    /// `Ok(None)` means no tier knows the name; `Err` that tier 3 could not be asked
    async fn find(&self, name: &str) -> Result<Option<Candidate>, GeocodeError> {
        let streets = self.dataset.streets.lookup(name);
        if !streets.is_empty() {
            return Ok(Some(Candidate::from_features(Tier::Street, streets)));
        }

        let features = self.dataset.features.lookup(name);
        if !features.is_empty() {
            return Ok(Some(Candidate::from_features(Tier::Feature, features)));
        }

        self.find_geocoded(name).await
    }

    async fn find_geocoded(&self, name: &str) -> Result<Option<Candidate>, GeocodeError> {
        let query = format!("{}, {}", name.trim(), self.city);
        let Some(location) = self.geocoder.geocode(&query).await? else {
            return Ok(None);
        };
        let around = self
            .nearby
            .features_around(location, self.search_radius)
            .await?;

        let point = Point::from(self.dataset.projection.to_metres(location));
        let containing: Vec<&Feature> = around
            .iter()
            .map(|f| f.as_ref())
            .filter(|f| f.geometry.contains(&point))
            .collect();
        if containing.is_empty() {
            debug!(
                "{:?} geocoded, but none of {} nearby features contains the point",
                name,
                around.len()
            );
            return Ok(None);
        }
        Ok(Some(Candidate::from_features(Tier::Geocoded, containing)))
    }
}

impl<G: Geocoder, S: FeatureSource> PlaceResolver for TieredResolver<'_, G, S> {
    async fn resolve(&mut self, name: &str, buffer: f64) -> Option<MultiPolygon<f64>> {
        let candidate = self.candidate(name).await?;
        Some(candidate.buffered(buffer))
    }

    fn begin_lookup(&mut self) {
        self.failed.clear();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::geocoder::{GeocodeError, LocalFeatures};
    use crate::projection::{LocalProjection, LonLat};
    use geo::{line_string, polygon, Area};
    use std::cell::Cell;
    use std::collections::HashMap as StdHashMap;

    pub(crate) const ORIGIN: LonLat = LonLat {
        lon: 15.4395,
        lat: 47.0707,
    };

    /// Geocoder answering from a fixed table, counting its calls
    #[derive(Default)]
    pub(crate) struct TableGeocoder {
        pub hits: StdHashMap<String, LonLat>,
        pub calls: Cell<usize>,
    }

    impl TableGeocoder {
        pub(crate) fn with(mut self, query: &str, at: LonLat) -> Self {
            self.hits.insert(query.to_string(), at);
            self
        }
    }

    impl Geocoder for TableGeocoder {
        async fn geocode(&self, query: &str) -> Result<Option<LonLat>, GeocodeError> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.hits.get(query).copied())
        }
    }

    /// A square of side `2 * half` centred on `(cx, cy)` metres
    pub(crate) fn square(cx: f64, cy: f64, half: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: cx - half, y: cy - half),
            (x: cx + half, y: cy - half),
            (x: cx + half, y: cy + half),
            (x: cx - half, y: cy + half),
            (x: cx - half, y: cy - half),
        ])
    }

    pub(crate) fn test_dataset() -> CityDataset {
        let streets = vec![
            Feature::new("way/1", line_string![(x: -200.0, y: 0.0), (x: 200.0, y: 0.0)].into())
                .with_name("Herrengasse"),
            Feature::new("way/2", line_string![(x: 0.0, y: -200.0), (x: 0.0, y: 200.0)].into())
                .with_name("Stempfergasse"),
            Feature::new("way/3", line_string![(x: 0.0, y: 60.0), (x: 50.0, y: 60.0)].into())
                .with_name("Stempfergasse"),
        ];
        let features = vec![
            Feature::new("way/10", square(30.0, 30.0, 10.0))
                .with_name("Landhaus")
                .with_old_name("Ständehaus"),
            // also a street name; the street tier must win
            Feature::new("way/11", square(500.0, 500.0, 10.0)).with_name("Herrengasse"),
            Feature::new("node/30", Point::new(-300.0, -300.0).into())
                .with_name("Erzherzog-Johann-Brunnen"),
            Feature::new("way/12", square(3000.0, 0.0, 10.0)).with_name("Schloss Eggenberg"),
        ];
        let nearby = vec![
            Feature::new("way/20", square(-100.0, 100.0, 15.0)),
            Feature::new("way/21", square(-140.0, 100.0, 5.0)),
        ];
        CityDataset::new(LocalProjection::new(ORIGIN), streets, features, nearby)
    }

    fn resolver<'a>(
        dataset: &'a CityDataset,
        geocoder: TableGeocoder,
    ) -> TieredResolver<'a, TableGeocoder, LocalFeatures<'a>> {
        TieredResolver::new(dataset, geocoder, LocalFeatures::new(dataset), "Graz", 100.0)
    }

    #[tokio::test]
    async fn test_street_tier_buffers_by_radius() {
        let dataset = test_dataset();
        let mut resolver = resolver(&dataset, TableGeocoder::default());

        let polygon = resolver.resolve("HERRENGASSE", 10.0).await.unwrap();
        assert!(polygon.contains(&Point::new(0.0, 9.9)));
        assert!(polygon.contains(&Point::new(-150.0, -9.9)));
        assert!(!polygon.contains(&Point::new(0.0, 10.5)));
        // the same-named building lies far away and is not used
        assert!(!polygon.contains(&Point::new(500.0, 500.0)));
        assert_eq!(resolver.geocoder.calls.get(), 0);
    }

    #[tokio::test]
    async fn test_street_tier_unions_all_matches() {
        let dataset = test_dataset();
        let mut resolver = resolver(&dataset, TableGeocoder::default());

        let candidate = resolver.candidate("stempfergasse").await.unwrap();
        assert_eq!(candidate.tier, Tier::Street);
        assert_eq!(candidate.sources, vec!["way/2", "way/3"]);

        let polygon = resolver.resolve("stempfergasse", 5.0).await.unwrap();
        assert!(polygon.contains(&Point::new(0.0, -150.0)));
        assert!(polygon.contains(&Point::new(45.0, 63.0)));
    }

    #[tokio::test]
    async fn test_feature_tier_by_old_name() {
        let dataset = test_dataset();
        let mut resolver = resolver(&dataset, TableGeocoder::default());

        let polygon = resolver.resolve("Ständehaus", 10.0).await.unwrap();
        // 20 x 20 footprint grown by 10 on every side
        assert!(polygon.contains(&Point::new(30.0, 30.0)));
        assert!(polygon.contains(&Point::new(49.5, 30.0)));
        assert!(!polygon.contains(&Point::new(50.5, 30.0)));
        let area = polygon.unsigned_area();
        let exact = 40.0 * 40.0 - (4.0 - std::f64::consts::PI) * 100.0;
        assert!((area - exact).abs() / exact < 0.01, "area {}", area);
    }

    #[tokio::test]
    async fn test_geocoded_tier_keeps_containing_features() {
        let dataset = test_dataset();
        let at = dataset.projection.to_lonlat(geo::Coord { x: -100.0, y: 100.0 });
        let geocoder = TableGeocoder::default().with("Hofbäckerei, Graz", at);
        let mut resolver = resolver(&dataset, geocoder);

        let candidate = resolver.candidate("Hofbäckerei").await.unwrap();
        assert_eq!(candidate.tier, Tier::Geocoded);
        // way/21 is within the search radius but does not contain the point
        assert_eq!(candidate.sources, vec!["way/20"]);
    }

    #[tokio::test]
    async fn test_unresolved_name_is_cached() {
        let dataset = test_dataset();
        let mut resolver = resolver(&dataset, TableGeocoder::default());

        for buffer in [10.0, 20.0, 30.0] {
            assert!(resolver.resolve("Atlantis", buffer).await.is_none());
        }
        assert_eq!(resolver.geocoder.calls.get(), 1);
    }

    #[tokio::test]
    async fn test_feature_tier_point_becomes_disc() {
        let dataset = test_dataset();
        let mut resolver = resolver(&dataset, TableGeocoder::default());

        let candidate = resolver.candidate("Erzherzog-Johann-Brunnen").await.unwrap();
        assert_eq!(candidate.tier, Tier::Feature);
        assert_eq!(candidate.sources, vec!["node/30"]);

        let polygon = resolver.resolve("Erzherzog-Johann-Brunnen", 10.0).await.unwrap();
        assert!(polygon.contains(&Point::new(-293.0, -293.0)));
        assert!(!polygon.contains(&Point::new(-292.0, -292.0)));
        let area = polygon.unsigned_area();
        let exact = std::f64::consts::PI * 100.0;
        assert!((area - exact).abs() / exact < 0.02, "area {}", area);
    }

    /// Fails its first request, then answers every query with one point
    pub(crate) struct FlakyGeocoder {
        pub at: LonLat,
        pub calls: Cell<usize>,
    }

    impl Geocoder for FlakyGeocoder {
        async fn geocode(&self, _query: &str) -> Result<Option<LonLat>, GeocodeError> {
            self.calls.set(self.calls.get() + 1);
            if self.calls.get() == 1 {
                return Err(GeocodeError::Response("connection reset".to_string()));
            }
            Ok(Some(self.at))
        }
    }

    #[tokio::test]
    async fn test_transport_error_is_retried_for_next_place_set() {
        let dataset = test_dataset();
        let geocoder = FlakyGeocoder {
            at: dataset.projection.to_lonlat(geo::Coord { x: -100.0, y: 100.0 }),
            calls: Cell::new(0),
        };
        let mut resolver =
            TieredResolver::new(&dataset, geocoder, LocalFeatures::new(&dataset), "Graz", 100.0);

        resolver.begin_lookup();
        assert!(resolver.resolve("Hofbäckerei", 10.0).await.is_none());
        // later buffer levels of the same place set do not hammer the geocoder
        assert!(resolver.resolve("Hofbäckerei", 20.0).await.is_none());
        assert_eq!(resolver.geocoder.calls.get(), 1);

        resolver.begin_lookup();
        let candidate = resolver.candidate("Hofbäckerei").await.unwrap();
        assert_eq!(candidate.tier, Tier::Geocoded);
        assert_eq!(resolver.geocoder.calls.get(), 2);

        // a definitive answer stays cached
        resolver.begin_lookup();
        assert!(resolver.resolve("Hofbäckerei", 10.0).await.is_some());
        assert_eq!(resolver.geocoder.calls.get(), 2);
    }

    #[tokio::test]
    async fn test_geocoded_point_outside_every_feature() {
        let dataset = test_dataset();
        let at = dataset.projection.to_lonlat(geo::Coord { x: 900.0, y: 900.0 });
        let geocoder = TableGeocoder::default().with("Leechkirche, Graz", at);
        let mut resolver = resolver(&dataset, geocoder);
        assert!(resolver.resolve("Leechkirche", 10.0).await.is_none());
    }

    #[test]
    fn test_buffer_union_of_nothing_is_empty() {
        assert!(buffer_union(&[], 10.0).0.is_empty());
    }
}
