//! Named features and exact-name lookup.

use geo::Geometry;
use hashbrown::HashMap;

/// An OSM object with its geometry in projected metres
#[derive(Debug, Clone)]
pub struct Feature {
    /// "{osm_type}/{osm_id}"
    pub source_id: String,
    pub name: Option<String>,
    pub old_name: Option<String>,
    pub geometry: Geometry<f64>,
}

impl Feature {
    pub fn new(source_id: impl Into<String>, geometry: Geometry<f64>) -> Self {
        Self {
            source_id: source_id.into(),
            name: None,
            old_name: None,
            geometry,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_old_name(mut self, old_name: &str) -> Self {
        self.old_name = Some(old_name.to_string());
        self
    }
}

/// Key used for case-insensitive exact matching
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Features keyed by normalized name
#[derive(Debug, Default)]
pub struct NameIndex {
    features: Vec<Feature>,
    by_name: HashMap<String, Vec<usize>>,
}

impl NameIndex {
    /// Index on `name` only
    pub fn by_name(features: Vec<Feature>) -> Self {
        Self::build(features, false)
    }

    /// Index on `name` and `old_name`
    pub fn by_name_or_old_name(features: Vec<Feature>) -> Self {
        Self::build(features, true)
    }

    fn build(features: Vec<Feature>, include_old: bool) -> Self {
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, feature) in features.iter().enumerate() {
            let old = if include_old {
                feature.old_name.as_deref()
            } else {
                None
            };
            let mut keys: Vec<String> = feature
                .name
                .as_deref()
                .into_iter()
                .chain(old)
                .map(normalize_name)
                .collect();
            keys.dedup();
            for key in keys {
                by_name.entry(key).or_default().push(i);
            }
        }
        Self { features, by_name }
    }

    /// All features whose name matches exactly, ignoring case
    pub fn lookup(&self, name: &str) -> Vec<&Feature> {
        self.by_name
            .get(&normalize_name(name))
            .map(|ids| ids.iter().map(|i| &self.features[*i]).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, Point};

    fn feature(id: &str) -> Feature {
        let p: Point<f64> = point!(x: 0.0, y: 0.0);
        Feature::new(id, p.into())
    }

    #[test]
    fn test_lookup_ignores_case_and_whitespace() {
        let index = NameIndex::by_name(vec![
            feature("way/1").with_name("Herrengasse"),
            feature("way/2").with_name("HERRENGASSE"),
            feature("way/3").with_name("Sporgasse"),
        ]);
        let ids: Vec<&str> = index
            .lookup(" herrengasse ")
            .iter()
            .map(|f| f.source_id.as_str())
            .collect();
        assert_eq!(ids, vec!["way/1", "way/2"]);
        assert!(index.lookup("Herren").is_empty());
    }

    #[test]
    fn test_old_name_only_when_requested() {
        let features = vec![feature("way/9")
            .with_name("Opernhaus Graz")
            .with_old_name("Stadttheater")];
        let streets = NameIndex::by_name(features.clone());
        let buildings = NameIndex::by_name_or_old_name(features);
        assert!(streets.lookup("stadttheater").is_empty());
        assert_eq!(buildings.lookup("stadttheater").len(), 1);
        assert_eq!(buildings.lookup("opernhaus graz").len(), 1);
    }

    #[test]
    fn test_same_name_and_old_name_counted_once() {
        let index = NameIndex::by_name_or_old_name(vec![feature("way/4")
            .with_name("Dom")
            .with_old_name("dom")]);
        assert_eq!(index.lookup("Dom").len(), 1);
    }

    #[test]
    fn test_unicode_lowercase() {
        let index = NameIndex::by_name(vec![feature("way/5").with_name("Äußere Ragnitzstraße")]);
        assert_eq!(index.lookup("äußere ragnitzstraße").len(), 1);
    }
}
