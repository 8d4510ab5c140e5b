//! OSM tag filters.

use serde::Deserialize;

/// One `key` or `key=value|value` condition. An empty value list accepts any
/// value of the key.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TagRule {
    pub key: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl TagRule {
    pub fn any(key: &str) -> Self {
        Self {
            key: key.to_string(),
            values: Vec::new(),
        }
    }

    pub fn one_of(key: &str, values: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn matches(&self, key: &str, value: &str) -> bool {
        self.key == key && (self.values.is_empty() || self.values.iter().any(|v| v == value))
    }
}

/// A list of rules; an object matches if any of its tags matches any rule.
///
/// Keys may repeat with different values, so `landuse=cemetery` and
/// `landuse=forest` are both honoured.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct TagFilter {
    rules: Vec<TagRule>,
}

impl TagFilter {
    pub fn new(rules: Vec<TagRule>) -> Self {
        Self { rules }
    }

    /// Footprints searched by name in the second resolver tier
    pub fn named_features() -> Self {
        Self::new(vec![
            TagRule::any("building"),
            TagRule::any("historic"),
            TagRule::any("bridge"),
            TagRule::any("railway"),
            TagRule::any("leisure"),
            TagRule::one_of("amenity", &["hospital"]),
            TagRule::one_of("landuse", &["cemetery", "forest"]),
        ])
    }

    /// Features around a geocoded point in the third resolver tier
    pub fn nearby_features() -> Self {
        Self::new(vec![
            TagRule::any("building"),
            TagRule::any("highway"),
            TagRule::any("railway"),
            TagRule::any("leisure"),
            TagRule::one_of("amenity", &["hospital"]),
            TagRule::one_of("landuse", &["cemetery", "forest"]),
        ])
    }

    pub fn rules(&self) -> &[TagRule] {
        &self.rules
    }

    pub fn matches<'a, I>(&self, tags: I) -> bool
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        tags.into_iter()
            .any(|(k, v)| self.rules.iter().any(|rule| rule.matches(k, v)))
    }

    pub fn matches_osm(&self, tags: &osmpbfreader::Tags) -> bool {
        self.matches(tags.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osmpbfreader::Tags;

    #[test]
    fn test_any_value_rule() {
        let filter = TagFilter::named_features();
        assert!(filter.matches([("building", "yes")]));
        assert!(filter.matches([("name", "Oper"), ("historic", "monument")]));
        assert!(!filter.matches([("name", "Oper")]));
    }

    #[test]
    fn test_repeated_key_accepts_every_value() {
        let filter = TagFilter::nearby_features();
        assert!(filter.matches([("landuse", "cemetery")]));
        assert!(filter.matches([("landuse", "forest")]));
        assert!(!filter.matches([("landuse", "residential")]));
        assert!(filter.matches([("amenity", "hospital")]));
        assert!(!filter.matches([("amenity", "school")]));
    }

    #[test]
    fn test_matches_osm_tags() {
        let mut tags = Tags::new();
        tags.insert("name".into(), "Zentralfriedhof".into());
        tags.insert("landuse".into(), "cemetery".into());
        assert!(TagFilter::named_features().matches_osm(&tags));
    }

    #[test]
    fn test_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            tags: TagFilter,
        }
        let wrapper: Wrapper = toml::from_str(
            r#"tags = [{ key = "building" }, { key = "landuse", values = ["forest"] }]"#,
        )
        .unwrap();
        assert_eq!(wrapper.tags.rules().len(), 2);
        assert!(wrapper.tags.matches([("landuse", "forest")]));
        assert!(!wrapper.tags.matches([("landuse", "cemetery")]));
    }
}
