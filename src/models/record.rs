//! Postcard records and the entries emitted for them.

use serde::{Deserialize, Serialize};

use crate::projection::LonLat;

/// One archival object parsed from its LIDO payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub title: String,
    /// `objectWorkType/term`; `None` when the payload has none
    pub object_type: Option<String>,
    /// Terms of `termMaterialsTech[@type='decor']`
    pub decor: Vec<String>,
    pub earliest_date: Option<i32>,
    pub latest_date: Option<i32>,
    /// Unique place names in document order
    pub places: Vec<String>,
}

/// A record that was located successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEntry {
    pub title: String,
    pub id: String,
    pub earliest_date: Option<i32>,
    pub latest_date: Option<i32>,
    pub latitude: f64,
    pub longitude: f64,
}

impl ResultEntry {
    pub fn new(record: &Record, location: LonLat) -> Self {
        Self {
            title: record.title.clone(),
            id: record.id.clone(),
            earliest_date: record.earliest_date,
            latest_date: record.latest_date,
            latitude: location.lat,
            longitude: location.lon,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_serializes_with_camel_case_keys() {
        let record = Record {
            id: "o:gm.1".to_string(),
            title: "Graz, Hauptplatz".to_string(),
            object_type: Some("Ansichtspostkarte".to_string()),
            decor: vec![],
            earliest_date: Some(1900),
            latest_date: None,
            places: vec!["Hauptplatz".to_string()],
        };
        let entry = ResultEntry::new(&record, LonLat::new(15.438, 47.071));
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["earliestDate"], 1900);
        assert!(value["latestDate"].is_null());
        assert_eq!(value["latitude"], 47.071);
        assert_eq!(value["longitude"], 15.438);
        assert_eq!(value["id"], "o:gm.1");
    }
}
