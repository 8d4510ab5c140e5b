use std::fmt;

/// Why a record could not be located.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FailureKind {
    /// The record names no place at all
    NoPlaceNames,
    /// At least one place name never produced geometry
    UnresolvedPlaces,
    /// Every name resolved, but the polygons never overlapped
    NoIntersection,
}

/// Failure log entry for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub record_id: String,
    pub places: Vec<String>,
    pub kind: FailureKind,
    /// Largest buffer that was tried, metres
    pub buffer: f64,
    /// Names that had no geometry at `buffer`
    pub unresolved: Vec<String>,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let places = format!("{{{}}}", self.places.join(", "));
        match self.kind {
            FailureKind::NoPlaceNames => {
                write!(f, "No place names for {}", self.record_id)
            }
            FailureKind::UnresolvedPlaces => write!(
                f,
                "No polygons for {} up to buffer {}, {} (unresolved: {})",
                self.record_id,
                self.buffer,
                places,
                self.unresolved.join(", ")
            ),
            FailureKind::NoIntersection => write!(
                f,
                "No intersection for {} with max. buffer {}, {}",
                self.record_id, self.buffer, places
            ),
        }
    }
}
