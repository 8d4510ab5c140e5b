use crate::config::FilterConfig;
use crate::models::Record;

/// Why a record was skipped before geocoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    ExcludedDecor(String),
    ObjectType(Option<String>),
}

/// Content filters applied before any geocoding work
#[derive(Debug, Clone)]
pub struct RecordFilter {
    accepted_object_type: String,
    excluded_decor: String,
}

impl RecordFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            accepted_object_type: config.accepted_object_type.clone(),
            excluded_decor: config.excluded_decor.clone(),
        }
    }

    /// Decor exclusion first, then the object type.
    pub fn check(&self, record: &Record) -> Result<(), Rejection> {
        if let Some(decor) = record.decor.iter().find(|d| **d == self.excluded_decor) {
            return Err(Rejection::ExcludedDecor(decor.clone()));
        }
        match record.object_type.as_deref() {
            Some(t) if t == self.accepted_object_type => Ok(()),
            other => Err(Rejection::ObjectType(other.map(String::from))),
        }
    }
}
