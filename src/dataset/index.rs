//! Spatial index for features around a geocoded point.

use geo::{BoundingRect, Coord};
use rstar::{RTree, RTreeObject, AABB};
use std::sync::Arc;
use tracing::info;

use super::Feature;

/// Wrapper for R-tree indexing of features
#[derive(Clone)]
pub struct IndexedFeature {
    pub feature: Arc<Feature>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedFeature {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl IndexedFeature {
    pub fn new(feature: Feature) -> Option<Self> {
        let rect = feature.geometry.bounding_rect()?;
        Some(Self {
            envelope: AABB::from_corners(
                [rect.min().x, rect.min().y],
                [rect.max().x, rect.max().y],
            ),
            feature: Arc::new(feature),
        })
    }
}

/// R-tree over projected features
pub struct NearbyIndex {
    tree: RTree<IndexedFeature>,
}

impl NearbyIndex {
    pub fn build(features: Vec<Feature>) -> Self {
        info!("Building spatial index for {} features...", features.len());
        let indexed: Vec<IndexedFeature> = features
            .into_iter()
            .filter_map(IndexedFeature::new)
            .collect();
        let tree = RTree::bulk_load(indexed);
        info!("Spatial index built with {} entries", tree.size());
        Self { tree }
    }

    /// Features whose bounding box reaches into the square of half-width
    /// `radius` around `center`
    pub fn around(&self, center: Coord<f64>, radius: f64) -> Vec<Arc<Feature>> {
        let query = AABB::from_corners(
            [center.x - radius, center.y - radius],
            [center.x + radius, center.y + radius],
        );
        self.tree
            .locate_in_envelope_intersecting(&query)
            .map(|f| Arc::clone(&f.feature))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
