//! Multi-place intersection loop.

use geo::{Area, BooleanOps, Centroid, MultiPolygon, Point};
use tracing::debug;

use super::{BufferSchedule, BufferStrategy, PlaceResolver};
use crate::models::FailureKind;

/// Result of locating one place-name set
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// `point` is in projected metres
    Located {
        point: Point<f64>,
        buffer: f64,
        attempts: Vec<f64>,
    },
    Failed {
        kind: FailureKind,
        buffer: f64,
        unresolved: Vec<String>,
        attempts: Vec<f64>,
    },
}

impl Outcome {
    /// Buffer at which the outcome was decided
    pub fn buffer(&self) -> f64 {
        match self {
            Outcome::Located { buffer, .. } | Outcome::Failed { buffer, .. } => *buffer,
        }
    }

    /// Every buffer tried, in the order tried
    pub fn attempts(&self) -> &[f64] {
        match self {
            Outcome::Located { attempts, .. } | Outcome::Failed { attempts, .. } => attempts,
        }
    }
}

enum Attempt {
    Hit(Point<f64>),
    Unresolved(Vec<String>),
    Empty,
}

async fn attempt<R: PlaceResolver>(resolver: &mut R, places: &[String], buffer: f64) -> Attempt {
    let mut polygons: Vec<MultiPolygon<f64>> = Vec::with_capacity(places.len());
    let mut unresolved = Vec::new();
    for name in places {
        match resolver.resolve(name, buffer).await {
            Some(polygon) if !polygon.0.is_empty() => polygons.push(polygon),
            _ => unresolved.push(name.clone()),
        }
    }
    if !unresolved.is_empty() {
        return Attempt::Unresolved(unresolved);
    }

    let mut polygons = polygons.into_iter();
    let Some(first) = polygons.next() else {
        return Attempt::Empty;
    };
    let shared = polygons.fold(first, |acc, next| acc.intersection(&next));
    if shared.0.is_empty() || shared.unsigned_area() <= 0.0 {
        return Attempt::Empty;
    }
    match shared.centroid() {
        Some(point) => Attempt::Hit(point),
        None => Attempt::Empty,
    }
}

fn failed(last: Attempt, buffer: f64, attempts: Vec<f64>) -> Outcome {
    let (kind, unresolved) = match last {
        Attempt::Unresolved(names) => (FailureKind::UnresolvedPlaces, names),
        _ => (FailureKind::NoIntersection, Vec::new()),
    };
    Outcome::Failed {
        kind,
        buffer,
        unresolved,
        attempts,
    }
}

/// Find the smallest buffer level at which all `places` overlap.
///
/// A level fails when any name has no geometry or the buffered polygons,
/// intersected in order, leave nothing behind.
pub async fn locate<R: PlaceResolver>(
    resolver: &mut R,
    places: &[String],
    schedule: &BufferSchedule,
    strategy: BufferStrategy,
) -> Outcome {
    resolver.begin_lookup();
    if places.is_empty() {
        return Outcome::Failed {
            kind: FailureKind::NoPlaceNames,
            buffer: 0.0,
            unresolved: Vec::new(),
            attempts: Vec::new(),
        };
    }

    let levels = schedule.levels();
    match strategy {
        BufferStrategy::Linear => sweep(resolver, places, &levels).await,
        BufferStrategy::Bisect => bisect(resolver, places, &levels).await,
    }
}

async fn sweep<R: PlaceResolver>(resolver: &mut R, places: &[String], levels: &[f64]) -> Outcome {
    let mut attempts = Vec::with_capacity(levels.len());
    let mut last = Attempt::Empty;
    for &buffer in levels {
        attempts.push(buffer);
        match attempt(resolver, places, buffer).await {
            Attempt::Hit(point) => {
                return Outcome::Located {
                    point,
                    buffer,
                    attempts,
                }
            }
            miss => {
                debug!("No overlap at buffer {} for {:?}", buffer, places);
                last = miss;
            }
        }
    }
    let buffer = attempts.last().copied().unwrap_or(0.0);
    failed(last, buffer, attempts)
}

async fn bisect<R: PlaceResolver>(resolver: &mut R, places: &[String], levels: &[f64]) -> Outcome {
    let Some(&max) = levels.last() else {
        return failed(Attempt::Empty, 0.0, Vec::new());
    };

    // the ceiling decides whether there is anything to search for
    let mut attempts = vec![max];
    let mut best = match attempt(resolver, places, max).await {
        Attempt::Hit(point) => point,
        miss => return failed(miss, max, attempts),
    };

    let (mut lo, mut hi) = (0, levels.len() - 1);
    while lo < hi {
        let mid = (lo + hi) / 2;
        attempts.push(levels[mid]);
        match attempt(resolver, places, levels[mid]).await {
            Attempt::Hit(point) => {
                best = point;
                hi = mid;
            }
            _ => lo = mid + 1,
        }
    }
    Outcome::Located {
        point: best,
        buffer: levels[hi],
        attempts,
    }
}
