//! Local metric projection around the city.
//!
//! Buffers are given in metres, so every geometry is moved into a flat
//! tangent plane centred on the city before buffering and intersecting, and
//! moved back to lon/lat before a coordinate is emitted. Over a city-sized
//! area the equirectangular error is well below the buffer step.

use geo::{Coord, MapCoords, Point, Rect};
use serde::{Deserialize, Serialize};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

// longitude is x, latitude is y
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Haversine distance in metres
    pub fn distance_m(&self, other: LonLat) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let delta_lat = lat2 - lat1;
        let delta_lon = (other.lon - self.lon).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + (delta_lon / 2.0).sin().powi(2) * lat1.cos() * lat2.cos();
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }
}

impl From<LonLat> for Coord<f64> {
    fn from(pt: LonLat) -> Self {
        Coord {
            x: pt.lon,
            y: pt.lat,
        }
    }
}

/// Equirectangular projection centred on `origin`, units in metres.
#[derive(Debug, Clone, Copy)]
pub struct LocalProjection {
    origin: LonLat,
    cos_lat: f64,
}

impl LocalProjection {
    pub fn new(origin: LonLat) -> Self {
        Self {
            origin,
            cos_lat: origin.lat.to_radians().cos(),
        }
    }

    /// Centre the projection on a lon/lat bounding box
    pub fn centred_on(bounds: Rect<f64>) -> Self {
        let c = bounds.center();
        Self::new(LonLat::new(c.x, c.y))
    }

    pub fn origin(&self) -> LonLat {
        self.origin
    }

    pub fn to_metres(&self, pt: LonLat) -> Coord<f64> {
        Coord {
            x: EARTH_RADIUS_M * (pt.lon - self.origin.lon).to_radians() * self.cos_lat,
            y: EARTH_RADIUS_M * (pt.lat - self.origin.lat).to_radians(),
        }
    }

    pub fn to_lonlat(&self, c: Coord<f64>) -> LonLat {
        LonLat {
            lon: self.origin.lon + (c.x / (EARTH_RADIUS_M * self.cos_lat)).to_degrees(),
            lat: self.origin.lat + (c.y / EARTH_RADIUS_M).to_degrees(),
        }
    }

    pub fn point_to_lonlat(&self, p: Point<f64>) -> LonLat {
        self.to_lonlat(p.0)
    }

    /// Project any lon/lat geometry into metres
    pub fn project<G>(&self, geometry: &G) -> G::Output
    where
        G: MapCoords<f64, f64>,
    {
        geometry.map_coords(|c| self.to_metres(LonLat::new(c.x, c.y)))
    }
}
