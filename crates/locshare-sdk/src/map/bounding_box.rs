// Copyright 2026 The Matrix.org Foundation C.I.C.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::location::GeoPoint;

/// Northmost latitude the Web Mercator projection can show.
pub const MAX_LATITUDE: f64 = 85.05112877980658;
pub const MIN_LATITUDE: f64 = -MAX_LATITUDE;

/// A region of the map, in degrees.
///
/// `west` is greater than `east` for boxes crossing the antimeridian.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub north: f64,
    pub east: f64,
    pub south: f64,
    pub west: f64,
}

impl BoundingBox {
    pub fn new(north: f64, east: f64, south: f64, west: f64) -> Self {
        Self { north, east, south, west }
    }

    /// The smallest box containing every point, `None` without points.
    pub fn from_points(points: impl IntoIterator<Item = GeoPoint>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;

        let init = Self::new(first.latitude, first.longitude, first.latitude, first.longitude);
        Some(points.fold(init, |bounds, point| Self {
            north: bounds.north.max(point.latitude),
            east: bounds.east.max(point.longitude),
            south: bounds.south.min(point.latitude),
            west: bounds.west.min(point.longitude),
        }))
    }

    pub fn latitude_span(&self) -> f64 {
        (self.north - self.south).abs()
    }

    pub fn longitude_span(&self) -> f64 {
        if self.east >= self.west {
            self.east - self.west
        } else {
            self.east - self.west + 360.0
        }
    }

    pub fn center(&self) -> GeoPoint {
        let mut longitude = (self.east + self.west) / 2.0;
        if self.east < self.west {
            longitude += 180.0;
        }

        GeoPoint::new((self.north + self.south) / 2.0, clean_longitude(longitude))
    }

    /// The box scaled by `scale` around its center.
    ///
    /// Latitudes are clamped to what the map can show, longitudes wrap
    /// around. A non-positive scale leaves the box as is.
    #[must_use]
    pub fn increase_by_scale(&self, scale: f64) -> Self {
        if scale.is_nan() || scale <= 0.0 {
            return *self;
        }

        let center = self.center();
        let half_latitude = self.latitude_span() * scale / 2.0;
        let half_longitude = self.longitude_span() * scale / 2.0;

        Self {
            north: clean_latitude(center.latitude + half_latitude),
            east: clean_longitude(center.longitude + half_longitude),
            south: clean_latitude(center.latitude - half_latitude),
            west: clean_longitude(center.longitude - half_longitude),
        }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        let latitude_inside = point.latitude <= self.north && point.latitude >= self.south;
        let longitude_inside = if self.east >= self.west {
            point.longitude >= self.west && point.longitude <= self.east
        } else {
            point.longitude >= self.west || point.longitude <= self.east
        };

        latitude_inside && longitude_inside
    }
}

fn clean_latitude(latitude: f64) -> f64 {
    latitude.clamp(MIN_LATITUDE, MAX_LATITUDE)
}

fn clean_longitude(longitude: f64) -> f64 {
    let mut longitude = longitude;
    while longitude < -180.0 {
        longitude += 360.0;
    }
    while longitude > 180.0 {
        longitude -= 360.0;
    }
    longitude
}

#[cfg(test)]
mod tests {
    use super::{BoundingBox, MAX_LATITUDE};
    use crate::location::GeoPoint;

    #[test]
    fn test_from_points() {
        assert_eq!(BoundingBox::from_points(Vec::new()), None);

        let bounds = BoundingBox::from_points([
            GeoPoint::new(45.0, -73.0),
            GeoPoint::new(46.0, -74.0),
            GeoPoint::new(45.5, -72.0),
        ])
        .unwrap();

        assert_eq!(bounds, BoundingBox::new(46.0, -72.0, 45.0, -74.0));
        assert_eq!(bounds.center(), GeoPoint::new(45.5, -73.0));
    }

    #[test]
    fn test_increase_by_scale_keeps_the_center() {
        let bounds = BoundingBox::new(46.0, -72.0, 44.0, -74.0).increase_by_scale(1.5);

        assert_eq!(bounds, BoundingBox::new(46.5, -71.5, 43.5, -74.5));
        assert_eq!(bounds.center(), GeoPoint::new(45.0, -73.0));
        assert!(bounds.contains(GeoPoint::new(46.2, -71.6)));
    }

    #[test]
    fn test_increase_by_scale_clamps_latitudes() {
        let bounds = BoundingBox::new(80.0, 10.0, 60.0, 0.0).increase_by_scale(2.0);

        assert_eq!(bounds.north, MAX_LATITUDE);
        assert_eq!(bounds.south, 50.0);
    }

    #[test]
    fn test_increase_by_scale_wraps_longitudes() {
        let bounds = BoundingBox::new(10.0, 179.0, 0.0, 171.0).increase_by_scale(2.0);

        assert_eq!(bounds.west, 167.0);
        assert_eq!(bounds.east, -177.0);
        assert!(bounds.contains(GeoPoint::new(5.0, 180.0)));
        assert!(bounds.contains(GeoPoint::new(5.0, -178.0)));
        assert!(!bounds.contains(GeoPoint::new(5.0, 0.0)));
    }

    #[test]
    fn test_invalid_scale() {
        let bounds = BoundingBox::new(1.0, 1.0, 0.0, 0.0);
        assert_eq!(bounds.increase_by_scale(0.0), bounds);
        assert_eq!(bounds.increase_by_scale(f64::NAN), bounds);
    }
}
