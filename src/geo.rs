use std::fmt;

pub const LATITUDE_RANGE: (f64, f64) = (-90.0, 90.0);
pub const LONGITUDE_RANGE: (f64, f64) = (-180.0, 180.0);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeoError {
    #[error("Invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },
    #[error("Invalid bounding box extent: {0}")]
    InvalidExtent(f64),
}

/// Half-width and half-height of a search box, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HalfExtent {
    pub width: f64,
    pub height: f64,
}

impl Default for HalfExtent {
    fn default() -> Self {
        Self {
            width: 0.01,
            height: 0.01,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&latitude)
            && (self.min_lon..=self.max_lon).contains(&longitude)
    }
}

/// Renders the `minLon,minLat,maxLon,maxLat` form the search API expects.
impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

pub fn validate_coordinate(latitude: f64, longitude: f64) -> Result<(), GeoError> {
    let lat_ok = latitude.is_finite() && (LATITUDE_RANGE.0..=LATITUDE_RANGE.1).contains(&latitude);
    let lon_ok =
        longitude.is_finite() && (LONGITUDE_RANGE.0..=LONGITUDE_RANGE.1).contains(&longitude);

    if lat_ok && lon_ok {
        Ok(())
    } else {
        Err(GeoError::InvalidCoordinate {
            latitude,
            longitude,
        })
    }
}

/// Builds a box of `extent` around the point, clamped to the valid lat/lon domain.
pub fn bounding_box(
    latitude: f64,
    longitude: f64,
    extent: HalfExtent,
) -> Result<BoundingBox, GeoError> {
    validate_coordinate(latitude, longitude)?;
    for value in [extent.width, extent.height] {
        if !value.is_finite() || value <= 0.0 {
            return Err(GeoError::InvalidExtent(value));
        }
    }

    Ok(BoundingBox {
        min_lon: (longitude - extent.width).max(LONGITUDE_RANGE.0),
        min_lat: (latitude - extent.height).max(LATITUDE_RANGE.0),
        max_lon: (longitude + extent.width).min(LONGITUDE_RANGE.1),
        max_lat: (latitude + extent.height).min(LATITUDE_RANGE.1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_default_extent() {
        let bbox = bounding_box(40.0, -74.0, HalfExtent::default()).unwrap();

        assert!((bbox.min_lon - -74.01).abs() < 1e-9);
        assert!((bbox.max_lon - -73.99).abs() < 1e-9);
        assert!((bbox.min_lat - 39.99).abs() < 1e-9);
        assert!((bbox.max_lat - 40.01).abs() < 1e-9);
    }

    #[test]
    fn test_bounding_box_clamps_at_edges() {
        let bbox = bounding_box(90.0, 180.0, HalfExtent::default()).unwrap();
        assert_eq!(bbox.max_lat, 90.0);
        assert_eq!(bbox.max_lon, 180.0);

        let bbox = bounding_box(-90.0, -180.0, HalfExtent::default()).unwrap();
        assert_eq!(bbox.min_lat, -90.0);
        assert_eq!(bbox.min_lon, -180.0);

        let wide = HalfExtent {
            width: 500.0,
            height: 500.0,
        };
        let bbox = bounding_box(0.0, 0.0, wide).unwrap();
        assert_eq!(
            bbox,
            BoundingBox {
                min_lon: -180.0,
                min_lat: -90.0,
                max_lon: 180.0,
                max_lat: 90.0,
            }
        );
    }

    #[test]
    fn test_bounding_box_contains_point_across_domain() {
        let extents = [
            HalfExtent::default(),
            HalfExtent {
                width: 0.5,
                height: 2.0,
            },
            HalfExtent {
                width: 45.0,
                height: 0.001,
            },
        ];

        for lat in (-90..=90).step_by(15) {
            for lon in (-180..=180).step_by(20) {
                for extent in extents {
                    let (lat, lon) = (lat as f64, lon as f64);
                    let bbox = bounding_box(lat, lon, extent).unwrap();
                    assert!(bbox.contains(lat, lon), "{bbox} should contain {lat},{lon}");
                    assert!(bbox.min_lon >= -180.0 && bbox.max_lon <= 180.0);
                    assert!(bbox.min_lat >= -90.0 && bbox.max_lat <= 90.0);
                }
            }
        }
    }

    #[test]
    fn test_bounding_box_rejects_invalid_coordinates() {
        let invalid = [
            (90.1, 0.0),
            (-91.0, 0.0),
            (0.0, 180.5),
            (0.0, -181.0),
            (f64::NAN, 0.0),
        ];
        for (lat, lon) in invalid {
            assert!(matches!(
                bounding_box(lat, lon, HalfExtent::default()),
                Err(GeoError::InvalidCoordinate { .. })
            ));
        }
    }

    #[test]
    fn test_bounding_box_rejects_invalid_extent() {
        let extent = HalfExtent {
            width: 0.0,
            height: 0.01,
        };
        assert_eq!(bounding_box(1.0, 1.0, extent), Err(GeoError::InvalidExtent(0.0)));
    }

    #[test]
    fn test_bounding_box_display() {
        let bbox = BoundingBox {
            min_lon: -74.5,
            min_lat: 39.5,
            max_lon: -73.5,
            max_lat: 40.5,
        };
        assert_eq!(bbox.to_string(), "-74.5,39.5,-73.5,40.5");
    }
}
