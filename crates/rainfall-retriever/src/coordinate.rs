//! Coordinate Model
//!
//! Latitude and longitude live as user-editable text until a retrieval needs
//! them. [`Coordinate`] is the validated projection: it can only be built from
//! finite, in-range values, so anything holding one has passed validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Initial latitude text (Tucson, AZ)
pub const DEFAULT_LATITUDE: &str = "32.2226";
/// Initial longitude text (Tucson, AZ)
pub const DEFAULT_LONGITUDE: &str = "-110.9747";

/// Two map positions closer than this are the same position
const POSITION_EPSILON: f64 = 1e-9;

/// A validated point: latitude in [-90, 90], longitude in [-180, 180]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(CoordinateError::NotANumber);
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::LatitudeOutOfRange(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::LongitudeOutOfRange(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn to_lat_lng(self) -> LatLng {
        LatLng {
            lat: self.latitude,
            lng: self.longitude,
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}",
            format_degrees(self.latitude),
            format_degrees(self.longitude)
        )
    }
}

/// Why a latitude/longitude pair was rejected
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinateError {
    NotANumber,
    LatitudeOutOfRange(f64),
    LongitudeOutOfRange(f64),
}

impl fmt::Display for CoordinateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotANumber => write!(f, "Coordinates must be finite numbers"),
            Self::LatitudeOutOfRange(lat) => {
                write!(f, "Latitude {lat} is outside -90 to 90")
            }
            Self::LongitudeOutOfRange(lon) => {
                write!(f, "Longitude {lon} is outside -180 to 180")
            }
        }
    }
}

impl std::error::Error for CoordinateError {}

/// Parse the two text fields of the Coordinate Model
pub fn parse_coordinate(latitude: &str, longitude: &str) -> Result<Coordinate, CoordinateError> {
    Coordinate::new(parse_degrees(latitude)?, parse_degrees(longitude)?)
}

fn parse_degrees(text: &str) -> Result<f64, CoordinateError> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| CoordinateError::NotANumber)
}

/// Text written back into a coordinate field: always six decimals
pub fn format_degrees(value: f64) -> String {
    format!("{:.6}", value)
}

/// A position on the rendering surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn same_position(&self, other: &LatLng) -> bool {
        (self.lat - other.lat).abs() <= POSITION_EPSILON
            && (self.lng - other.lng).abs() <= POSITION_EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_accepts_bounds() {
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(-90.0, -180.0).is_ok());
        assert!(Coordinate::new(0.0, 0.0).is_ok());
    }

    #[test]
    fn test_new_rejects_out_of_range_without_clamping() {
        assert_eq!(
            Coordinate::new(95.0, -110.0),
            Err(CoordinateError::LatitudeOutOfRange(95.0))
        );
        assert_eq!(
            Coordinate::new(45.0, -180.5),
            Err(CoordinateError::LongitudeOutOfRange(-180.5))
        );
    }

    #[test]
    fn test_new_rejects_non_finite() {
        assert_eq!(Coordinate::new(f64::NAN, 0.0), Err(CoordinateError::NotANumber));
        assert_eq!(
            Coordinate::new(0.0, f64::INFINITY),
            Err(CoordinateError::NotANumber)
        );
    }

    #[test]
    fn test_parse_coordinate() {
        let coord = parse_coordinate(" 32.2226 ", "-110.9747").unwrap();
        assert_eq!(coord.latitude(), 32.2226);
        assert_eq!(coord.longitude(), -110.9747);
    }

    #[test]
    fn test_parse_coordinate_rejects_garbage() {
        assert_eq!(parse_coordinate("", "10"), Err(CoordinateError::NotANumber));
        assert_eq!(parse_coordinate("abc", "10"), Err(CoordinateError::NotANumber));
        assert_eq!(parse_coordinate("10", "NaN"), Err(CoordinateError::NotANumber));
        assert_eq!(parse_coordinate("inf", "10"), Err(CoordinateError::NotANumber));
    }

    #[test]
    fn test_format_degrees_six_decimals() {
        assert_eq!(format_degrees(40.0), "40.000000");
        assert_eq!(format_degrees(-105.0), "-105.000000");
        assert_eq!(format_degrees(32.22261234), "32.222612");
    }

    #[test]
    fn test_display() {
        let coord = Coordinate::new(40.0, -105.0).unwrap();
        assert_eq!(coord.to_string(), "40.000000, -105.000000");
    }

    #[test]
    fn test_same_position_epsilon() {
        let a = LatLng::new(32.2226, -110.9747);
        assert!(a.same_position(&LatLng::new(32.2226 + 1e-12, -110.9747)));
        assert!(!a.same_position(&LatLng::new(32.2227, -110.9747)));
    }
}
