//! Core types for the location subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Latitude and longitude in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Lat within -90..=90 and lon within -180..=180.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ns = if self.lat >= 0.0 { 'N' } else { 'S' };
        let ew = if self.lon >= 0.0 { 'E' } else { 'W' };
        write!(f, "{:.4}\u{00B0}{}, {:.4}\u{00B0}{}", self.lat.abs(), ns, self.lon.abs(), ew)
    }
}

/// A location fix: where, how precise, and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub coordinate: Coordinate,
    /// Meters above sea level, when the source reports it.
    #[serde(default)]
    pub altitude: Option<f64>,
    /// Horizontal accuracy radius in meters.
    #[serde(default)]
    pub horizontal_accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Location {
    /// A fix at `coordinate` stamped with the current time.
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            altitude: None,
            horizontal_accuracy: None,
            timestamp: Utc::now(),
        }
    }

    pub fn from_lat_lon(lat: f64, lon: f64) -> Self {
        Self::new(Coordinate::new(lat, lon))
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn with_accuracy(mut self, meters: f64) -> Self {
        self.horizontal_accuracy = Some(meters);
        self
    }
}

/// A resolved address or geographic descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placemark {
    pub name: String,
    pub coordinate: Coordinate,
    /// Full display name from the provider (e.g. "Medina, Al Madinah, Saudi Arabia")
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    /// ISO 3166-1 alpha-2 country code (e.g. "SA", "US")
    #[serde(default)]
    pub country_code: Option<String>,
}

impl Placemark {
    pub fn new(name: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            name: name.into(),
            coordinate,
            display_name: None,
            locality: None,
            country: None,
            country_code: None,
        }
    }

    /// A fresh location fix at this placemark's coordinate.
    pub fn location(&self) -> Location {
        Location::new(self.coordinate)
    }

    pub fn display_line(&self) -> String {
        let country_part = match (&self.country, &self.country_code) {
            (Some(name), _) => format!(" \u{2014} {}", name),
            (None, Some(cc)) => format!(" \u{2014} {}", cc),
            (None, None) => String::new(),
        };
        format!("\u{1F4CD} {}{}\n  \u{1F4D0} {}", self.name, country_part, self.coordinate)
    }
}

/// Whether the host lets this process read the device location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationStatus {
    NotDetermined,
    Restricted,
    Denied,
    Authorized,
}

impl AuthorizationStatus {
    pub fn is_authorized(self) -> bool {
        self == Self::Authorized
    }
}

impl fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotDetermined => write!(f, "not determined"),
            Self::Restricted => write!(f, "restricted"),
            Self::Denied => write!(f, "denied"),
            Self::Authorized => write!(f, "authorized"),
        }
    }
}

/// Desired accuracy of location fixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accuracy {
    BestForNavigation,
    Best,
    NearestTenMeters,
    HundredMeters,
    #[default]
    Kilometer,
    ThreeKilometers,
}

impl Accuracy {
    /// Threshold in meters. Negative values mean "as good as the hardware allows".
    pub fn meters(self) -> f64 {
        match self {
            Self::BestForNavigation => -2.0,
            Self::Best => -1.0,
            Self::NearestTenMeters => 10.0,
            Self::HundredMeters => 100.0,
            Self::Kilometer => 1_000.0,
            Self::ThreeKilometers => 3_000.0,
        }
    }
}

/// Location and geocoding errors.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationError {
    /// Requested an operation relative to the current location before one was known.
    NoCurrentLocation,
    /// The pending request was superseded or cancelled before it completed.
    Cancelled,
    Denied,
    InvalidCoordinate { lat: f64, lon: f64 },
    Network(String),
    NotFound(String),
    InvalidResponse(String),
    Platform(String),
}

impl fmt::Display for LocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCurrentLocation => write!(f, "No current location available"),
            Self::Cancelled => write!(f, "Request cancelled"),
            Self::Denied => write!(f, "Location access denied"),
            Self::InvalidCoordinate { lat, lon } => write!(
                f,
                "Invalid coordinates ({}, {}). Lat: -90..90, Lon: -180..180",
                lat, lon
            ),
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::NotFound(q) => write!(f, "Location not found: '{}'", q),
            Self::InvalidResponse(msg) => write!(f, "Invalid API response: {}", msg),
            Self::Platform(msg) => write!(f, "Location service error: {}", msg),
        }
    }
}

impl std::error::Error for LocationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_validity() {
        assert!(Coordinate::new(59.33, 18.07).is_valid());
        assert!(Coordinate::new(-90.0, 180.0).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, -180.5).is_valid());
    }

    #[test]
    fn test_coordinate_display() {
        assert_eq!(Coordinate::new(21.4225, 39.8262).to_string(), "21.4225\u{00B0}N, 39.8262\u{00B0}E");
        assert_eq!(Coordinate::new(-33.8688, -70.0).to_string(), "33.8688\u{00B0}S, 70.0000\u{00B0}W");
    }

    #[test]
    fn test_only_authorized_is_authorized() {
        assert!(AuthorizationStatus::Authorized.is_authorized());
        assert!(!AuthorizationStatus::Denied.is_authorized());
        assert!(!AuthorizationStatus::Restricted.is_authorized());
        assert!(!AuthorizationStatus::NotDetermined.is_authorized());
    }

    #[test]
    fn test_default_accuracy_is_kilometer() {
        assert_eq!(Accuracy::default(), Accuracy::Kilometer);
        assert_eq!(Accuracy::default().meters(), 1_000.0);
    }

    #[test]
    fn test_accuracy_serde_names() {
        let a: Accuracy = serde_json::from_str("\"hundred_meters\"").unwrap();
        assert_eq!(a, Accuracy::HundredMeters);
    }

    #[test]
    fn test_location_builders() {
        let loc = Location::from_lat_lon(1.0, 2.0).with_altitude(30.0).with_accuracy(5.0);
        assert_eq!(loc.coordinate, Coordinate::new(1.0, 2.0));
        assert_eq!(loc.altitude, Some(30.0));
        assert_eq!(loc.horizontal_accuracy, Some(5.0));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(LocationError::NoCurrentLocation.to_string(), "No current location available");
        assert_eq!(
            LocationError::NotFound("Atlantis".into()).to_string(),
            "Location not found: 'Atlantis'"
        );
    }
}
