//! Location coordination over pluggable location and geocoding services.

pub mod config;
pub mod location;

pub use config::{ConfigError, CoordinatorConfig};
pub use location::{
    Accuracy, AuthorizationStatus, Coordinate, Geocoder, Location, LocationClient, LocationCoordinator,
    LocationError, LocationListener, Placemark,
};
