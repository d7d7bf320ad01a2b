//! Location subsystem for waypoint.
//!
//! A [`LocationCoordinator`] sits between callers and the host's location
//! services: it keeps the latest fix, fans events out to listeners, tracks
//! one-shot and geocode requests, and forwards everything else to the
//! injected [`LocationClient`] and [`Geocoder`].

pub mod client;
pub mod coordinator;
pub mod listener;
pub mod providers;
pub mod resolver;
pub mod types;

pub use client::{EventSink, GeocodeCompletion, Geocoder, LocationClient};
pub use coordinator::LocationCoordinator;
pub use listener::{ListenerSet, LocationListener};
pub use providers::{haversine_meters, BuiltinGeocoder, IpLocationClient, NominatimGeocoder};
pub use resolver::FallbackGeocoder;
pub use types::{Accuracy, AuthorizationStatus, Coordinate, Location, LocationError, Placemark};
