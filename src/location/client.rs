//! Seams to the host location services.
//!
//! A [`LocationClient`] produces fixes and authorization changes, a
//! [`Geocoder`] turns addresses into placemarks and back. Both are driven by
//! the [`LocationCoordinator`] and report back on the thread that owns it.

use std::rc::Weak;

use super::coordinator::LocationCoordinator;
use super::types::{Accuracy, AuthorizationStatus, Coordinate, Location, LocationError, Placemark};

/// Completion handed to a [`Geocoder`]. Invoked at most once.
pub type GeocodeCompletion = Box<dyn FnOnce(Result<Vec<Placemark>, LocationError>)>;

/// The host's location client (GPS, network positioning, IP lookup...).
pub trait LocationClient {
    /// Register where fixes, failures and authorization changes are delivered.
    fn attach(&self, sink: EventSink);

    /// Begin delivering fixes to the attached sink. May deliver synchronously.
    fn start_updating(&self);

    fn stop_updating(&self);

    fn authorization_status(&self) -> AuthorizationStatus;

    fn set_accuracy(&self, _accuracy: Accuracy) {}

    /// Straight-line distance in meters.
    fn distance(&self, from: &Location, to: &Location) -> f64;
}

/// The host's geocoding service.
pub trait Geocoder {
    fn geocode(&self, address: &str, completion: GeocodeCompletion);

    fn reverse_geocode(&self, coordinate: Coordinate, completion: GeocodeCompletion);

    /// Abandon in-flight work. Completions of cancelled requests are ignored
    /// by the coordinator whether or not the geocoder still invokes them.
    fn cancel(&self) {}
}

/// Delivery handle given to a [`LocationClient`] on attach.
///
/// Holds the coordinator weakly: events arriving after it is dropped are ignored.
#[derive(Clone)]
pub struct EventSink {
    coordinator: Weak<LocationCoordinator>,
}

impl EventSink {
    pub(crate) fn new(coordinator: Weak<LocationCoordinator>) -> Self {
        Self { coordinator }
    }

    /// A batch of fixes in chronological order.
    pub fn locations_updated(&self, locations: Vec<Location>) {
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.handle_locations(locations);
        }
    }

    pub fn failed(&self, error: LocationError) {
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.handle_failure(error);
        }
    }

    pub fn authorization_changed(&self, status: AuthorizationStatus) {
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.handle_authorization_change(status);
        }
    }

    pub fn is_attached(&self) -> bool {
        self.coordinator.strong_count() > 0
    }
}
