//! The location coordinator: one current fix, listener fan-out, one-shot
//! bookkeeping and cancellable geocoding over injected location services.
//!
//! Everything runs on the thread that owns the coordinator. No `RefCell`
//! borrow is held while a collaborator, a listener or a caller callback
//! runs, so any of them may call back into the coordinator.
//!
//! Delivery policy: the client runs while a continuous subscription
//! ([`LocationCoordinator::start_update_location`]) or a pending one-shot
//! request exists. Stopping the subscription with a one-shot outstanding
//! keeps the client running until that one-shot resolves.

use std::cell::RefCell;
use std::future::Future;
use std::rc::{Rc, Weak};

use futures::channel::oneshot;
use tracing::{debug, warn};

use super::client::{EventSink, GeocodeCompletion, Geocoder, LocationClient};
use super::listener::{ListenerSet, LocationListener};
use super::types::{Accuracy, AuthorizationStatus, Coordinate, Location, LocationError, Placemark};
use crate::config::CoordinatorConfig;

type OnceCallback = Box<dyn FnOnce(Result<Location, LocationError>)>;

#[derive(Default)]
struct State {
    current: Option<Location>,
    accuracy: Accuracy,
    /// A continuous subscription is open.
    continuous: bool,
    /// The client has been started and not stopped since.
    active: bool,
    pending_once: Option<OnceCallback>,
    pending_geocode: Option<u64>,
    next_geocode_token: u64,
}

pub struct LocationCoordinator {
    client: Rc<dyn LocationClient>,
    geocoder: Rc<dyn Geocoder>,
    listeners: ListenerSet,
    state: RefCell<State>,
    notify_on_manual_set: bool,
    this: Weak<LocationCoordinator>,
}

impl LocationCoordinator {
    /// Build a coordinator and attach it to `client`.
    pub fn new(
        client: Rc<dyn LocationClient>,
        geocoder: Rc<dyn Geocoder>,
        config: &CoordinatorConfig,
    ) -> Rc<Self> {
        let coordinator = Rc::new_cyclic(|this| Self {
            client,
            geocoder,
            listeners: ListenerSet::new(),
            state: RefCell::new(State {
                accuracy: config.accuracy,
                ..State::default()
            }),
            notify_on_manual_set: config.notify_on_manual_set,
            this: this.clone(),
        });
        coordinator.client.attach(EventSink::new(Rc::downgrade(&coordinator)));
        coordinator.client.set_accuracy(config.accuracy);
        coordinator
    }

    // ─── Listeners ──────────────────────────────────────────────

    pub fn add_listener<L: LocationListener + 'static>(&self, listener: &Rc<L>) {
        let weak = Rc::downgrade(listener) as Weak<dyn LocationListener>;
        self.listeners.insert(weak);
    }

    pub fn remove_listener<L: LocationListener + 'static>(&self, listener: &Rc<L>) {
        let weak = Rc::downgrade(listener) as Weak<dyn LocationListener>;
        self.listeners.remove(&weak);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    // ─── Status ─────────────────────────────────────────────────

    /// Always asks the client; never cached.
    pub fn authorization_status(&self) -> AuthorizationStatus {
        self.client.authorization_status()
    }

    pub fn is_geocoding(&self) -> bool {
        self.state.borrow().pending_geocode.is_some()
    }

    pub fn is_updating_location(&self) -> bool {
        self.state.borrow().active
    }

    pub fn accuracy(&self) -> Accuracy {
        self.state.borrow().accuracy
    }

    pub fn set_accuracy(&self, accuracy: Accuracy) {
        self.state.borrow_mut().accuracy = accuracy;
        self.client.set_accuracy(accuracy);
    }

    // ─── Current location ───────────────────────────────────────

    pub fn current_location(&self) -> Option<Location> {
        self.state.borrow().current.clone()
    }

    /// Override the current location without involving the client.
    pub fn set_current_location(&self, location: Location) {
        self.state.borrow_mut().current = Some(location.clone());
        if self.notify_on_manual_set {
            self.listeners.notify_locations(std::slice::from_ref(&location));
        }
    }

    pub fn set_current_location_with_coordinates(&self, coordinate: Coordinate) {
        self.set_current_location(Location::new(coordinate));
    }

    pub fn set_current_location_with_latitude_longitude(&self, lat: f64, lon: f64) {
        self.set_current_location_with_coordinates(Coordinate::new(lat, lon));
    }

    /// Forward-geocode `address` and adopt the first placemark as the current
    /// location. The current location is untouched on failure.
    pub fn set_current_location_by_address<F>(&self, address: &str, callback: F)
    where
        F: FnOnce(Result<Placemark, LocationError>) + 'static,
    {
        let this = self.this.clone();
        let query = address.to_string();
        self.geocode_address_string(address, move |result| {
            let outcome = result.and_then(|placemarks| {
                placemarks.into_iter().next().ok_or(LocationError::NotFound(query))
            });
            if let (Ok(placemark), Some(coordinator)) = (&outcome, this.upgrade()) {
                coordinator.set_current_location(placemark.location());
            }
            callback(outcome);
        });
    }

    // ─── Location updates ───────────────────────────────────────

    /// Open a continuous subscription. Idempotent.
    pub fn start_update_location(&self) {
        self.state.borrow_mut().continuous = true;
        self.ensure_started();
    }

    /// Close the continuous subscription. Idempotent. A pending one-shot
    /// request still gets its fix before the client stops.
    pub fn stop_updating_location(&self) {
        self.state.borrow_mut().continuous = false;
        self.stop_if_idle();
    }

    /// Deliver the next fix to `callback`, superseding any earlier one-shot
    /// request; the superseded callback is dropped without being called.
    pub fn update_location_once<F>(&self, callback: F)
    where
        F: FnOnce(Result<Location, LocationError>) + 'static,
    {
        let previous = self.state.borrow_mut().pending_once.replace(Box::new(callback));
        if previous.is_some() {
            debug!("one-shot location request superseded");
        }
        self.ensure_started();
    }

    fn ensure_started(&self) {
        let start = {
            let mut state = self.state.borrow_mut();
            !std::mem::replace(&mut state.active, true)
        };
        if start {
            debug!("starting location client");
            self.client.start_updating();
        }
    }

    fn stop_if_idle(&self) {
        let stop = {
            let mut state = self.state.borrow_mut();
            if state.active && !state.continuous && state.pending_once.is_none() {
                state.active = false;
                true
            } else {
                false
            }
        };
        if stop {
            debug!("stopping location client");
            self.client.stop_updating();
        }
    }

    pub(crate) fn handle_locations(&self, locations: Vec<Location>) {
        let Some(latest) = locations.last().cloned() else {
            return;
        };
        let once = {
            let mut state = self.state.borrow_mut();
            state.current = Some(latest.clone());
            state.pending_once.take()
        };
        self.listeners.notify_locations(&locations);
        if let Some(callback) = once {
            self.stop_if_idle();
            callback(Ok(latest));
        }
    }

    pub(crate) fn handle_failure(&self, error: LocationError) {
        warn!(%error, "location client failed");
        let once = self.state.borrow_mut().pending_once.take();
        self.listeners.notify_failure(&error);
        if let Some(callback) = once {
            self.stop_if_idle();
            callback(Err(error));
        }
    }

    pub(crate) fn handle_authorization_change(&self, status: AuthorizationStatus) {
        debug!(%status, "authorization changed");
        self.listeners.notify_authorization(status);
    }

    // ─── Geocoding ──────────────────────────────────────────────

    pub fn geocode_address_string<F>(&self, address: &str, callback: F)
    where
        F: FnOnce(Result<Vec<Placemark>, LocationError>) + 'static,
    {
        let token = self.begin_geocode();
        debug!(address, token, "forward geocode");
        self.geocoder.geocode(address, self.guard(token, callback));
    }

    pub fn reverse_geocode_location<F>(&self, location: &Location, callback: F)
    where
        F: FnOnce(Result<Vec<Placemark>, LocationError>) + 'static,
    {
        self.reverse_geocode_coordinates(location.coordinate, callback);
    }

    pub fn reverse_geocode_coordinates<F>(&self, coordinate: Coordinate, callback: F)
    where
        F: FnOnce(Result<Vec<Placemark>, LocationError>) + 'static,
    {
        let token = self.begin_geocode();
        debug!(%coordinate, token, "reverse geocode");
        self.geocoder.reverse_geocode(coordinate, self.guard(token, callback));
    }

    pub fn reverse_geocode_latitude_longitude<F>(&self, lat: f64, lon: f64, callback: F)
    where
        F: FnOnce(Result<Vec<Placemark>, LocationError>) + 'static,
    {
        self.reverse_geocode_coordinates(Coordinate::new(lat, lon), callback);
    }

    /// Fails with [`LocationError::NoCurrentLocation`] before any fix is known.
    pub fn reverse_geocode_current_location<F>(&self, callback: F)
    where
        F: FnOnce(Result<Vec<Placemark>, LocationError>) + 'static,
    {
        match self.current_location() {
            Some(location) => self.reverse_geocode_location(&location, callback),
            None => callback(Err(LocationError::NoCurrentLocation)),
        }
    }

    /// Drop the pending geocode request. Its callback will not be invoked.
    pub fn cancel_geocode(&self) {
        let cancelled = self.state.borrow_mut().pending_geocode.take();
        if let Some(token) = cancelled {
            debug!(token, "geocode cancelled");
            self.geocoder.cancel();
        }
    }

    fn begin_geocode(&self) -> u64 {
        let (token, superseded) = {
            let mut state = self.state.borrow_mut();
            state.next_geocode_token += 1;
            let token = state.next_geocode_token;
            (token, state.pending_geocode.replace(token))
        };
        if let Some(previous) = superseded {
            debug!(previous, "geocode superseded");
            self.geocoder.cancel();
        }
        token
    }

    /// Wrap `callback` so it only runs if `token` is still the pending request.
    fn guard<F>(&self, token: u64, callback: F) -> GeocodeCompletion
    where
        F: FnOnce(Result<Vec<Placemark>, LocationError>) + 'static,
    {
        let this = self.this.clone();
        Box::new(move |result: Result<Vec<Placemark>, LocationError>| {
            let Some(coordinator) = this.upgrade() else {
                return;
            };
            let current = {
                let mut state = coordinator.state.borrow_mut();
                if state.pending_geocode == Some(token) {
                    state.pending_geocode = None;
                    true
                } else {
                    false
                }
            };
            if current {
                callback(result);
            }
        })
    }

    // ─── Distance ───────────────────────────────────────────────

    /// Distance in meters, as computed by the location client.
    pub fn distance_from_location(&self, from: &Location, to: &Location) -> f64 {
        self.client.distance(from, to)
    }

    pub fn distance_from_current_location_to_location(&self, to: &Location) -> Result<f64, LocationError> {
        let current = self.current_location().ok_or(LocationError::NoCurrentLocation)?;
        Ok(self.client.distance(&current, to))
    }

    // ─── Futures ────────────────────────────────────────────────
    //
    // A superseded or cancelled request drops its callback, which drops the
    // sender; the future then resolves to `Cancelled`.

    pub fn locate_once(&self) -> impl Future<Output = Result<Location, LocationError>> {
        let (tx, rx) = oneshot::channel();
        self.update_location_once(move |result| {
            let _ = tx.send(result);
        });
        async move { rx.await.unwrap_or(Err(LocationError::Cancelled)) }
    }

    pub fn geocode(&self, address: &str) -> impl Future<Output = Result<Vec<Placemark>, LocationError>> {
        let (tx, rx) = oneshot::channel();
        self.geocode_address_string(address, move |result| {
            let _ = tx.send(result);
        });
        async move { rx.await.unwrap_or(Err(LocationError::Cancelled)) }
    }

    pub fn reverse_geocode(
        &self,
        coordinate: Coordinate,
    ) -> impl Future<Output = Result<Vec<Placemark>, LocationError>> {
        let (tx, rx) = oneshot::channel();
        self.reverse_geocode_coordinates(coordinate, move |result| {
            let _ = tx.send(result);
        });
        async move { rx.await.unwrap_or(Err(LocationError::Cancelled)) }
    }

    pub fn locate_by_address(&self, address: &str) -> impl Future<Output = Result<Placemark, LocationError>> {
        let (tx, rx) = oneshot::channel();
        self.set_current_location_by_address(address, move |result| {
            let _ = tx.send(result);
        });
        async move { rx.await.unwrap_or(Err(LocationError::Cancelled)) }
    }
}
