//! Listener capability trait and the weak registry that fans events out.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::types::{AuthorizationStatus, Location, LocationError};

/// Receives coordinator events. Every method is optional.
pub trait LocationListener {
    /// `locations` is in chronological order, latest last.
    fn on_locations_updated(&self, _locations: &[Location]) {}

    fn on_location_failed(&self, _error: &LocationError) {}

    fn on_authorization_changed(&self, _status: AuthorizationStatus) {}
}

/// Listeners held weakly: registering never extends a listener's lifetime.
#[derive(Default)]
pub struct ListenerSet {
    entries: RefCell<Vec<Weak<dyn LocationListener>>>,
}

fn same_listener(a: &Weak<dyn LocationListener>, b: &Weak<dyn LocationListener>) -> bool {
    std::ptr::eq(a.as_ptr() as *const (), b.as_ptr() as *const ())
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the listener was already registered.
    pub fn insert(&self, listener: Weak<dyn LocationListener>) -> bool {
        let mut entries = self.entries.borrow_mut();
        entries.retain(|w| w.strong_count() > 0);
        if entries.iter().any(|w| same_listener(w, &listener)) {
            return false;
        }
        entries.push(listener);
        true
    }

    /// Returns false if the listener was not registered.
    pub fn remove(&self, listener: &Weak<dyn LocationListener>) -> bool {
        let mut entries = self.entries.borrow_mut();
        let mut found = false;
        entries.retain(|w| {
            if same_listener(w, listener) {
                found = true;
                return false;
            }
            w.strong_count() > 0
        });
        found
    }

    /// Number of registered listeners that are still alive.
    pub fn len(&self) -> usize {
        self.entries.borrow().iter().filter(|w| w.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Upgrade live listeners, dropping dead ones. Callers iterate the
    /// snapshot so listeners may register or unregister while being notified.
    fn snapshot(&self) -> Vec<Rc<dyn LocationListener>> {
        let mut entries = self.entries.borrow_mut();
        entries.retain(|w| w.strong_count() > 0);
        entries.iter().filter_map(Weak::upgrade).collect()
    }

    pub fn notify_locations(&self, locations: &[Location]) {
        for listener in self.snapshot() {
            listener.on_locations_updated(locations);
        }
    }

    pub fn notify_failure(&self, error: &LocationError) {
        for listener in self.snapshot() {
            listener.on_location_failed(error);
        }
    }

    pub fn notify_authorization(&self, status: AuthorizationStatus) {
        for listener in self.snapshot() {
            listener.on_authorization_changed(status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct Counter {
        updates: Cell<usize>,
    }

    impl LocationListener for Counter {
        fn on_locations_updated(&self, _locations: &[Location]) {
            self.updates.set(self.updates.get() + 1);
        }
    }

    struct Silent;

    impl LocationListener for Silent {}

    fn weak_of<L: LocationListener + 'static>(rc: &Rc<L>) -> Weak<dyn LocationListener> {
        Rc::downgrade(rc) as Weak<dyn LocationListener>
    }

    #[test]
    fn test_insert_is_idempotent() {
        let set = ListenerSet::new();
        let counter = Rc::new(Counter::default());
        assert!(set.insert(weak_of(&counter)));
        assert!(!set.insert(weak_of(&counter)));
        assert_eq!(set.len(), 1);

        set.notify_locations(&[Location::from_lat_lon(0.0, 0.0)]);
        assert_eq!(counter.updates.get(), 1);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let set = ListenerSet::new();
        let counter = Rc::new(Counter::default());
        assert!(!set.remove(&weak_of(&counter)));
        assert!(set.is_empty());
    }

    #[test]
    fn test_dropped_listener_is_pruned() {
        let set = ListenerSet::new();
        let counter = Rc::new(Counter::default());
        set.insert(weak_of(&counter));
        drop(counter);
        assert_eq!(set.len(), 0);
        set.notify_locations(&[Location::from_lat_lon(0.0, 0.0)]);
    }

    #[test]
    fn test_missing_capabilities_are_skipped() {
        let set = ListenerSet::new();
        let silent = Rc::new(Silent);
        set.insert(weak_of(&silent));
        set.notify_failure(&LocationError::Denied);
        set.notify_authorization(AuthorizationStatus::Denied);
        set.notify_locations(&[]);
        assert_eq!(set.len(), 1);
    }
}
