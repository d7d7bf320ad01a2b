//! Geocoder fallback chain.
//!
//! Forward:  primary → (network failure or no results) → fallback on the simplified query
//! Reverse:  primary → (network failure or no results) → fallback

use std::rc::Rc;

use tracing::debug;

use super::client::{GeocodeCompletion, Geocoder};
use super::types::{Coordinate, LocationError, Placemark};

/// Tries `primary` first and consults `fallback` when it is unreachable or
/// finds nothing. Other errors from `primary` are passed through.
pub struct FallbackGeocoder {
    primary: Rc<dyn Geocoder>,
    fallback: Rc<dyn Geocoder>,
}

impl FallbackGeocoder {
    pub fn new(primary: Rc<dyn Geocoder>, fallback: Rc<dyn Geocoder>) -> Self {
        Self { primary, fallback }
    }
}

fn needs_fallback(result: &Result<Vec<Placemark>, LocationError>) -> bool {
    match result {
        Ok(placemarks) => placemarks.is_empty(),
        Err(LocationError::Network(_)) => true,
        Err(_) => false,
    }
}

impl Geocoder for FallbackGeocoder {
    fn geocode(&self, address: &str, completion: GeocodeCompletion) {
        let fallback = self.fallback.clone();
        let simplified = simplify_query(address);
        self.primary.geocode(
            address,
            Box::new(move |result: Result<Vec<Placemark>, LocationError>| {
                if needs_fallback(&result) {
                    debug!(query = %simplified, "primary geocoder gave nothing, using fallback");
                    fallback.geocode(&simplified, completion);
                } else {
                    completion(result);
                }
            }),
        );
    }

    fn reverse_geocode(&self, coordinate: Coordinate, completion: GeocodeCompletion) {
        let fallback = self.fallback.clone();
        self.primary.reverse_geocode(
            coordinate,
            Box::new(move |result: Result<Vec<Placemark>, LocationError>| {
                if needs_fallback(&result) {
                    debug!(%coordinate, "primary reverse geocoder gave nothing, using fallback");
                    fallback.reverse_geocode(coordinate, completion);
                } else {
                    completion(result);
                }
            }),
        );
    }

    fn cancel(&self) {
        self.primary.cancel();
        self.fallback.cancel();
    }
}

/// Simplify a query for retry: lowercase, strip accents/diacritics, collapse spaces.
fn simplify_query(q: &str) -> String {
    q.to_lowercase()
        .replace('ø', "o")
        .replace('å', "a")
        .replace('ä', "a")
        .replace('ö', "o")
        .replace('ü', "u")
        .replace('ß', "ss")
        .replace(['é', 'è', 'ê'], "e")
        .replace('ñ', "n")
        .replace(['ã', 'á'], "a")
        .replace('õ', "o")
        .replace('ç', "c")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
