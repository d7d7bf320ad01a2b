//! Location providers: Nominatim geocoding, IP geolocation, and a built-in
//! offline city dataset.
//!
//! The HTTP providers are blocking and invoke their completions before
//! returning, which keeps them usable from the coordinator's thread without
//! an executor.

use std::cell::{Cell, RefCell};

use geo::{HaversineDistance, Point};
use serde::Deserialize;
use tracing::debug;

use super::client::{EventSink, GeocodeCompletion, Geocoder, LocationClient};
use super::types::{AuthorizationStatus, Coordinate, Location, LocationError, Placemark};
use crate::config::CoordinatorConfig;

/// Great-circle distance in meters.
pub fn haversine_meters(a: Coordinate, b: Coordinate) -> f64 {
    Point::new(a.lon, a.lat).haversine_distance(&Point::new(b.lon, b.lat))
}

// ─── Built-in dataset ───────────────────────────────────────────

struct BuiltinCity {
    names: &'static [&'static str], // canonical + aliases
    lat: f64,
    lon: f64,
    country: &'static str,
    country_code: &'static str,
}

const BUILTIN_CITIES: &[BuiltinCity] = &[
    BuiltinCity { names: &["mecca", "makkah", "mekka"], lat: 21.4225, lon: 39.8262, country: "Saudi Arabia", country_code: "SA" },
    BuiltinCity { names: &["medina", "madinah", "al-madinah"], lat: 24.4686, lon: 39.6142, country: "Saudi Arabia", country_code: "SA" },
    BuiltinCity { names: &["riyadh"], lat: 24.7136, lon: 46.6753, country: "Saudi Arabia", country_code: "SA" },
    BuiltinCity { names: &["stockholm"], lat: 59.3293, lon: 18.0686, country: "Sweden", country_code: "SE" },
    BuiltinCity { names: &["oslo"], lat: 59.9139, lon: 10.7522, country: "Norway", country_code: "NO" },
    BuiltinCity { names: &["tromso", "tromsø", "tromsoe"], lat: 69.6492, lon: 18.9553, country: "Norway", country_code: "NO" },
    BuiltinCity { names: &["longyearbyen", "svalbard"], lat: 78.2232, lon: 15.6267, country: "Norway", country_code: "NO" },
    BuiltinCity { names: &["new york", "newyork", "nyc"], lat: 40.7128, lon: -74.0060, country: "United States", country_code: "US" },
    BuiltinCity { names: &["los angeles"], lat: 34.0522, lon: -118.2437, country: "United States", country_code: "US" },
    BuiltinCity { names: &["london"], lat: 51.5074, lon: -0.1278, country: "United Kingdom", country_code: "GB" },
    BuiltinCity { names: &["paris"], lat: 48.8566, lon: 2.3522, country: "France", country_code: "FR" },
    BuiltinCity { names: &["berlin"], lat: 52.5200, lon: 13.4050, country: "Germany", country_code: "DE" },
    BuiltinCity { names: &["moscow", "moskva"], lat: 55.7558, lon: 37.6173, country: "Russia", country_code: "RU" },
    BuiltinCity { names: &["istanbul"], lat: 41.0082, lon: 28.9784, country: "Turkey", country_code: "TR" },
    BuiltinCity { names: &["cairo", "al-qahirah"], lat: 30.0444, lon: 31.2357, country: "Egypt", country_code: "EG" },
    BuiltinCity { names: &["casablanca"], lat: 33.5731, lon: -7.5898, country: "Morocco", country_code: "MA" },
    BuiltinCity { names: &["lagos"], lat: 6.5244, lon: 3.3792, country: "Nigeria", country_code: "NG" },
    BuiltinCity { names: &["nairobi"], lat: -1.2921, lon: 36.8219, country: "Kenya", country_code: "KE" },
    BuiltinCity { names: &["dubai"], lat: 25.2048, lon: 55.2708, country: "United Arab Emirates", country_code: "AE" },
    BuiltinCity { names: &["tehran"], lat: 35.6892, lon: 51.3890, country: "Iran", country_code: "IR" },
    BuiltinCity { names: &["karachi"], lat: 24.8607, lon: 67.0011, country: "Pakistan", country_code: "PK" },
    BuiltinCity { names: &["mumbai", "bombay"], lat: 19.0760, lon: 72.8777, country: "India", country_code: "IN" },
    BuiltinCity { names: &["delhi", "new delhi"], lat: 28.6139, lon: 77.2090, country: "India", country_code: "IN" },
    BuiltinCity { names: &["dhaka", "dacca"], lat: 23.8103, lon: 90.4125, country: "Bangladesh", country_code: "BD" },
    BuiltinCity { names: &["jakarta"], lat: -6.2088, lon: 106.8456, country: "Indonesia", country_code: "ID" },
    BuiltinCity { names: &["kuala lumpur"], lat: 3.1390, lon: 101.6869, country: "Malaysia", country_code: "MY" },
    BuiltinCity { names: &["tokyo"], lat: 35.6762, lon: 139.6503, country: "Japan", country_code: "JP" },
    BuiltinCity { names: &["sydney"], lat: -33.8688, lon: 151.2093, country: "Australia", country_code: "AU" },
];

/// Compute edit distance between two strings (Levenshtein).
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (m, n) = (a.len(), b.len());

    let mut prev = (0..=n).collect::<Vec<_>>();
    let mut curr = vec![0; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[n]
}

/// Search the built-in dataset: exact name or alias, then substring, then
/// edit distance <= 2.
pub fn builtin_lookup(query: &str, country: Option<&str>) -> Option<Placemark> {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return None;
    }
    let country_filter = country.map(|c| c.to_uppercase());
    let candidates: Vec<&BuiltinCity> = BUILTIN_CITIES
        .iter()
        .filter(|c| country_filter.as_deref().map_or(true, |cc| c.country_code == cc))
        .collect();

    if let Some(city) = candidates.iter().find(|c| c.names.contains(&q.as_str())) {
        return Some(builtin_placemark(city));
    }

    if let Some(city) = candidates
        .iter()
        .find(|c| c.names.iter().any(|name| name.len() >= 4 && (name.contains(&q) || q.contains(name))))
    {
        return Some(builtin_placemark(city));
    }

    let q = q.as_str();
    candidates
        .iter()
        .flat_map(|city| city.names.iter().map(move |name| (city, edit_distance(q, name))))
        .filter(|(_, dist)| *dist <= 2)
        .min_by_key(|(_, dist)| *dist)
        .map(|(city, _)| builtin_placemark(city))
}

/// The built-in city nearest to `coordinate`, if within `radius_km`.
pub fn builtin_nearest(coordinate: Coordinate, radius_km: f64) -> Option<Placemark> {
    BUILTIN_CITIES
        .iter()
        .map(|city| (city, haversine_meters(coordinate, Coordinate::new(city.lat, city.lon))))
        .filter(|(_, meters)| *meters <= radius_km * 1_000.0)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(city, _)| builtin_placemark(city))
}

fn builtin_placemark(city: &BuiltinCity) -> Placemark {
    Placemark {
        name: city.names[0].to_string(),
        coordinate: Coordinate::new(city.lat, city.lon),
        display_name: None,
        locality: Some(city.names[0].to_string()),
        country: Some(city.country.to_string()),
        country_code: Some(city.country_code.to_string()),
    }
}

/// Offline geocoder over the built-in dataset. Completes synchronously.
#[derive(Debug, Clone)]
pub struct BuiltinGeocoder {
    country: Option<String>,
    radius_km: f64,
}

impl BuiltinGeocoder {
    pub fn new(config: &CoordinatorConfig) -> Self {
        Self {
            country: None,
            radius_km: config.builtin_radius_km,
        }
    }

    pub fn with_country(mut self, country: Option<String>) -> Self {
        self.country = country;
        self
    }
}

impl Geocoder for BuiltinGeocoder {
    fn geocode(&self, address: &str, completion: GeocodeCompletion) {
        let (city, parsed_country) = parse_query_with_hint(address);
        let country = self.country.as_deref().or(parsed_country.as_deref());
        completion(Ok(builtin_lookup(&city, country).into_iter().collect()));
    }

    fn reverse_geocode(&self, coordinate: Coordinate, completion: GeocodeCompletion) {
        completion(Ok(builtin_nearest(coordinate, self.radius_km).into_iter().collect()));
    }
}

/// Parse "Medina, Saudi Arabia" → ("Medina", Some("SA"))
/// Parse "Medina" → ("Medina", None)
fn parse_query_with_hint(query: &str) -> (String, Option<String>) {
    if let Some((city, hint)) = query.split_once(',') {
        let hint = hint.trim();
        if hint.len() == 2 && hint.chars().all(|c| c.is_ascii_alphabetic()) {
            return (city.trim().to_string(), Some(hint.to_uppercase()));
        }
        if let Some(code) = country_name_to_code(hint) {
            return (city.trim().to_string(), Some(code));
        }
    }
    (query.to_string(), None)
}

// ─── Nominatim provider ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct NominatimResult {
    lat: String,
    lon: String,
    display_name: String,
    #[serde(default)]
    importance: Option<f64>,
    #[serde(default, rename = "type")]
    place_type: Option<String>,
    #[serde(default, rename = "class")]
    place_class: Option<String>,
    #[serde(default)]
    address: Option<NominatimAddress>,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
}

impl NominatimAddress {
    fn locality(&self) -> Option<String> {
        self.city.clone().or_else(|| self.town.clone()).or_else(|| self.village.clone())
    }
}

#[derive(Debug, Deserialize)]
struct NominatimReverse {
    #[serde(flatten)]
    result: Option<NominatimResult>,
    #[serde(default)]
    error: Option<String>,
}

// ─── Scoring weights ─────────────────────────────────────────────

const W_IMPORTANCE: f64 = 0.40;
const W_TYPE: f64 = 0.25;
const W_NAME: f64 = 0.20;
const W_COUNTRY: f64 = 0.15;

/// Single-token queries matching these get their expected country boosted.
const WELL_KNOWN_CITIES: &[(&str, &str)] = &[
    ("medina", "SA"), ("madinah", "SA"),
    ("mecca", "SA"), ("makkah", "SA"),
    ("riyadh", "SA"), ("cairo", "EG"),
    ("istanbul", "TR"), ("paris", "FR"),
    ("london", "GB"), ("berlin", "DE"),
    ("rome", "IT"), ("moscow", "RU"),
    ("tokyo", "JP"), ("delhi", "IN"),
    ("mumbai", "IN"), ("karachi", "PK"),
    ("tehran", "IR"), ("dubai", "AE"),
    ("lima", "PE"), ("santiago", "CL"),
    ("athens", "GR"), ("vienna", "AT"),
    ("lisbon", "PT"), ("nairobi", "KE"),
    ("lagos", "NG"), ("dhaka", "BD"),
];

fn type_rank(place_type: &str, place_class: &str) -> f64 {
    match (place_class, place_type) {
        ("place", "city") | ("boundary", "administrative") => 1.0,
        ("place", "town") => 0.8,
        ("place", "village") => 0.4,
        ("place", "hamlet") => 0.2,
        _ => 0.5,
    }
}

fn name_similarity(query: &str, display_name: &str) -> f64 {
    let q = query.to_lowercase();
    let first_component = display_name.split(',').next().unwrap_or("").trim().to_lowercase();
    if first_component == q {
        1.0
    } else if first_component.contains(&q) || q.contains(&first_component) {
        0.8
    } else if edit_distance(&q, &first_component) <= 2 {
        0.6
    } else {
        0.3
    }
}

fn country_name_to_code(name: &str) -> Option<String> {
    let code = match name.trim().to_lowercase().as_str() {
        "saudi arabia" | "saudi" | "ksa" => "SA",
        "united states" | "united states of america" | "usa" => "US",
        "united kingdom" | "uk" | "great britain" | "england" => "GB",
        "france" => "FR",
        "germany" | "deutschland" => "DE",
        "italy" | "italia" => "IT",
        "spain" | "españa" => "ES",
        "russia" | "russian federation" => "RU",
        "china" => "CN",
        "japan" => "JP",
        "india" => "IN",
        "pakistan" => "PK",
        "iran" => "IR",
        "turkey" | "türkiye" => "TR",
        "egypt" => "EG",
        "united arab emirates" | "uae" => "AE",
        "nigeria" => "NG",
        "kenya" => "KE",
        "morocco" => "MA",
        "australia" => "AU",
        "indonesia" => "ID",
        "malaysia" => "MY",
        "bangladesh" => "BD",
        "canada" => "CA",
        "mexico" | "méxico" => "MX",
        "brazil" | "brasil" => "BR",
        "sweden" | "sverige" => "SE",
        "norway" | "norge" => "NO",
        "denmark" | "danmark" => "DK",
        "finland" | "suomi" => "FI",
        "netherlands" | "nederland" => "NL",
        _ => return None,
    };
    Some(code.to_string())
}

fn country_code_of(result: &NominatimResult) -> Option<String> {
    result
        .address
        .as_ref()
        .and_then(|a| a.country_code.as_deref())
        .map(str::to_uppercase)
        .or_else(|| {
            // display_name ends with the country
            let last = result.display_name.split(',').next_back()?;
            country_name_to_code(last)
        })
}

fn score_candidate(query: &str, candidate: &NominatimResult, country_hint: Option<&str>) -> f64 {
    let importance = candidate.importance.unwrap_or(0.3);
    let type_score = type_rank(
        candidate.place_type.as_deref().unwrap_or("unknown"),
        candidate.place_class.as_deref().unwrap_or("unknown"),
    );
    let name_score = name_similarity(query, &candidate.display_name);

    let country = country_code_of(candidate).unwrap_or_default();
    let q_lower = query.to_lowercase();
    let country_score = match country_hint {
        Some(hint) if country == hint.to_uppercase() => 1.0,
        Some(_) => 0.0,
        None => match WELL_KNOWN_CITIES.iter().find(|(name, _)| *name == q_lower) {
            Some((_, expected)) if country == *expected => 1.0,
            Some(_) => 0.1,
            None => 0.5,
        },
    };

    W_IMPORTANCE * importance + W_TYPE * type_score + W_NAME * name_score + W_COUNTRY * country_score
}

fn placemark_from_nominatim(result: &NominatimResult) -> Result<Placemark, LocationError> {
    let lat: f64 = result
        .lat
        .parse()
        .map_err(|_| LocationError::InvalidResponse(format!("bad latitude '{}'", result.lat)))?;
    let lon: f64 = result
        .lon
        .parse()
        .map_err(|_| LocationError::InvalidResponse(format!("bad longitude '{}'", result.lon)))?;
    let address = result.address.as_ref();
    let name = result.display_name.split(',').next().unwrap_or("").trim().to_string();

    Ok(Placemark {
        name,
        coordinate: Coordinate::new(lat, lon),
        display_name: Some(result.display_name.clone()),
        locality: address.and_then(NominatimAddress::locality),
        country: address.and_then(|a| a.country.clone()),
        country_code: country_code_of(result),
    })
}

/// Rank raw search results best first and convert them.
fn rank_results(
    query: &str,
    results: Vec<NominatimResult>,
    country_hint: Option<&str>,
    limit: usize,
) -> Result<Vec<Placemark>, LocationError> {
    let mut scored: Vec<(f64, NominatimResult)> = results
        .into_iter()
        .map(|r| (score_candidate(query, &r, country_hint), r))
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.iter().take(limit).map(|(_, r)| placemark_from_nominatim(r)).collect()
}

/// OpenStreetMap Nominatim geocoder. Blocking; completes before returning.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    base_url: String,
    user_agent: String,
    country: Option<String>,
    limit: usize,
}

impl NominatimGeocoder {
    pub fn new(config: &CoordinatorConfig) -> Self {
        Self {
            base_url: config.nominatim_url.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
            country: None,
            limit: config.result_limit.max(1),
        }
    }

    /// Restrict results to an ISO 3166-1 alpha-2 country.
    pub fn with_country(mut self, country: Option<String>) -> Self {
        self.country = country.map(|c| c.to_uppercase());
        self
    }

    pub fn search(&self, query: &str) -> Result<Vec<Placemark>, LocationError> {
        let (city_query, parsed_country) = parse_query_with_hint(query);
        let country_hint = self.country.as_deref().or(parsed_country.as_deref());
        let country_param = country_hint
            .map(|cc| format!("&countrycodes={}", url_encode(&cc.to_lowercase())))
            .unwrap_or_default();

        let url = format!(
            "{}/search?q={}&format=json&limit={}&addressdetails=1{}",
            self.base_url,
            url_encode(&city_query),
            self.limit.clamp(3, 10),
            country_param,
        );
        debug!(%url, "nominatim search");

        let results: Vec<NominatimResult> = ureq::get(&url)
            .set("User-Agent", &self.user_agent)
            .call()
            .map_err(|e| LocationError::Network(e.to_string()))?
            .into_json()
            .map_err(|e| LocationError::InvalidResponse(e.to_string()))?;

        rank_results(&city_query, results, country_hint, self.limit)
    }

    pub fn reverse(&self, coordinate: Coordinate) -> Result<Vec<Placemark>, LocationError> {
        let url = format!(
            "{}/reverse?lat={}&lon={}&format=json&addressdetails=1",
            self.base_url, coordinate.lat, coordinate.lon,
        );
        debug!(%url, "nominatim reverse");

        let reply: NominatimReverse = ureq::get(&url)
            .set("User-Agent", &self.user_agent)
            .call()
            .map_err(|e| LocationError::Network(e.to_string()))?
            .into_json()
            .map_err(|e| LocationError::InvalidResponse(e.to_string()))?;

        reverse_placemarks(reply)
    }
}

/// Nominatim answers "nothing here" with an `error` field rather than a status.
fn reverse_placemarks(reply: NominatimReverse) -> Result<Vec<Placemark>, LocationError> {
    match (reply.result, reply.error) {
        (Some(result), None) => Ok(vec![placemark_from_nominatim(&result)?]),
        (_, Some(error)) => {
            debug!(%error, "nominatim reverse found nothing");
            Ok(vec![])
        }
        (None, None) => Err(LocationError::InvalidResponse("empty reverse response".into())),
    }
}

impl Geocoder for NominatimGeocoder {
    fn geocode(&self, address: &str, completion: GeocodeCompletion) {
        completion(self.search(address));
    }

    fn reverse_geocode(&self, coordinate: Coordinate, completion: GeocodeCompletion) {
        completion(self.reverse(coordinate));
    }
}

// ─── IP-based geolocation ───────────────────────────────────────

/// IP lookups are city-level at best.
const IP_ACCURACY_METERS: f64 = 5_000.0;

#[derive(Debug, Deserialize)]
struct IpApiResult {
    latitude: Option<f64>,
    longitude: Option<f64>,
    city: Option<String>,
    country_name: Option<String>,
    country_code: Option<String>,
    #[serde(default)]
    error: bool,
    #[serde(default)]
    reason: Option<String>,
}

fn parse_ip_result(r: IpApiResult) -> Result<(Location, Placemark), LocationError> {
    if r.error {
        return Err(LocationError::Network(r.reason.unwrap_or_else(|| "lookup refused".into())));
    }
    let lat = r.latitude.ok_or_else(|| LocationError::InvalidResponse("no latitude".into()))?;
    let lon = r.longitude.ok_or_else(|| LocationError::InvalidResponse("no longitude".into()))?;
    let coordinate = Coordinate::new(lat, lon);
    let name = r.city.clone().unwrap_or_else(|| "Unknown".into());

    let place = Placemark {
        name,
        coordinate,
        display_name: None,
        locality: r.city,
        country: r.country_name,
        country_code: r.country_code,
    };
    Ok((Location::new(coordinate).with_accuracy(IP_ACCURACY_METERS), place))
}

/// Location client backed by an IP geolocation endpoint. Each start performs
/// one lookup and delivers a single fix, synchronously.
pub struct IpLocationClient {
    url: String,
    user_agent: String,
    sink: RefCell<Option<EventSink>>,
    running: Cell<bool>,
    last_place: RefCell<Option<Placemark>>,
}

impl IpLocationClient {
    pub fn new(config: &CoordinatorConfig) -> Self {
        Self {
            url: config.ip_lookup_url.clone(),
            user_agent: config.user_agent.clone(),
            sink: RefCell::new(None),
            running: Cell::new(false),
            last_place: RefCell::new(None),
        }
    }

    /// Where the most recent lookup placed us.
    pub fn last_place(&self) -> Option<Placemark> {
        self.last_place.borrow().clone()
    }

    fn lookup(&self) -> Result<(Location, Placemark), LocationError> {
        let result: IpApiResult = ureq::get(&self.url)
            .set("User-Agent", &self.user_agent)
            .call()
            .map_err(|e| LocationError::Network(e.to_string()))?
            .into_json()
            .map_err(|e| LocationError::InvalidResponse(e.to_string()))?;
        parse_ip_result(result)
    }
}

impl LocationClient for IpLocationClient {
    fn attach(&self, sink: EventSink) {
        *self.sink.borrow_mut() = Some(sink);
    }

    fn start_updating(&self) {
        self.running.set(true);
        let Some(sink) = self.sink.borrow().clone() else {
            return;
        };
        match self.lookup() {
            Ok((location, place)) => {
                *self.last_place.borrow_mut() = Some(place);
                if self.running.get() {
                    sink.locations_updated(vec![location]);
                }
            }
            Err(e) => sink.failed(e),
        }
    }

    fn stop_updating(&self) {
        self.running.set(false);
    }

    fn authorization_status(&self) -> AuthorizationStatus {
        AuthorizationStatus::Authorized
    }

    fn distance(&self, from: &Location, to: &Location) -> f64 {
        haversine_meters(from.coordinate, to.coordinate)
    }
}

// ─── URL encoding (minimal, no extra dep) ───────────────────────

fn url_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
