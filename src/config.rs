//! Coordinator and provider settings, loadable from a JSON file.

use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::io::Read;
use std::path::Path;

use crate::location::Accuracy;

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_IP_LOOKUP_URL: &str = "https://ipapi.co/json/";
pub const DEFAULT_USER_AGENT: &str = concat!("waypoint/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub accuracy: Accuracy,
    /// Notify listeners when the current location is set by hand.
    pub notify_on_manual_set: bool,
    pub user_agent: String,
    pub nominatim_url: String,
    pub ip_lookup_url: String,
    /// Maximum placemarks returned per forward geocode.
    pub result_limit: usize,
    /// Reverse lookups in the built-in dataset only match cities this close.
    pub builtin_radius_km: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            accuracy: Accuracy::default(),
            notify_on_manual_set: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            nominatim_url: DEFAULT_NOMINATIM_URL.to_string(),
            ip_lookup_url: DEFAULT_IP_LOOKUP_URL.to_string(),
            result_limit: 5,
            builtin_radius_km: 50.0,
        }
    }
}

impl CoordinatorConfig {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ConfigError> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Cannot read config: {}", e),
            Self::Parse(e) => write!(f, "Invalid config: {}", e),
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e)
    }
}
