use std::path::PathBuf;
use std::rc::Rc;

use clap::{Parser, Subcommand};
use futures::executor::block_on;
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use waypoint::config::CoordinatorConfig;
use waypoint::location::{
    AuthorizationStatus, BuiltinGeocoder, Coordinate, FallbackGeocoder, Geocoder, IpLocationClient, Location,
    LocationCoordinator, LocationError, LocationListener, NominatimGeocoder, Placemark,
};

/// waypoint: geocoding and location lookups from the command line
///
/// Resolves addresses through OpenStreetMap Nominatim, falling back to the
/// built-in city list (or using only that list with --offline). The current
/// position comes from IP geolocation.
///
/// Examples:
///   waypoint geocode Stockholm
///   waypoint geocode "Medina, Saudi Arabia"
///   waypoint --offline geocode tokyo
///   waypoint reverse --lat 59.3293 --lon 18.0686
///   waypoint locate --describe
///   waypoint distance --to-lat 21.4225 --to-lon 39.8262
#[derive(Parser)]
#[command(name = "waypoint", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Offline mode: geocode against the built-in city list only.
    #[arg(long, global = true)]
    offline: bool,

    /// Country hint (ISO 3166-1 alpha-2, e.g. SA, US, FR).
    #[arg(long, global = true)]
    country: Option<String>,

    /// JSON config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output on stderr (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Address or place name to coordinates.
    Geocode { address: String },

    /// Coordinates to placemarks.
    Reverse {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },

    /// Current position via IP geolocation.
    Locate {
        /// Reverse geocode the fix as well.
        #[arg(long)]
        describe: bool,
    },

    /// Distance between two points. Without --from-lat/--from-lon the
    /// current position is used.
    Distance {
        #[arg(long, allow_hyphen_values = true, requires = "from_lon")]
        from_lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true, requires = "from_lat")]
        from_lon: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        to_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        to_lon: f64,
    },
}

#[derive(Serialize)]
struct LocateOutput {
    location: Location,
    authorization: AuthorizationStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    placemarks: Vec<Placemark>,
}

#[derive(Serialize)]
struct DistanceOutput {
    from: Coordinate,
    to: Coordinate,
    meters: f64,
    kilometers: f64,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Output {
    Placemarks(Vec<Placemark>),
    Locate(LocateOutput),
    Distance(DistanceOutput),
}

/// Prints fixes and failures to stderr as they arrive.
struct Banner;

impl LocationListener for Banner {
    fn on_locations_updated(&self, locations: &[Location]) {
        if let Some(latest) = locations.last() {
            eprintln!("  \u{1F4CD} {}", latest.coordinate);
        }
    }

    fn on_location_failed(&self, error: &LocationError) {
        eprintln!("  \u{26A0}\u{FE0F}  {}", error);
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => CoordinatorConfig::load(path).unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }),
        None => CoordinatorConfig::default(),
    };

    let builtin: Rc<dyn Geocoder> = Rc::new(BuiltinGeocoder::new(&config).with_country(cli.country.clone()));
    let geocoder: Rc<dyn Geocoder> = if cli.offline {
        builtin
    } else {
        let nominatim = Rc::new(NominatimGeocoder::new(&config).with_country(cli.country.clone()));
        Rc::new(FallbackGeocoder::new(nominatim, builtin))
    };
    let coordinator = LocationCoordinator::new(Rc::new(IpLocationClient::new(&config)), geocoder, &config);
    let banner = Rc::new(Banner);
    coordinator.add_listener(&banner);

    let output = run(&cli, &coordinator).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli, coordinator: &LocationCoordinator) -> Result<Output, LocationError> {
    match &cli.command {
        Command::Geocode { address } => {
            let placemarks = block_on(coordinator.geocode(address))?;
            if placemarks.is_empty() {
                return Err(LocationError::NotFound(address.clone()));
            }
            eprintln!("  {}", placemarks[0].display_line());
            Ok(Output::Placemarks(placemarks))
        }
        Command::Reverse { lat, lon } => {
            let coordinate = checked(*lat, *lon)?;
            Ok(Output::Placemarks(block_on(coordinator.reverse_geocode(coordinate))?))
        }
        Command::Locate { describe } => {
            let location = locate(cli, coordinator)?;
            let placemarks = if *describe {
                let (tx, rx) = futures::channel::oneshot::channel();
                coordinator.reverse_geocode_current_location(move |result| {
                    let _ = tx.send(result);
                });
                block_on(rx).unwrap_or(Err(LocationError::Cancelled))?
            } else {
                Vec::new()
            };
            Ok(Output::Locate(LocateOutput {
                location,
                authorization: coordinator.authorization_status(),
                placemarks,
            }))
        }
        Command::Distance { from_lat, from_lon, to_lat, to_lon } => {
            let to = Location::new(checked(*to_lat, *to_lon)?);
            let (from, meters) = match (from_lat, from_lon) {
                (Some(lat), Some(lon)) => {
                    let from = Location::new(checked(*lat, *lon)?);
                    let meters = coordinator.distance_from_location(&from, &to);
                    (from, meters)
                }
                _ => {
                    if !cli.offline {
                        locate(cli, coordinator)?;
                    }
                    let meters = coordinator.distance_from_current_location_to_location(&to)?;
                    let from = coordinator.current_location().ok_or(LocationError::NoCurrentLocation)?;
                    (from, meters)
                }
            };
            Ok(Output::Distance(DistanceOutput {
                from: from.coordinate,
                to: to.coordinate,
                meters,
                kilometers: meters / 1_000.0,
            }))
        }
    }
}

fn locate(cli: &Cli, coordinator: &LocationCoordinator) -> Result<Location, LocationError> {
    if cli.offline {
        return Err(LocationError::Network("locating needs network access; drop --offline".into()));
    }
    if !coordinator.authorization_status().is_authorized() {
        return Err(LocationError::Denied);
    }
    block_on(coordinator.locate_once())
}

fn checked(lat: f64, lon: f64) -> Result<Coordinate, LocationError> {
    let coordinate = Coordinate::new(lat, lon);
    if coordinate.is_valid() {
        Ok(coordinate)
    } else {
        Err(LocationError::InvalidCoordinate { lat, lon })
    }
}

fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    }
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
