mod http;
mod mapbox_provider;
mod nominatim_provider;

pub use mapbox_provider::{MapboxConfig, MapboxProvider, DEFAULT_MAPBOX_BASE_URL};
pub use nominatim_provider::{NominatimConfig, NominatimProvider, DEFAULT_NOMINATIM_BASE_URL};

/// Identifying User-Agent sent to every provider.
pub const DEFAULT_USER_AGENT: &str = concat!(
    "site-geocoder/",
    env!("CARGO_PKG_VERSION"),
    " (address lookup service)"
);
