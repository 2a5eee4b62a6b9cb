use crate::adapters::outbound::{
    DEFAULT_MAPBOX_BASE_URL, DEFAULT_NOMINATIM_BASE_URL, DEFAULT_USER_AGENT,
};
use crate::domain::value_objects::{normalize_country_codes, Coordinates, ProviderSelector};
use std::fmt;

#[derive(Clone)]
pub struct Config {
    // Server settings
    pub listen_addr: String,
    pub debug: bool,

    // Provider settings
    pub provider: ProviderSelector,
    pub mapbox_access_token: Option<String>,
    pub mapbox_base_url: String,
    pub nominatim_base_url: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,

    // Search defaults
    pub default_language: Option<String>,
    pub default_country: Option<String>,
    pub default_proximity: Option<Coordinates>,

    // Cache and rate limiting
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    pub rate_limit_ms: u64,
}

impl Config {
    /// The Mapbox token, if one is set and non-blank.
    pub fn mapbox_token(&self) -> Option<&str> {
        self.mapbox_access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            debug: false,
            provider: ProviderSelector::Auto,
            mapbox_access_token: None,
            mapbox_base_url: DEFAULT_MAPBOX_BASE_URL.to_string(),
            nominatim_base_url: DEFAULT_NOMINATIM_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout_secs: 10,
            default_language: None,
            default_country: None,
            default_proximity: None,
            cache_ttl_secs: 300,
            cache_capacity: 2000,
            rate_limit_ms: 1000,
        }
    }
}

// The token never reaches logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("listen_addr", &self.listen_addr)
            .field("debug", &self.debug)
            .field("provider", &self.provider)
            .field(
                "mapbox_access_token",
                &self.mapbox_access_token.as_ref().map(|_| "<redacted>"),
            )
            .field("mapbox_base_url", &self.mapbox_base_url)
            .field("nominatim_base_url", &self.nominatim_base_url)
            .field("user_agent", &self.user_agent)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("default_language", &self.default_language)
            .field("default_country", &self.default_country)
            .field("default_proximity", &self.default_proximity)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("cache_capacity", &self.cache_capacity)
            .field("rate_limit_ms", &self.rate_limit_ms)
            .finish()
    }
}

pub fn load_config() -> anyhow::Result<Config> {
    load_config_from(|key| std::env::var(key).ok())
}

/// Build a config from any key lookup. Unset or blank values take the
/// default; numbers that fail to parse do too.
pub fn load_config_from<F>(lookup: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = Config::default();
    let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let listen_addr = var("GEOCODER_LISTEN_ADDR").unwrap_or(defaults.listen_addr);

    let debug = lookup("DEBUG").is_some();

    let provider = var("GEOCODER_PROVIDER")
        .map(|v| ProviderSelector::from_str(&v))
        .unwrap_or_default();

    let mapbox_access_token = var("MAPBOX_ACCESS_TOKEN");

    let mapbox_base_url = var("GEOCODER_MAPBOX_BASE_URL").unwrap_or(defaults.mapbox_base_url);

    let nominatim_base_url =
        var("GEOCODER_NOMINATIM_BASE_URL").unwrap_or(defaults.nominatim_base_url);

    let user_agent = var("GEOCODER_USER_AGENT").unwrap_or(defaults.user_agent);

    let http_timeout_secs = var("GEOCODER_HTTP_TIMEOUT_SECS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.http_timeout_secs);

    // Search defaults
    let default_language = var("GEOCODER_DEFAULT_LANGUAGE");

    let default_country = var("GEOCODER_DEFAULT_COUNTRY").and_then(|v| {
        match normalize_country_codes(&v) {
            Ok(codes) => codes,
            Err(bad) => {
                tracing::warn!(
                    "ignoring GEOCODER_DEFAULT_COUNTRY={:?}, {:?} is not an ISO 3166-1 alpha-2 code",
                    v,
                    bad
                );
                None
            }
        }
    });

    let default_proximity = var("GEOCODER_DEFAULT_PROXIMITY").and_then(|v| {
        match Coordinates::parse_lon_lat(&v).filter(Coordinates::is_valid) {
            Some(point) => Some(point),
            None => {
                tracing::warn!("ignoring GEOCODER_DEFAULT_PROXIMITY={:?}, expected lon,lat", v);
                None
            }
        }
    });

    // Cache and rate limiting
    let cache_ttl_secs = var("GEOCODER_CACHE_TTL_SECS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.cache_ttl_secs);

    let cache_capacity = var("GEOCODER_CACHE_CAPACITY")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.cache_capacity);

    let rate_limit_ms = var("GEOCODER_RATE_LIMIT_MS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.rate_limit_ms);

    Ok(Config {
        listen_addr,
        debug,
        provider,
        mapbox_access_token,
        mapbox_base_url,
        nominatim_base_url,
        user_agent,
        http_timeout_secs,
        default_language,
        default_country,
        default_proximity,
        cache_ttl_secs,
        cache_capacity,
        rate_limit_ms,
    })
}
