//! Geocoding Service - Main application use case
//!
//! Orchestrates forward resolution (validation, caching, provider
//! selection, rate limiting and fallback) and reverse resolution. This is
//! the primary interface for the inbound adapter.

use crate::adapters::outbound::{MapboxConfig, MapboxProvider, NominatimConfig, NominatimProvider};
use crate::config::Config;
use crate::domain::entities::{GeocodeQuery, GeocodeResult, ProviderOutcome, SearchOptions};
use crate::domain::errors::{GeocodeError, ProviderError};
use crate::domain::ports::{GeocodingProvider, ReverseGeocoder};
use crate::domain::services::classify;
use crate::domain::value_objects::{
    normalize_country_codes, Coordinates, ProviderKind, ProviderSelector, ResultLimit,
};
use crate::infrastructure::{
    CacheConfig, CacheKey, RateLimitConfig, RateLimitResult, RateLimiter, ResultCache,
};
use std::sync::Arc;
use std::time::Duration;

/// Longest accepted query text, in characters.
pub const MAX_QUERY_CHARS: usize = 256;

/// Values applied when a search leaves the matching option unset.
#[derive(Debug, Clone, Default)]
pub struct SearchDefaults {
    pub country: Option<String>,
    pub proximity: Option<Coordinates>,
    pub language: Option<String>,
}

/// Geocoding service - main application use case.
///
/// A forward search runs through:
/// 1. Input validation and limit clamping
/// 2. The result cache
/// 3. The active provider, then the alternate on empty or failure
/// 4. Storing the final answer in the cache
///
/// Every request to a rate-limited provider first takes that provider's
/// slot in the rate limiter. The slot is keyed by provider, not by caller,
/// so the interval holds across all callers. Cache hits never touch it.
///
/// Concurrent identical searches are not coalesced; each cache miss
/// issues its own provider call and the first answer stored wins.
pub struct GeocodingService {
    primary: Arc<dyn GeocodingProvider>,
    alternate: Option<Arc<dyn GeocodingProvider>>,
    reverse: Arc<dyn ReverseGeocoder>,
    limiter: Arc<RateLimiter>,
    cache: Arc<ResultCache>,
    defaults: SearchDefaults,
}

impl GeocodingService {
    /// Start building a service around its active provider and reverse
    /// geocoder.
    pub fn builder(
        primary: Arc<dyn GeocodingProvider>,
        reverse: Arc<dyn ReverseGeocoder>,
    ) -> GeocodingServiceBuilder {
        GeocodingServiceBuilder {
            primary,
            alternate: None,
            reverse,
            limiter: None,
            cache: None,
            defaults: SearchDefaults::default(),
        }
    }

    /// Wire the real adapters from configuration.
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(cfg.http_timeout_secs);

        let mut nominatim_config = NominatimConfig::default()
            .base_url(cfg.nominatim_base_url.clone())
            .user_agent(cfg.user_agent.clone())
            .timeout(timeout);
        if let Some(language) = &cfg.default_language {
            nominatim_config = nominatim_config.default_language(language.clone());
        }
        let nominatim = Arc::new(NominatimProvider::new(nominatim_config)?);

        let mapbox = match cfg.mapbox_token() {
            Some(token) => {
                let mapbox_config = MapboxConfig::new(token)
                    .base_url(cfg.mapbox_base_url.clone())
                    .user_agent(cfg.user_agent.clone())
                    .timeout(timeout);
                Some(Arc::new(MapboxProvider::new(mapbox_config)?) as Arc<dyn GeocodingProvider>)
            }
            None => None,
        };

        let (primary, alternate) =
            select_providers(cfg.provider, mapbox, nominatim.clone() as Arc<dyn GeocodingProvider>);

        let service = Self::builder(primary, nominatim)
            .alternate_opt(alternate)
            .rate_limiter(Arc::new(RateLimiter::new(RateLimitConfig::with_interval(
                Duration::from_millis(cfg.rate_limit_ms),
            ))))
            .cache(Arc::new(ResultCache::new(CacheConfig {
                ttl: Duration::from_secs(cfg.cache_ttl_secs),
                capacity: cfg.cache_capacity,
            })))
            .defaults(SearchDefaults {
                country: cfg.default_country.clone(),
                proximity: cfg.default_proximity,
                language: cfg.default_language.clone(),
            })
            .build();
        Ok(service)
    }

    /// Kind of the provider answering first.
    pub fn active_provider(&self) -> ProviderKind {
        self.primary.kind()
    }

    pub fn fallback_provider(&self) -> Option<ProviderKind> {
        self.alternate.as_ref().map(|a| a.kind())
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Resolve free text or a postal code to an ordered, possibly empty,
    /// list of places.
    pub async fn search(
        &self,
        text: &str,
        options: SearchOptions,
    ) -> Result<Vec<GeocodeResult>, GeocodeError> {
        let query = self.prepare(text, &options)?;

        let key = CacheKey::from_query(&query);
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!("cache hit for {} ({} results)", key, hit.len());
            return Ok(hit.to_vec());
        }
        tracing::debug!("cache miss for {}", key);

        let results = self.resolve(&query).await?;
        let stored = self.cache.insert(key, results);
        Ok(stored.to_vec())
    }

    /// Resolve a point to its nearest address. `Ok(None)` means the
    /// provider knows no address there.
    pub async fn reverse(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<Option<GeocodeResult>, GeocodeError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(GeocodeError::validation(format!(
                "latitude must be a number between -90 and 90, got {}",
                lat
            )));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(GeocodeError::validation(format!(
                "longitude must be a number between -180 and 180, got {}",
                lon
            )));
        }

        if self.reverse.is_rate_limited() {
            self.gate(self.reverse.kind())?;
        }

        let found = self.reverse.reverse_geocode(Coordinates::new(lon, lat)).await?;
        Ok(found)
    }

    /// Take the provider's rate limiter slot.
    fn gate(&self, provider: ProviderKind) -> Result<(), GeocodeError> {
        match self.limiter.check(provider.as_str()) {
            RateLimitResult::Allowed => Ok(()),
            RateLimitResult::Limited { retry_after_ms } => {
                tracing::debug!("{} rate limited for {} ms", provider, retry_after_ms);
                Err(GeocodeError::RateLimit { retry_after_ms })
            }
        }
    }

    /// The outer error is a rate limiter rejection; the inner result is
    /// the provider's own answer.
    async fn call(
        &self,
        provider: &Arc<dyn GeocodingProvider>,
        query: &GeocodeQuery,
    ) -> Result<Result<ProviderOutcome, ProviderError>, GeocodeError> {
        if provider.is_rate_limited() {
            self.gate(provider.kind())?;
        }
        Ok(provider.forward_geocode(query).await)
    }

    /// Validate input and fold in configured defaults.
    fn prepare(&self, text: &str, options: &SearchOptions) -> Result<GeocodeQuery, GeocodeError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(GeocodeError::validation("query text must not be empty"));
        }
        if text.chars().count() > MAX_QUERY_CHARS {
            return Err(GeocodeError::validation(format!(
                "query text must be at most {} characters",
                MAX_QUERY_CHARS
            )));
        }

        let country = match options.country.as_deref() {
            Some(country) => normalize_countries(country)?,
            None => self.defaults.country.clone(),
        };

        let proximity = options.proximity.or(self.defaults.proximity);
        if let Some(p) = proximity {
            if !p.is_valid() {
                return Err(GeocodeError::validation(format!(
                    "proximity out of range: {}",
                    p
                )));
            }
        }

        let language = options
            .language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .or_else(|| self.defaults.language.clone());

        Ok(GeocodeQuery {
            text: text.to_string(),
            country,
            limit: ResultLimit::clamp(options.limit),
            proximity,
            language,
            postal_code: classify(text).postal_code(),
        })
    }

    /// Whether an empty or failed primary answer should go to the
    /// alternate. Postal codes always do; free text only leaves Mapbox.
    fn should_fall_back(&self, query: &GeocodeQuery) -> bool {
        query.is_structured() || self.primary.kind() != ProviderKind::Nominatim
    }

    async fn resolve(&self, query: &GeocodeQuery) -> Result<Vec<GeocodeResult>, GeocodeError> {
        let first = self.call(&self.primary, query).await?;

        let alternate = match &self.alternate {
            Some(alternate) if self.should_fall_back(query) => alternate,
            _ => return Ok(first?.into_results()),
        };

        match first {
            Ok(ProviderOutcome::Found(results)) => return Ok(results),
            Err(err @ ProviderError::RateLimited { .. }) => return Err(err.into()),
            Ok(ProviderOutcome::Empty) => {
                tracing::debug!(
                    "{} found nothing for {:?}, falling back to {}",
                    self.primary.kind(),
                    query.text,
                    alternate.kind()
                );
            }
            Err(err) => {
                tracing::warn!("{} failed ({}), falling back to {}", self.primary.kind(), err, alternate.kind());
            }
        }

        let second = self.call(alternate, query).await??;
        Ok(second.into_results())
    }
}

/// Builder for [`GeocodingService`].
pub struct GeocodingServiceBuilder {
    primary: Arc<dyn GeocodingProvider>,
    alternate: Option<Arc<dyn GeocodingProvider>>,
    reverse: Arc<dyn ReverseGeocoder>,
    limiter: Option<Arc<RateLimiter>>,
    cache: Option<Arc<ResultCache>>,
    defaults: SearchDefaults,
}

impl GeocodingServiceBuilder {
    pub fn alternate(mut self, alternate: Arc<dyn GeocodingProvider>) -> Self {
        self.alternate = Some(alternate);
        self
    }

    fn alternate_opt(mut self, alternate: Option<Arc<dyn GeocodingProvider>>) -> Self {
        self.alternate = alternate;
        self
    }

    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn defaults(mut self, defaults: SearchDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn build(self) -> GeocodingService {
        GeocodingService {
            primary: self.primary,
            alternate: self.alternate,
            reverse: self.reverse,
            limiter: self.limiter.unwrap_or_default(),
            cache: self.cache.unwrap_or_default(),
            defaults: self.defaults,
        }
    }
}

/// Pick the active and alternate forward providers.
///
/// `auto` prefers Mapbox when a token is configured; asking for Mapbox
/// without one degrades to Nominatim. Nominatim as the active provider
/// keeps Mapbox (if available) as the alternate for postal codes.
pub fn select_providers(
    selector: ProviderSelector,
    mapbox: Option<Arc<dyn GeocodingProvider>>,
    nominatim: Arc<dyn GeocodingProvider>,
) -> (Arc<dyn GeocodingProvider>, Option<Arc<dyn GeocodingProvider>>) {
    match (selector, mapbox) {
        (ProviderSelector::Auto | ProviderSelector::Mapbox, Some(mapbox)) => (mapbox, Some(nominatim)),
        (ProviderSelector::Mapbox, None) => {
            tracing::warn!("mapbox selected but no access token configured, using nominatim");
            (nominatim, None)
        }
        (ProviderSelector::Auto, None) => (nominatim, None),
        (ProviderSelector::Nominatim, mapbox) => (nominatim, mapbox),
    }
}

fn normalize_countries(raw: &str) -> Result<Option<String>, GeocodeError> {
    normalize_country_codes(raw).map_err(|bad| {
        GeocodeError::validation(format!(
            "country must be ISO 3166-1 alpha-2 codes, got {:?}",
            bad
        ))
    })
}
