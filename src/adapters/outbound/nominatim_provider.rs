//! Nominatim Geocoding Provider
//!
//! Implements both GeocodingProvider and ReverseGeocoder on the public
//! Nominatim API (OpenStreetMap). The usage policy allows at most one
//! request per second and requires an identifying User-Agent, so the
//! adapter reports itself as rate limited and does not retry by default.

use super::http::{build_client, ensure_success, read_json, send_error};
use crate::domain::entities::{Address, GeocodeQuery, GeocodeResult, ProviderOutcome};
use crate::domain::errors::ProviderError;
use crate::domain::ports::{GeocodingProvider, ReverseGeocoder};
use crate::domain::value_objects::{BoundingBox, Coordinates, PostalCode, ProviderKind};
use crate::infrastructure::RetryPolicy;
use async_trait::async_trait;
use reqwest::header::ACCEPT_LANGUAGE;
use reqwest::{Client, Url};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

pub const DEFAULT_NOMINATIM_BASE_URL: &str = "https://nominatim.openstreetmap.org";

const KIND: ProviderKind = ProviderKind::Nominatim;

/// Nominatim adapter configuration.
#[derive(Debug, Clone)]
pub struct NominatimConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    /// Sent as `Accept-Language` when the query carries no language.
    pub default_language: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for NominatimConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_NOMINATIM_BASE_URL.to_string(),
            user_agent: super::DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(10),
            default_language: None,
            retry: RetryPolicy::none(),
        }
    }
}

impl NominatimConfig {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = Some(language.into());
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

// Native response shape (`format=jsonv2`). Never leaves this module.

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    place_id: u64,
    #[serde(deserialize_with = "de_f64")]
    lat: f64,
    #[serde(deserialize_with = "de_f64")]
    lon: f64,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    name: Option<String>,
    /// `[minLat, maxLat, minLon, maxLon]`
    #[serde(default)]
    boundingbox: Option<[String; 4]>,
    #[serde(default)]
    address: Option<NominatimAddress>,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    house_number: Option<String>,
    road: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    hamlet: Option<String>,
    county: Option<String>,
    state: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
    postcode: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReverseResponse {
    NotFound { error: String },
    Place(NominatimPlace),
}

/// Nominatim sends coordinates as strings; accept numbers too.
fn de_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrNum {
        Str(String),
        Num(f64),
    }

    match StrOrNum::deserialize(deserializer)? {
        StrOrNum::Num(n) => Ok(n),
        StrOrNum::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl NominatimAddress {
    fn into_address(self) -> Address {
        let line1 = match (self.house_number, self.road) {
            (Some(number), Some(road)) => Some(format!("{} {}", number, road)),
            (None, Some(road)) => Some(road),
            (Some(number), None) => Some(number),
            (None, None) => None,
        };

        Address {
            line1,
            city: self.city.or(self.town).or(self.village).or(self.hamlet),
            county: self.county.or(self.state),
            country: self.country,
            country_code: self.country_code.map(|c| c.to_uppercase()),
            postcode: self.postcode,
        }
    }
}

impl NominatimPlace {
    fn into_result(self) -> GeocodeResult {
        // Unparseable corners drop the box rather than the result.
        let bbox = self.boundingbox.and_then(|b| {
            let [min_lat, max_lat, min_lon, max_lon] =
                b.map(|v| v.trim().parse::<f64>().ok());
            Some(BoundingBox::from_corners(
                min_lon?, min_lat?, max_lon?, max_lat?,
            ))
        });

        let name = match self.name.filter(|n| !n.trim().is_empty()) {
            Some(name) => name,
            None => self
                .display_name
                .split(',')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string(),
        };

        let address = self
            .address
            .map(NominatimAddress::into_address)
            .filter(|a| !a.is_empty());

        GeocodeResult {
            id: format!("{}:{}", KIND, self.place_id),
            label: self.display_name,
            name,
            coordinates: Coordinates::new(self.lon, self.lat),
            bbox,
            address,
            provider: KIND,
        }
    }
}

/// Nominatim forward and reverse geocoder.
pub struct NominatimProvider {
    client: Client,
    base_url: Url,
    config: NominatimConfig,
}

impl NominatimProvider {
    pub fn new(config: NominatimConfig) -> anyhow::Result<Self> {
        let base_url = Url::parse(&config.base_url)?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("nominatim base url cannot be a base: {}", config.base_url);
        }
        if config.user_agent.trim().is_empty() {
            anyhow::bail!("nominatim requires an identifying user agent");
        }
        let client = build_client(&config.user_agent, config.timeout)?;
        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    fn endpoint(&self, name: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(name);
        }
        url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &Url,
        params: &[(&'static str, String)],
        language: Option<&str>,
    ) -> Result<T, ProviderError> {
        let mut request = self.client.get(url.clone()).query(params);
        if let Some(language) = language.or(self.config.default_language.as_deref()) {
            request = request.header(ACCEPT_LANGUAGE, language);
        }
        let response = request.send().await.map_err(|e| send_error(KIND, e))?;
        let response = ensure_success(KIND, response).await?;
        read_json(KIND, response).await
    }

    async fn search(
        &self,
        params: Vec<(&'static str, String)>,
        language: Option<&str>,
    ) -> Result<Vec<GeocodeResult>, ProviderError> {
        let url = self.endpoint("search");
        let params = &params;
        let places: Vec<NominatimPlace> = self
            .config
            .retry
            .execute("nominatim search", || self.get_json(&url, params, language))
            .await?;
        Ok(places.into_iter().map(NominatimPlace::into_result).collect())
    }

    fn base_params(query: &GeocodeQuery) -> Vec<(&'static str, String)> {
        vec![
            ("format", "jsonv2".to_string()),
            ("addressdetails", "1".to_string()),
            ("limit", query.limit.to_string()),
        ]
    }

    async fn search_postal_code(
        &self,
        query: &GeocodeQuery,
        code: &PostalCode,
    ) -> Result<Vec<GeocodeResult>, ProviderError> {
        let mut params = Self::base_params(query);
        params.push(("postalcode", code.normalized().to_string()));
        params.push(("countrycodes", code.country().to_string()));
        self.search(params, query.language.as_deref()).await
    }

    async fn search_text(
        &self,
        query: &GeocodeQuery,
        text: &str,
        country: Option<&str>,
    ) -> Result<Vec<GeocodeResult>, ProviderError> {
        let mut params = Self::base_params(query);
        params.push(("q", text.to_string()));
        if let Some(country) = country {
            params.push(("countrycodes", country.to_string()));
        }
        self.search(params, query.language.as_deref()).await
    }
}

#[async_trait]
impl GeocodingProvider for NominatimProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    fn is_rate_limited(&self) -> bool {
        true
    }

    async fn forward_geocode(&self, query: &GeocodeQuery) -> Result<ProviderOutcome, ProviderError> {
        let results = match &query.postal_code {
            Some(code) => {
                let by_code = self.search_postal_code(query, code).await?;
                if !by_code.is_empty() {
                    return Ok(ProviderOutcome::Found(by_code));
                }
                tracing::debug!("nominatim postalcode search empty for {}, trying free text", code);
                self.search_text(query, &code.display(), Some(code.country()))
                    .await?
            }
            None => {
                self.search_text(query, &query.text, query.country.as_deref())
                    .await?
            }
        };

        tracing::debug!("nominatim returned {} results for {:?}", results.len(), query.text);
        Ok(ProviderOutcome::from_results(results))
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    fn is_rate_limited(&self) -> bool {
        true
    }

    async fn reverse_geocode(&self, point: Coordinates) -> Result<Option<GeocodeResult>, ProviderError> {
        let url = self.endpoint("reverse");
        let params = &[
            ("format", "jsonv2".to_string()),
            ("addressdetails", "1".to_string()),
            ("lat", point.lat.to_string()),
            ("lon", point.lon.to_string()),
        ];

        let response: ReverseResponse = self
            .config
            .retry
            .execute("nominatim reverse", || self.get_json(&url, params, None))
            .await?;

        match response {
            ReverseResponse::Place(place) => Ok(Some(place.into_result())),
            ReverseResponse::NotFound { error } => {
                tracing::debug!("nominatim reverse found nothing at {}: {}", point, error);
                Ok(None)
            }
        }
    }
}
