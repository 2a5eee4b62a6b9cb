//! Mapbox Geocoding Provider
//!
//! Implements GeocodingProvider on the Mapbox Geocoding v5 API
//! (`mapbox.places`). Token authenticated; supports proximity and
//! language bias. Transient failures are retried with backoff.

use super::http::{build_client, ensure_success, read_json, send_error};
use crate::domain::entities::{Address, GeocodeQuery, GeocodeResult, ProviderOutcome};
use crate::domain::errors::ProviderError;
use crate::domain::ports::GeocodingProvider;
use crate::domain::value_objects::{BoundingBox, Coordinates, ProviderKind};
use crate::infrastructure::RetryPolicy;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_MAPBOX_BASE_URL: &str = "https://api.mapbox.com";

const KIND: ProviderKind = ProviderKind::Mapbox;

/// Mapbox adapter configuration.
#[derive(Clone)]
pub struct MapboxConfig {
    pub base_url: String,
    pub access_token: String,
    pub timeout: Duration,
    pub user_agent: String,
    pub retry: RetryPolicy,
}

impl MapboxConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_MAPBOX_BASE_URL.to_string(),
            access_token: access_token.into(),
            timeout: Duration::from_secs(10),
            user_agent: super::DEFAULT_USER_AGENT.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// A token is usable when it is non-blank.
    pub fn has_valid_token(&self) -> bool {
        !self.access_token.trim().is_empty()
    }
}

impl fmt::Debug for MapboxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapboxConfig")
            .field("base_url", &self.base_url)
            .field("access_token", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .field("retry", &self.retry)
            .finish()
    }
}

// Native response shape. Never leaves this module.

#[derive(Debug, Deserialize)]
struct MapboxResponse {
    #[serde(default)]
    features: Vec<MapboxFeature>,
}

#[derive(Debug, Deserialize)]
struct MapboxFeature {
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    place_name: String,
    center: [f64; 2],
    #[serde(default)]
    bbox: Option<[f64; 4]>,
    /// House number for `address` features.
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    properties: MapboxProperties,
    #[serde(default)]
    context: Vec<MapboxContext>,
}

#[derive(Debug, Default, Deserialize)]
struct MapboxProperties {
    #[serde(default)]
    short_code: Option<String>,
    /// Street address for `poi` features.
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MapboxContext {
    id: String,
    text: String,
    #[serde(default)]
    short_code: Option<String>,
}

/// Layer of a Mapbox id such as `postcode.8417` → `postcode`.
fn layer(id: &str) -> &str {
    id.split('.').next().unwrap_or_default()
}

/// Fill the address level named by `layer` from one hierarchy entry.
fn apply_level(address: &mut Address, layer: &str, text: &str, short_code: Option<&str>) {
    match layer {
        "postcode" => address.postcode = Some(text.to_string()),
        "place" => address.city = Some(text.to_string()),
        "locality" if address.city.is_none() => address.city = Some(text.to_string()),
        "region" => address.county = Some(text.to_string()),
        "country" => {
            address.country = Some(text.to_string());
            address.country_code = short_code.map(str::to_uppercase);
        }
        _ => {}
    }
}

impl MapboxFeature {
    fn into_result(self) -> GeocodeResult {
        let mut address = Address::default();
        for ctx in &self.context {
            apply_level(&mut address, layer(&ctx.id), &ctx.text, ctx.short_code.as_deref());
        }

        let own_layer = layer(&self.id);
        match own_layer {
            "address" => {
                address.line1 = Some(match &self.address {
                    Some(number) => format!("{} {}", number, self.text),
                    None => self.text.clone(),
                });
            }
            "poi" => address.line1 = self.properties.address.clone(),
            _ => apply_level(
                &mut address,
                own_layer,
                &self.text,
                self.properties.short_code.as_deref(),
            ),
        }

        GeocodeResult {
            id: format!("{}:{}", KIND, self.id),
            label: self.place_name,
            name: self.text,
            coordinates: Coordinates::from(self.center),
            bbox: self.bbox.map(BoundingBox::from),
            address: (!address.is_empty()).then_some(address),
            provider: KIND,
        }
    }
}

/// Mapbox forward geocoder.
pub struct MapboxProvider {
    client: Client,
    base_url: Url,
    config: MapboxConfig,
}

impl MapboxProvider {
    pub fn new(config: MapboxConfig) -> anyhow::Result<Self> {
        let base_url = Url::parse(&config.base_url)?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("mapbox base url cannot be a base: {}", config.base_url);
        }
        let client = build_client(&config.user_agent, config.timeout)?;
        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    /// `{base}/geocoding/v5/mapbox.places/{search}.json`
    fn search_url(&self, search: &str) -> Url {
        // `;` separates batch queries in this API.
        let file = format!("{}.json", search.replace(';', ","));
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["geocoding", "v5", "mapbox.places", file.as_str()]);
        }
        url
    }

    fn query_params(&self, query: &GeocodeQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("access_token", self.config.access_token.clone()),
            ("limit", query.limit.to_string()),
            ("autocomplete", "false".to_string()),
        ];

        match &query.postal_code {
            Some(code) => {
                params.push(("country", code.country().to_string()));
                params.push(("types", "postcode,address".to_string()));
            }
            None => {
                if let Some(country) = &query.country {
                    params.push(("country", country.clone()));
                }
            }
        }
        if let Some(p) = query.proximity {
            params.push(("proximity", p.to_string()));
        }
        if let Some(language) = &query.language {
            params.push(("language", language.clone()));
        }
        params
    }

    async fn fetch(
        &self,
        url: &Url,
        params: &[(&'static str, String)],
    ) -> Result<MapboxResponse, ProviderError> {
        let response = self
            .client
            .get(url.clone())
            .query(params)
            .send()
            .await
            .map_err(|e| send_error(KIND, e))?;
        let response = ensure_success(KIND, response).await?;
        read_json(KIND, response).await
    }
}

#[async_trait]
impl GeocodingProvider for MapboxProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    async fn forward_geocode(&self, query: &GeocodeQuery) -> Result<ProviderOutcome, ProviderError> {
        let search = match &query.postal_code {
            Some(code) => code.display(),
            None => query.text.clone(),
        };
        let url = self.search_url(&search);
        let params = self.query_params(query);

        let response = self
            .config
            .retry
            .execute("mapbox forward geocode", || self.fetch(&url, &params))
            .await?;

        let results: Vec<GeocodeResult> = response
            .features
            .into_iter()
            .map(MapboxFeature::into_result)
            .collect();

        tracing::debug!("mapbox returned {} results for {:?}", results.len(), search);
        Ok(ProviderOutcome::from_results(results))
    }
}
