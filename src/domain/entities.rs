//! Domain Entities - Core business objects
//!
//! These entities represent the core concepts of the geocoding domain.
//! Provider-specific response shapes never appear here; adapters map
//! into these types before returning.

use crate::domain::value_objects::{BoundingBox, Coordinates, PostalCode, ProviderKind, ResultLimit};
use serde::{Deserialize, Serialize};

/// Structured postal address attached to a result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// County or state, depending on the country.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// ISO 3166-1 alpha-2, upper case.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A single normalized geocoding hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    /// Opaque identifier, unique per provider (`provider:native-id`).
    pub id: String,
    /// Full display label.
    pub label: String,
    /// Short name of the place or street.
    pub name: String,
    /// `[lon, lat]` in WGS84.
    pub coordinates: Coordinates,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    /// Adapter that produced this result.
    pub provider: ProviderKind,
}

/// Caller-facing options for a forward search.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// ISO country code bias, comma separated for several.
    pub country: Option<String>,
    /// Requested result count; clamped to `1..=10`.
    pub limit: Option<i64>,
    pub proximity: Option<Coordinates>,
    pub language: Option<String>,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn proximity(mut self, proximity: Coordinates) -> Self {
        self.proximity = Some(proximity);
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// A validated query as handed to a provider adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeQuery {
    /// Trimmed user text.
    pub text: String,
    /// Lower-case ISO codes, comma separated.
    pub country: Option<String>,
    pub limit: ResultLimit,
    pub proximity: Option<Coordinates>,
    pub language: Option<String>,
    /// Set when the classifier recognised a structured postal code.
    pub postal_code: Option<PostalCode>,
}

impl GeocodeQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            country: None,
            limit: ResultLimit::default(),
            proximity: None,
            language: None,
            postal_code: None,
        }
    }

    pub fn is_structured(&self) -> bool {
        self.postal_code.is_some()
    }
}

/// Successful provider answer: either data or an explicit empty set.
///
/// Failures travel separately as `ProviderError`, so an empty answer can
/// never be mistaken for an outage.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutcome {
    Found(Vec<GeocodeResult>),
    Empty,
}

impl ProviderOutcome {
    pub fn from_results(results: Vec<GeocodeResult>) -> Self {
        if results.is_empty() {
            Self::Empty
        } else {
            Self::Found(results)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn into_results(self) -> Vec<GeocodeResult> {
        match self {
            Self::Found(results) => results,
            Self::Empty => Vec::new(),
        }
    }
}
