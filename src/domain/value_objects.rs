//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default number of results returned by a forward search.
pub const DEFAULT_LIMIT: u8 = 5;
/// Upper bound for the number of results a caller may request.
pub const MAX_LIMIT: u8 = 10;

/// A WGS84 point. Always serialized as `[lon, lat]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinates {
    pub lon: f64,
    pub lat: f64,
}

impl Coordinates {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Whether both axes are finite and inside the WGS84 range.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Parse a `"lon,lat"` pair.
    pub fn parse_lon_lat(s: &str) -> Option<Self> {
        let (lon, lat) = s.split_once(',')?;
        let lon = lon.trim().parse().ok()?;
        let lat = lat.trim().parse().ok()?;
        Some(Self::new(lon, lat))
    }
}

impl From<[f64; 2]> for Coordinates {
    fn from(pair: [f64; 2]) -> Self {
        Self::new(pair[0], pair[1])
    }
}

impl From<Coordinates> for [f64; 2] {
    fn from(c: Coordinates) -> Self {
        [c.lon, c.lat]
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lon, self.lat)
    }
}

/// Envelope serialized as `[minLon, minLat, maxLon, maxLat]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Build a box from two arbitrary corners.
    ///
    /// Providers disagree on axis order and corner order, so the min/max of
    /// each axis is taken rather than trusting the input positions.
    pub fn from_corners(lon_a: f64, lat_a: f64, lon_b: f64, lat_b: f64) -> Self {
        Self {
            min_lon: lon_a.min(lon_b),
            min_lat: lat_a.min(lat_b),
            max_lon: lon_a.max(lon_b),
            max_lat: lat_a.max(lat_b),
        }
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(b: [f64; 4]) -> Self {
        Self::from_corners(b[0], b[1], b[2], b[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.min_lon, b.min_lat, b.max_lon, b.max_lat]
    }
}

/// Result count requested from a provider, always within `1..=MAX_LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultLimit(u8);

impl ResultLimit {
    /// Clamp a caller-supplied limit. Absent means the default, values below
    /// one become one and values above the maximum become the maximum.
    pub fn clamp(requested: Option<i64>) -> Self {
        match requested {
            None => Self(DEFAULT_LIMIT),
            Some(n) => Self(n.clamp(1, MAX_LIMIT as i64) as u8),
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl Default for ResultLimit {
    fn default() -> Self {
        Self(DEFAULT_LIMIT)
    }
}

impl fmt::Display for ResultLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An Irish Eircode in canonical form (no whitespace, upper case).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PostalCode {
    normalized: String,
}

impl PostalCode {
    /// Wrap an already-normalized code. Use the query classifier to obtain
    /// one from user input.
    pub(crate) fn from_normalized(normalized: String) -> Self {
        Self { normalized }
    }

    /// Canonical form, e.g. `E91VF83`.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Display form with the routing key separated, e.g. `E91 VF83`.
    pub fn display(&self) -> String {
        let (routing_key, unique_id) = self.normalized.split_at(3);
        format!("{} {}", routing_key, unique_id)
    }

    /// ISO 3166-1 alpha-2 country the code belongs to (lower case).
    pub fn country(&self) -> &'static str {
        "ie"
    }
}

impl fmt::Display for PostalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

/// Lower-case and check a comma separated list of ISO 3166-1 alpha-2 codes.
///
/// Blank input means no bias. On failure the first malformed code is
/// returned.
pub fn normalize_country_codes(raw: &str) -> Result<Option<String>, String> {
    let codes: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_lowercase)
        .collect();

    if let Some(bad) = codes
        .iter()
        .find(|c| c.len() != 2 || !c.chars().all(|ch| ch.is_ascii_alphabetic()))
    {
        return Err(bad.clone());
    }

    Ok((!codes.is_empty()).then(|| codes.join(",")))
}

/// The external geocoding services this crate can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Commercial, token-authenticated provider.
    Mapbox,
    /// Free, community-sourced provider with a strict usage policy.
    Nominatim,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mapbox => "mapbox",
            Self::Nominatim => "nominatim",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which provider the operator asked to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderSelector {
    /// Mapbox when a token is configured, Nominatim otherwise.
    #[default]
    Auto,
    Mapbox,
    Nominatim,
}

impl ProviderSelector {
    /// Parse a selector; unknown values fall back to `Auto`.
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "mapbox" => Self::Mapbox,
            "nominatim" | "osm" => Self::Nominatim,
            _ => Self::Auto,
        }
    }
}
