//! Reverse Geocoding Port
//!
//! Defines the interface for resolving a point to an address.

use crate::domain::entities::GeocodeResult;
use crate::domain::errors::ProviderError;
use crate::domain::value_objects::{Coordinates, ProviderKind};
use async_trait::async_trait;

/// Resolver for a WGS84 point to the nearest address.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Which service this adapter talks to.
    fn kind(&self) -> ProviderKind;

    /// Whether calls must pass through the rate limiter first.
    fn is_rate_limited(&self) -> bool {
        false
    }

    /// Returns `Ok(None)` when the provider knows no address at the point.
    async fn reverse_geocode(&self, point: Coordinates) -> Result<Option<GeocodeResult>, ProviderError>;
}
