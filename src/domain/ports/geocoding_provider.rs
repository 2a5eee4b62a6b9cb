//! Forward Geocoding Port
//!
//! Defines the interface every forward-geocoding adapter implements.

use crate::domain::entities::{GeocodeQuery, ProviderOutcome};
use crate::domain::errors::ProviderError;
use crate::domain::value_objects::ProviderKind;
use async_trait::async_trait;

/// Resolver for free text or a postal code to a list of places.
///
/// This is an outbound port that abstracts an external geocoding service.
/// Implementations must map their native response into `GeocodeResult`
/// and must report an empty answer as `ProviderOutcome::Empty`, never as
/// an error.
#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    /// Which service this adapter talks to.
    fn kind(&self) -> ProviderKind;

    /// Whether calls must pass through the rate limiter first.
    fn is_rate_limited(&self) -> bool {
        false
    }

    /// Resolve a validated query.
    ///
    /// When `query.postal_code` is set the adapter should use its
    /// postal-code-scoped search path.
    async fn forward_geocode(&self, query: &GeocodeQuery) -> Result<ProviderOutcome, ProviderError>;
}
