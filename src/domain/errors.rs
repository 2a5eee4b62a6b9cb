//! Error taxonomy
//!
//! `ProviderError` is what adapters raise; `GeocodeError` is what callers of
//! the service see.

use crate::domain::value_objects::ProviderKind;
use std::time::Duration;

/// Failure talking to an external geocoding service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} returned HTTP {status}: {message}")]
    Http {
        provider: ProviderKind,
        status: u16,
        message: String,
    },
    #[error("{provider} rejected the request with HTTP 429")]
    RateLimited {
        provider: ProviderKind,
        retry_after: Option<Duration>,
    },
    #[error("{provider} request failed: {message}")]
    Transport {
        provider: ProviderKind,
        message: String,
    },
    #[error("{provider} returned an unreadable response: {message}")]
    Decode {
        provider: ProviderKind,
        message: String,
    },
}

impl ProviderError {
    /// Classify a `reqwest` failure.
    pub fn from_reqwest(provider: ProviderKind, err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode {
                provider,
                message: err.to_string(),
            }
        } else {
            Self::Transport {
                provider,
                message: err.to_string(),
            }
        }
    }

    /// 5xx and connection-level failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status >= 500,
            Self::Transport { .. } => true,
            Self::RateLimited { .. } | Self::Decode { .. } => false,
        }
    }

    pub fn provider(&self) -> ProviderKind {
        match self {
            Self::Http { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::Transport { provider, .. }
            | Self::Decode { provider, .. } => *provider,
        }
    }
}

/// Error surfaced by the geocoding service.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeocodeError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("rate limit exceeded, retry in {retry_after_ms} ms")]
    RateLimit { retry_after_ms: u64 },
    #[error("geocoding failed: {message}")]
    Provider { status: Option<u16>, message: String },
}

impl GeocodeError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Stable code for the web layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::RateLimit { .. } => "RATE_LIMIT",
            Self::Provider { .. } => "GEOCODE_ERROR",
        }
    }

    /// HTTP-like status the web layer should answer with.
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::RateLimit { .. } => 429,
            Self::Provider {
                status: Some(status),
                ..
            } => *status,
            Self::Provider { status: None, .. } => 502,
        }
    }
}

impl From<ProviderError> for GeocodeError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::RateLimited { retry_after, .. } => Self::RateLimit {
                retry_after_ms: retry_after.map(|d| d.as_millis() as u64).unwrap_or(1000),
            },
            ProviderError::Http { status, .. } => Self::Provider {
                status: Some(status),
                message: err.to_string(),
            },
            ProviderError::Transport { .. } | ProviderError::Decode { .. } => Self::Provider {
                status: None,
                message: err.to_string(),
            },
        }
    }
}
