//! site-geocoder Library
//!
//! This module exposes the geocoding components for use in integration tests
//! and as a library.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{GeocodingService, SearchDefaults};
pub use config::{load_config, load_config_from, Config};
pub use domain::entities::{Address, GeocodeQuery, GeocodeResult, ProviderOutcome, SearchOptions};
pub use domain::errors::{GeocodeError, ProviderError};
pub use domain::ports::{GeocodingProvider, ReverseGeocoder};
pub use domain::services::{classify, QueryClass};
pub use domain::value_objects::{BoundingBox, Coordinates, PostalCode, ProviderKind, ProviderSelector};
