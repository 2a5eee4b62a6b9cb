mod geocoding_service;

pub use geocoding_service::{
    select_providers, GeocodingService, GeocodingServiceBuilder, SearchDefaults,
    MAX_QUERY_CHARS,
};
