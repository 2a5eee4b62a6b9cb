mod geocoding_provider;
mod reverse_geocoder;

pub use geocoding_provider::GeocodingProvider;
pub use reverse_geocoder::ReverseGeocoder;
