//! Domain Layer
//!
//! Geocoding types, errors and ports. No I/O happens here.

pub mod entities;
pub mod errors;
pub mod ports;
pub mod services;
pub mod value_objects;
