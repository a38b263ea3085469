//! Nominatim Forward Geocoding Client
//!
//! A Rust client for the [Nominatim](https://nominatim.org/) search API that
//! resolves free-text addresses to coordinates, with built-in rate limiting
//! (1 req/sec) and moka async caching.

mod client;
mod error;
mod types;

pub use client::{NominatimClient, DEFAULT_BASE_URL};
pub use error::{NominatimError, Result};
pub use types::GeocodedPlace;
