//! Geocoding Client: free-text U.S. address to [`Coordinate`]
//!
//! One external call per request and no retries. Any failure is terminal for
//! the retrieval that asked for it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use gemini_client::{GeminiClient, GeminiError, Schema};
use nominatim_client::{NominatimClient, NominatimError};
use serde_json::Value;
use tracing::{debug, warn};

use crate::coordinate::Coordinate;

/// Resolves an address to a coordinate
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<Coordinate, GeocodingError>;
}

#[derive(Debug)]
pub enum GeocodingError {
    EmptyAddress,
    /// Transport failure, error status, or an empty answer
    Oracle(String),
    /// Unparsable answer or missing / non-numeric / out-of-range coordinates
    Malformed(String),
    NotFound,
}

impl fmt::Display for GeocodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyAddress => write!(f, "No address to geocode"),
            Self::Oracle(msg) => write!(f, "Geocoding service failed: {}", msg),
            Self::Malformed(msg) => write!(f, "Geocoding response is malformed: {}", msg),
            Self::NotFound => write!(f, "No location found for the address"),
        }
    }
}

impl std::error::Error for GeocodingError {}

/// Geocoding through the generative oracle
pub struct GeminiGeocoder {
    client: Arc<GeminiClient>,
    schema: Schema,
}

impl GeminiGeocoder {
    pub fn new(client: Arc<GeminiClient>) -> Self {
        Self {
            client,
            schema: geocode_schema(),
        }
    }
}

#[async_trait]
impl Geocoder for GeminiGeocoder {
    async fn geocode(&self, address: &str) -> Result<Coordinate, GeocodingError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(GeocodingError::EmptyAddress);
        }

        let text = self
            .client
            .generate_json(&geocode_prompt(address), &self.schema)
            .await
            .map_err(|e| {
                warn!(error = %e, "Geocoding request failed");
                match e {
                    GeminiError::EmptyResponse => GeocodingError::Oracle(
                        "API returned an empty response for geocoding".to_string(),
                    ),
                    other => GeocodingError::Oracle(other.to_string()),
                }
            })?;

        let coordinate = parse_geocode_answer(&text)?;
        debug!(lat = coordinate.latitude(), lon = coordinate.longitude(), "Geocoded address");
        Ok(coordinate)
    }
}

fn geocode_schema() -> Schema {
    Schema::object()
        .property("latitude", Schema::number().describe("The latitude coordinate."))
        .property("longitude", Schema::number().describe("The longitude coordinate."))
        .require(&["latitude", "longitude"])
}

fn geocode_prompt(address: &str) -> String {
    format!(
        "You are an expert geocoding service. Convert the given U.S. address into precise \
         latitude and longitude coordinates.\n\
         The address is: \"{address}\".\n\
         Respond ONLY with a valid JSON object that matches the specified schema, containing \
         'latitude' and 'longitude' keys.\n\
         Example response: {{ \"latitude\": 34.0522, \"longitude\": -118.2437 }}"
    )
}

/// Accepts only a JSON object with numeric, in-range `latitude` and `longitude`
pub fn parse_geocode_answer(text: &str) -> Result<Coordinate, GeocodingError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| GeocodingError::Malformed(format!("not JSON: {}", e)))?;

    let latitude = value.get("latitude").and_then(Value::as_f64);
    let longitude = value.get("longitude").and_then(Value::as_f64);

    match (latitude, longitude) {
        (Some(lat), Some(lon)) => {
            Coordinate::new(lat, lon).map_err(|e| GeocodingError::Malformed(e.to_string()))
        }
        _ => Err(GeocodingError::Malformed(
            "missing numeric latitude or longitude".to_string(),
        )),
    }
}

/// Geocoding through a Nominatim instance
pub struct NominatimGeocoder {
    client: NominatimClient,
}

impl NominatimGeocoder {
    pub fn new(client: NominatimClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, address: &str) -> Result<Coordinate, GeocodingError> {
        match self.client.search(address).await {
            Ok(Some(place)) => Coordinate::new(place.latitude, place.longitude)
                .map_err(|e| GeocodingError::Malformed(e.to_string())),
            Ok(None) => Err(GeocodingError::NotFound),
            Err(NominatimError::EmptyQuery) => Err(GeocodingError::EmptyAddress),
            Err(NominatimError::InvalidResponse(msg)) => Err(GeocodingError::Malformed(msg)),
            Err(e) => {
                warn!(error = %e, "Nominatim search failed");
                Err(GeocodingError::Oracle(e.to_string()))
            }
        }
    }
}
