//! Rainfall Retriever
//!
//! Precipitation-frequency estimates (NOAA Atlas 14 style intensity and depth
//! tables) for a map point or a U.S. address. The crate holds the retrieval
//! core (form state, both oracle clients, the orchestrator and the map
//! surface) plus the HTTP API and CLI built on it.

pub mod config;
pub mod coordinate;
pub mod dataset;
pub mod error;
pub mod export;
pub mod geocoding;
pub mod map;
pub mod orchestrator;
pub mod rainfall;
pub mod server;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use gemini_client::GeminiClient;
use nominatim_client::NominatimClient;
use tracing::info;

pub use config::{Config, ConfigError, GeocoderBackend};
pub use coordinate::{Coordinate, CoordinateError, LatLng};
pub use dataset::{RainfallDataset, ReturnPeriod, StormDuration, TableKind};
pub use error::{ErrorKind, Failure, StartupError};
pub use geocoding::{Geocoder, GeocodingError};
pub use orchestrator::{FormState, InputMode, Orchestrator, Phase, Snapshot, SubmitOutcome};
pub use rainfall::{RainfallError, RainfallSource};
pub use server::{create_router, start_server, ServerState, SharedState};

/// Wire the configured oracle clients into a fresh orchestrator
pub fn build_orchestrator(config: &Config) -> Orchestrator {
    let gemini = match &config.gemini_base_url {
        Some(url) => GeminiClient::with_base_url(&config.gemini_api_key, url),
        None => GeminiClient::new(&config.gemini_api_key),
    }
    .with_model(&config.gemini_model);
    let gemini = Arc::new(gemini);

    let geocoder: Arc<dyn Geocoder> = match config.geocoder {
        GeocoderBackend::Gemini => Arc::new(geocoding::GeminiGeocoder::new(gemini.clone())),
        GeocoderBackend::Nominatim => {
            let base_url = config
                .nominatim_url
                .as_deref()
                .unwrap_or(nominatim_client::DEFAULT_BASE_URL);
            let client = match &config.nominatim_user_agent {
                Some(agent) => NominatimClient::with_base_url_and_user_agent(base_url, agent),
                None => NominatimClient::with_base_url(base_url),
            };
            Arc::new(geocoding::NominatimGeocoder::new(client))
        }
    };

    info!(model = gemini.model(), geocoder = ?config.geocoder, "Oracle clients configured");
    Orchestrator::new(geocoder, Arc::new(rainfall::GeminiRainfallClient::new(gemini)))
}
