use std::time::Duration;

use moka::future::Cache;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::NominatimError;
use crate::types::{GeocodedPlace, NominatimPlace};

pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";
const DEFAULT_USER_AGENT: &str = "nominatim-client-rs/0.1";
const DEFAULT_COUNTRY_CODES: &str = "us";
const CACHE_TTL_SECS: u64 = 86400; // 24 hours
const REQUEST_INTERVAL: Duration = Duration::from_millis(1100);

/// Nominatim forward geocoding client with rate limiting and caching
pub struct NominatimClient {
    client: reqwest::Client,
    base_url: String,
    country_codes: String,
    cache: Cache<String, Option<GeocodedPlace>>,
    /// Semaphore to enforce 1 request/second rate limit
    rate_limiter: Semaphore,
    request_interval: Duration,
}

impl NominatimClient {
    /// Create a new client with default settings
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a new client with a custom Nominatim URL
    pub fn with_base_url(base_url: &str) -> Self {
        Self::with_base_url_and_user_agent(base_url, DEFAULT_USER_AGENT)
    }

    /// Create a new client with a custom Nominatim URL and user agent
    pub fn with_base_url_and_user_agent(base_url: &str, user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()
            .expect("Failed to create HTTP client");

        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(CACHE_TTL_SECS))
            .build();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            country_codes: DEFAULT_COUNTRY_CODES.to_string(),
            cache,
            rate_limiter: Semaphore::new(1),
            request_interval: REQUEST_INTERVAL,
        }
    }

    /// Restrict results to a comma-separated list of ISO 3166-1 alpha-2 codes
    pub fn with_country_codes(mut self, codes: &str) -> Self {
        self.country_codes = codes.to_lowercase();
        self
    }

    /// Override the pause held after each request (self-hosted instances need none)
    pub fn with_request_interval(mut self, interval: Duration) -> Self {
        self.request_interval = interval;
        self
    }

    /// Resolve a free-text address to its best matching place
    ///
    /// `Ok(None)` means Nominatim answered but found nothing.
    pub async fn search(&self, query: &str) -> crate::Result<Option<GeocodedPlace>> {
        let cache_key = normalize_query(query);
        if cache_key.is_empty() {
            return Err(NominatimError::EmptyQuery);
        }

        // Check cache
        if let Some(cached) = self.cache.get(&cache_key).await {
            return Ok(cached);
        }

        // Rate limit: acquire permit, then wait after the request
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|_| NominatimError::ApiError("rate limiter closed".to_string()))?;

        let mut url = format!(
            "{}/search?q={}&format=jsonv2&limit=1",
            self.base_url,
            urlencoding::encode(query.trim())
        );
        if !self.country_codes.is_empty() {
            url.push_str(&format!(
                "&countrycodes={}",
                urlencoding::encode(&self.country_codes)
            ));
        }

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(NominatimError::Http)?;

        if !response.status().is_success() {
            return Err(NominatimError::ApiError(format!(
                "Nominatim returned status {}",
                response.status()
            )));
        }

        let places: Vec<NominatimPlace> = response.json().await.map_err(NominatimError::Http)?;

        let result = match places.first() {
            Some(place) => Some(parse_place(place)?),
            None => {
                warn!(query = %cache_key, "Nominatim found no match");
                None
            }
        };

        if let Some(ref place) = result {
            debug!(
                query = %cache_key,
                lat = place.latitude,
                lon = place.longitude,
                "Geocoded address"
            );
        }

        self.cache.insert(cache_key, result.clone()).await;

        // Delay to respect rate limit (1 req/sec)
        tokio::time::sleep(self.request_interval).await;

        Ok(result)
    }
}

impl Default for NominatimClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase and collapse whitespace so trivially different spellings share a cache entry
fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Parse Nominatim's string coordinates
fn parse_place(place: &NominatimPlace) -> crate::Result<GeocodedPlace> {
    let latitude = parse_coordinate("lat", &place.lat)?;
    let longitude = parse_coordinate("lon", &place.lon)?;

    Ok(GeocodedPlace {
        latitude,
        longitude,
        display_name: place.display_name.clone(),
    })
}

fn parse_coordinate(field: &str, value: &str) -> crate::Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| NominatimError::InvalidResponse(format!("{field} is not a number: {value:?}")))
}
