use std::env;
use std::fmt;
use std::str::FromStr;

use axum::http::{header, Method};
use gemini_client::DEFAULT_MODEL;
use tower_http::cors::{Any, CorsLayer};

const DEFAULT_PORT: u16 = 3005;

/// Which service resolves addresses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeocoderBackend {
    #[default]
    Gemini,
    Nominatim,
}

impl FromStr for GeocoderBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "nominatim" => Ok(Self::Nominatim),
            other => Err(format!("unknown geocoder '{}'", other)),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVar(&'static str),
    InvalidVar { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingVar(name) => {
                write!(f, "{} environment variable is required", name)
            }
            ConfigError::InvalidVar { name, value } => {
                write!(f, "Invalid value for {}: '{}'", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Application configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: Option<String>,
    pub geocoder: GeocoderBackend,
    pub nominatim_url: Option<String>,
    pub nominatim_user_agent: Option<String>,
    pub cors_origins: Vec<String>,
    pub log_json: bool,
}

impl Config {
    /// Parse configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Parse configuration from any variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = match var("PORT") {
            Some(p) => p.trim().parse().map_err(|_| ConfigError::InvalidVar {
                name: "PORT",
                value: p.clone(),
            })?,
            None => DEFAULT_PORT,
        };

        // The original deployment exposed the key as API_KEY
        let gemini_api_key = var("GEMINI_API_KEY")
            .or_else(|| var("API_KEY"))
            .ok_or(ConfigError::MissingVar("GEMINI_API_KEY"))?;

        let gemini_model = var("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let geocoder = match var("GEOCODER") {
            Some(g) => g.parse().map_err(|_| ConfigError::InvalidVar {
                name: "GEOCODER",
                value: g.clone(),
            })?,
            None => GeocoderBackend::default(),
        };

        let cors_origins = var("CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ]
            });

        let log_json = var("LOG_FORMAT").is_some_and(|v| v == "json");

        Ok(Self {
            port,
            gemini_api_key,
            gemini_model,
            gemini_base_url: var("GEMINI_BASE_URL"),
            geocoder,
            nominatim_url: var("NOMINATIM_URL"),
            nominatim_user_agent: var("NOMINATIM_USER_AGENT"),
            cors_origins,
            log_json,
        })
    }

    pub fn cors_layer(&self) -> CorsLayer {
        if self.cors_origins.iter().any(|o| o == "*") {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = self
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST, Method::PUT])
                .allow_headers([header::CONTENT_TYPE])
        }
    }
}
