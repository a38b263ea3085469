//! Rainfall Client: [`Coordinate`] to intensity and depth tables
//!
//! The oracle is generative, so two calls for the same point may disagree.
//! Answers are neither cached nor deduplicated.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use gemini_client::{GeminiClient, GeminiError, Schema};
use tracing::{debug, warn};

use crate::coordinate::Coordinate;
use crate::dataset::{DatasetError, RainfallDataset, RainfallResponse, ReturnPeriod, StormDuration};

/// Retrieves precipitation-frequency estimates for a point
#[async_trait]
pub trait RainfallSource: Send + Sync {
    async fn fetch_estimates(&self, coordinate: Coordinate) -> Result<RainfallDataset, RainfallError>;
}

#[derive(Debug)]
pub enum RainfallError {
    /// Transport failure or error status
    Oracle(String),
    EmptyResponse,
    /// Not JSON, or missing `intensityTable` / `depthTable` / record fields
    Malformed(String),
    /// Parsed, but breaks a table invariant
    InvalidDataset(DatasetError),
}

impl fmt::Display for RainfallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oracle(msg) => write!(f, "Rainfall service failed: {}", msg),
            Self::EmptyResponse => write!(f, "API returned an empty response."),
            Self::Malformed(msg) => write!(f, "Rainfall response is malformed: {}", msg),
            Self::InvalidDataset(e) => write!(f, "Rainfall response is invalid: {}", e),
        }
    }
}

impl std::error::Error for RainfallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidDataset(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DatasetError> for RainfallError {
    fn from(e: DatasetError) -> Self {
        Self::InvalidDataset(e)
    }
}

/// Parse and validate the oracle's JSON answer
pub fn parse_estimates(text: &str) -> Result<RainfallDataset, RainfallError> {
    if text.trim().is_empty() {
        return Err(RainfallError::EmptyResponse);
    }
    let response: RainfallResponse =
        serde_json::from_str(text).map_err(|e| RainfallError::Malformed(e.to_string()))?;
    Ok(RainfallDataset::from_wire(&response)?)
}

/// Estimates from the generative oracle
pub struct GeminiRainfallClient {
    client: Arc<GeminiClient>,
    schema: Schema,
}

impl GeminiRainfallClient {
    pub fn new(client: Arc<GeminiClient>) -> Self {
        Self {
            client,
            schema: estimates_schema(),
        }
    }
}

#[async_trait]
impl RainfallSource for GeminiRainfallClient {
    async fn fetch_estimates(&self, coordinate: Coordinate) -> Result<RainfallDataset, RainfallError> {
        let text = self
            .client
            .generate_json(&estimates_prompt(coordinate), &self.schema)
            .await
            .map_err(|e| {
                warn!(lat = coordinate.latitude(), lon = coordinate.longitude(), error = %e, "Rainfall request failed");
                match e {
                    GeminiError::EmptyResponse => RainfallError::EmptyResponse,
                    other => RainfallError::Oracle(other.to_string()),
                }
            })?;

        let dataset = parse_estimates(&text).inspect_err(|e| {
            warn!(lat = coordinate.latitude(), lon = coordinate.longitude(), error = %e, "Rainfall response rejected");
        })?;

        debug!(
            lat = coordinate.latitude(),
            lon = coordinate.longitude(),
            max_100yr_intensity = dataset.max_intensity(ReturnPeriod::Hundred),
            "Received rainfall estimates"
        );
        Ok(dataset)
    }
}

fn record_schema(quantity: &str, unit: &str) -> Schema {
    let mut schema = Schema::object().property(
        "duration",
        Schema::string().describe("The time duration for the rainfall event (e.g., '5-min', '24-hr')."),
    );
    for period in ReturnPeriod::ALL {
        schema = schema.property(
            period.label(),
            Schema::number().describe(&format!(
                "Rainfall {} for a {}-year return period in {}.",
                quantity,
                period.years(),
                unit
            )),
        );
    }
    let mut required = vec!["duration"];
    required.extend(ReturnPeriod::ALL.iter().map(|p| p.label()));
    schema.require(&required)
}

fn estimates_schema() -> Schema {
    Schema::object()
        .property(
            "intensityTable",
            Schema::array(record_schema("intensity", "inches/hour")).describe(
                "An array of rainfall intensity-duration-frequency data points in inches/hour.",
            ),
        )
        .property(
            "depthTable",
            Schema::array(record_schema("depth", "inches"))
                .describe("An array of rainfall depth-duration-frequency data points in inches."),
        )
        .require(&["intensityTable", "depthTable"])
}

fn estimates_prompt(coordinate: Coordinate) -> String {
    let durations: Vec<String> = StormDuration::ALL
        .iter()
        .map(|d| format!("'{}'", d.label()))
        .collect();
    format!(
        "You are an expert hydrologist providing precipitation frequency data in the style of \
         NOAA Atlas 14.\n\
         For the coordinates Latitude: {lat}, Longitude: {lon}, generate two realistic \
         precipitation frequency estimate tables.\n\
         1. An intensity table where values are rainfall intensity in inches/hour.\n\
         2. A depth table where values are rainfall depth in inches.\n\
         For both tables, the durations should be {durations}.\n\
         The values should be scientifically plausible for the given coordinates.\n\
         Ensure the output is a valid JSON object matching the provided schema, containing both \
         'intensityTable' and 'depthTable' arrays.",
        lat = coordinate.latitude(),
        lon = coordinate.longitude(),
        durations = durations.join(", ")
    )
}
