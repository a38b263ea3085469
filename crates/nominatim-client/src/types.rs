use serde::Deserialize;

/// Best match for an address search
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedPlace {
    pub latitude: f64,
    pub longitude: f64,
    pub display_name: Option<String>,
}

/// One entry of the `/search` array. Nominatim encodes coordinates as strings.
#[derive(Debug, Deserialize)]
pub(crate) struct NominatimPlace {
    pub(crate) lat: String,
    pub(crate) lon: String,
    pub(crate) display_name: Option<String>,
}
