//! Reverse Geocoding Enrichment
//!
//! A new mark optionally carries a human-readable street label. The lookup
//! is strictly best-effort: any failure, timeout, or empty answer collapses
//! to `None`, and mark creation proceeds without a label. Nothing in this
//! module may surface an error to the creation path.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Nominatim reverse endpoint.
const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/reverse";

/// Timeout for a single lookup. Creation must never hang on enrichment.
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

/// Identifies us to Nominatim, as their usage policy asks.
const USER_AGENT: &str = concat!("embermark/", env!("CARGO_PKG_VERSION"));

/// The enrichment seam. Production uses [`NominatimGeocoder`]; tests use
/// fakes; deployments without enrichment use [`NoopGeocoder`].
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Best-effort lookup of a label for the coordinates.
    async fn lookup(&self, lat: f64, lng: f64) -> Option<String>;
}

/// Always answers `None`. Used when enrichment is switched off.
pub struct NoopGeocoder;

#[async_trait]
impl ReverseGeocoder for NoopGeocoder {
    async fn lookup(&self, _lat: f64, _lng: f64) -> Option<String> {
        None
    }
}

#[derive(Debug, Error)]
enum GeocodeError {
    #[error("geocoder returned status {0}")]
    Status(u16),
    #[error("geocode request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Relevant subset of a Nominatim `jsonv2` reverse response.
#[derive(Debug, Default, Deserialize)]
struct NominatimPlace {
    name: Option<String>,
    display_name: Option<String>,
    #[serde(default)]
    address: NominatimAddress,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    road: Option<String>,
    pedestrian: Option<String>,
    house_number: Option<String>,
}

impl NominatimPlace {
    /// Picks the most stable street label: road (with house number when
    /// both exist), then pedestrian way, then the place name fields.
    fn label(&self) -> Option<String> {
        if let Some(road) = &self.address.road {
            if let Some(house) = &self.address.house_number {
                return Some(format!("{road} {house}"));
            }
            return Some(road.clone());
        }
        self.address
            .pedestrian
            .clone()
            .or_else(|| self.name.clone())
            .or_else(|| self.display_name.clone())
    }
}

/// Reverse geocoder backed by the public Nominatim service.
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: NOMINATIM_URL.to_string(),
        }
    }

    /// Points the geocoder at a different endpoint. Test hook.
    #[cfg(test)]
    fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn fetch(&self, lat: f64, lng: f64) -> Result<NominatimPlace, GeocodeError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("format", "jsonv2"),
                ("lat", &lat.to_string()),
                ("lon", &lng.to_string()),
                ("zoom", "18"),
                ("addressdetails", "1"),
            ])
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json")
            .timeout(LOOKUP_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Status(status.as_u16()));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn lookup(&self, lat: f64, lng: f64) -> Option<String> {
        match self.fetch(lat, lng).await {
            Ok(place) => place.label(),
            Err(err) => {
                debug!(lat, lng, %err, "reverse geocode failed, creating mark without label");
                None
            }
        }
    }
}
