use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::models::location::Location;

const SEARCH_LIMIT: usize = 5;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!("fast-shipping/", env!("CARGO_PKG_VERSION"));

/// Nominatim-compatible address lookups.
#[derive(Debug, Clone)]
pub struct Geocoder {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
    display_name: String,
}

impl SearchHit {
    fn into_location(self) -> Option<Location> {
        let latitude = self.lat.parse().ok()?;
        let longitude = self.lon.parse().ok()?;
        Some(Location {
            latitude,
            longitude,
            address: Some(self.display_name),
        })
    }
}

impl Geocoder {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(&config.geocoder_url)
    }

    /// Human-readable address for `location`. Never fails: lookups that go
    /// wrong fall back to the coordinate label.
    pub async fn reverse(&self, location: &Location) -> String {
        match self.lookup_address(location).await {
            Ok(Some(address)) => address,
            Ok(None) => {
                debug!(
                    latitude = location.latitude,
                    longitude = location.longitude,
                    "no address for coordinates"
                );
                location.coordinate_label()
            }
            Err(err) => {
                warn!(error = %err, "reverse geocoding failed");
                location.coordinate_label()
            }
        }
    }

    /// Fills in `location.address` from a reverse lookup.
    pub async fn annotate(&self, location: Location) -> Location {
        let address = self.reverse(&location).await;
        Location {
            address: Some(address),
            ..location
        }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<Location>, AppError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let limit = SEARCH_LIMIT.to_string();
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("format", "json"),
                ("q", query),
                ("limit", limit.as_str()),
                ("addressdetails", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::from_status(
                status,
                format!("geocoder search returned {status}"),
            ));
        }

        let hits: Vec<SearchHit> = response.json().await?;
        Ok(hits
            .into_iter()
            .filter_map(SearchHit::into_location)
            .take(SEARCH_LIMIT)
            .collect())
    }

    async fn lookup_address(&self, location: &Location) -> Result<Option<String>, AppError> {
        let latitude = location.latitude.to_string();
        let longitude = location.longitude.to_string();
        let response = self
            .client
            .get(format!("{}/reverse", self.base_url))
            .query(&[
                ("format", "json"),
                ("lat", latitude.as_str()),
                ("lon", longitude.as_str()),
                ("zoom", "16"),
                ("addressdetails", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Unavailable(format!(
                "geocoder reverse returned {status}"
            )));
        }

        let body: ReverseResponse = response.json().await?;
        Ok(body
            .display_name
            .filter(|name| !name.trim().is_empty()))
    }
}
