//! IP Geolocation
//!
//! Looks up where a node IP is located using the ipstack API. Results are
//! cached in the store by the crawler, so each IP is queried at most once.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::types::Location;

use super::util::location_from_coordinates;

/// Errors raised by a geolocation lookup
#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("geolocation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("geolocation service error {code} ({kind}): {info}")]
    Api { code: i64, kind: String, info: String },
}

/// Request/response contract with a geolocation service
#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn check(&self, ip: &str) -> Result<Location, GeoError>;
}

/// Client for the ipstack geolocation API
pub struct IpStackClient {
    http: reqwest::Client,
    endpoint: String,
    access_key: String,
}

impl IpStackClient {
    pub fn new(endpoint: &str, access_key: &str, timeout: Duration) -> Result<Self, GeoError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            access_key: access_key.to_string(),
        })
    }
}

#[async_trait]
impl Geolocator for IpStackClient {
    async fn check(&self, ip: &str) -> Result<Location, GeoError> {
        let url = format!("{}/{}", self.endpoint, ip);
        let response: IpStackResponse = self
            .http
            .get(&url)
            .query(&[("access_key", self.access_key.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response.into_location()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IpStackResponse {
    success: Option<bool>,
    error: Option<IpStackError>,
    country_name: Option<String>,
    region_name: Option<String>,
    city: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct IpStackError {
    code: i64,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    info: String,
}

impl IpStackResponse {
    fn into_location(self) -> Result<Location, GeoError> {
        if let Some(error) = self.error {
            return Err(GeoError::Api {
                code: error.code,
                kind: error.kind,
                info: error.info,
            });
        }

        if self.success == Some(false) {
            return Err(GeoError::Api {
                code: 0,
                kind: "unknown".to_string(),
                info: "request was not successful".to_string(),
            });
        }

        Ok(location_from_coordinates(
            self.country_name.as_deref().unwrap_or_default(),
            self.region_name.as_deref().unwrap_or_default(),
            self.city.as_deref().unwrap_or_default(),
            self.latitude.unwrap_or_default(),
            self.longitude.unwrap_or_default(),
        ))
    }
}
