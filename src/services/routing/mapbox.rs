//! Mapbox geocoding and directions client
//!
//! API documentation:
//! https://docs.mapbox.com/api/search/geocoding-v5/
//! https://docs.mapbox.com/api/navigation/directions/

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{GeoPoint, RouteLeg, RoutingProvider};

/// Mapbox client configuration
#[derive(Debug, Clone)]
pub struct MapboxConfig {
    pub access_token: String,
    /// Base URL (e.g., "https://api.mapbox.com")
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Countries searched by the geocoder
    pub countries: String,
}

impl Default for MapboxConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            base_url: "https://api.mapbox.com".to_string(),
            timeout_seconds: 20,
            countries: "ca,us".to_string(),
        }
    }
}

impl MapboxConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            ..Default::default()
        }
    }
}

pub struct MapboxClient {
    client: Client,
    config: MapboxConfig,
}

impl MapboxClient {
    pub fn new(config: MapboxConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    fn geocode_url(&self, query: &str) -> String {
        format!(
            "{}/geocoding/v5/mapbox.places/{}.json?access_token={}&limit=1&country={}",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(query),
            self.config.access_token,
            self.config.countries,
        )
    }

    fn directions_url(&self, from: &GeoPoint, to: &GeoPoint) -> String {
        format!(
            "{}/directions/v5/mapbox/driving/{:.6},{:.6};{:.6},{:.6}?access_token={}&overview=false",
            self.config.base_url.trim_end_matches('/'),
            from.longitude,
            from.latitude,
            to.longitude,
            to.latitude,
            self.config.access_token,
        )
    }
}

#[async_trait]
impl RoutingProvider for MapboxClient {
    async fn geocode(&self, query: &str) -> Result<Option<GeoPoint>> {
        debug!("Geocoding '{}' via Mapbox", query);

        let response = self
            .client
            .get(self.geocode_url(query))
            .send()
            .await
            .context("Failed to send geocoding request to Mapbox")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Mapbox geocoding returned error {}: {}", status, body);
        }

        let body: GeocodeResponse = response
            .json()
            .await
            .context("Failed to parse Mapbox geocoding response")?;

        Ok(body.features.into_iter().next().map(|f| f.into_point(query)))
    }

    async fn route(&self, from: &GeoPoint, to: &GeoPoint) -> Result<RouteLeg> {
        debug!("Requesting Mapbox route {} -> {}", from.query, to.query);

        let response = self
            .client
            .get(self.directions_url(from, to))
            .send()
            .await
            .context("Failed to send directions request to Mapbox")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Mapbox directions returned error {}: {}", status, body);
        }

        let body: DirectionsResponse = response
            .json()
            .await
            .context("Failed to parse Mapbox directions response")?;

        body.into_leg()
    }

    fn name(&self) -> &str {
        "Mapbox"
    }
}

// ==========================================================================
// Mapbox API types
// ==========================================================================

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    /// [lng, lat]
    center: [f64; 2],
    #[serde(default)]
    text: String,
    #[serde(default)]
    place_type: Vec<String>,
    #[serde(default)]
    properties: FeatureProperties,
    #[serde(default)]
    context: Vec<ContextEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct FeatureProperties {
    #[serde(default)]
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContextEntry {
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    short_code: Option<String>,
}

impl Feature {
    fn into_point(self, query: &str) -> GeoPoint {
        let short_address = self.short_address();
        let mut place_categories: Vec<String> = self
            .properties
            .category
            .as_deref()
            .map(|c| {
                c.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        place_categories.extend(self.place_type);

        GeoPoint {
            query: query.to_string(),
            latitude: self.center[1],
            longitude: self.center[0],
            short_address,
            place_categories,
        }
    }

    /// "City, PROV" from the place and region entries
    fn short_address(&self) -> Option<String> {
        let city = if self.place_type.iter().any(|t| t == "place") {
            Some(self.text.clone())
        } else {
            self.context
                .iter()
                .find(|c| c.id.starts_with("place."))
                .map(|c| c.text.clone())
        };
        let region = self
            .context
            .iter()
            .find(|c| c.id.starts_with("region."))
            .and_then(|c| c.short_code.as_deref())
            .map(|code| code.rsplit('-').next().unwrap_or(code).to_uppercase());

        match (city, region) {
            (Some(city), Some(region)) => Some(format!("{}, {}", city, region)),
            (Some(city), None) => Some(city),
            (None, Some(region)) => Some(region),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    code: String,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Debug, Deserialize)]
struct DirectionsRoute {
    /// meters
    distance: f64,
    /// seconds
    duration: f64,
}

impl DirectionsResponse {
    fn into_leg(self) -> Result<RouteLeg> {
        let route = self
            .routes
            .into_iter()
            .next()
            .with_context(|| format!("Mapbox returned no route (code {})", self.code))?;
        Ok(RouteLeg {
            distance_km: route.distance / 1000.0,
            drive_hours: route.duration / 3600.0,
        })
    }
}
