//! Routing and geocoding for dispatch
//!
//! Uses Mapbox for production, mock for tests. `RoutingClient` wraps any
//! provider with caching, timeouts, retries and the straight-line fallback,
//! so callers always get a leg back (possibly degraded with a warning).

mod cache;
mod mapbox;

pub use cache::{cache_key, normalize_address, RouteCache};
pub use mapbox::{MapboxClient, MapboxConfig};

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDateTime, Timelike};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Degraded, RoutingWarning, Warnings};
use crate::services::geo::{estimate_leg, Coordinates, DEFAULT_FALLBACK_SPEED_KMH, ROAD_COEFFICIENT};
use crate::types::Stop;

/// Geocoded address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub query: String,
    pub latitude: f64,
    pub longitude: f64,
    /// "Barrie, ON"
    pub short_address: Option<String>,
    #[serde(default)]
    pub place_categories: Vec<String>,
}

impl GeoPoint {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// Driving distance and time between two addresses
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RouteLeg {
    pub distance_km: f64,
    pub drive_hours: f64,
}

impl RouteLeg {
    pub const fn zero() -> Self {
        Self {
            distance_km: 0.0,
            drive_hours: 0.0,
        }
    }
}

/// Legs from an origin through every stop, in order
#[derive(Debug, Clone, Default)]
pub struct TripSegments {
    /// `legs[i]` ends at stop `i`
    pub legs: Vec<RouteLeg>,
    pub warnings: Warnings,
}

impl TripSegments {
    pub fn total_distance_km(&self) -> f64 {
        self.legs.iter().map(|l| l.distance_km).sum()
    }
}

/// Provider trait for abstraction (Mapbox, mock, etc.)
#[async_trait]
pub trait RoutingProvider: Send + Sync {
    /// Geocode a free-form address. `Ok(None)` means no match.
    async fn geocode(&self, query: &str) -> Result<Option<GeoPoint>>;

    /// Driving route between two geocoded points
    async fn route(&self, from: &GeoPoint, to: &GeoPoint) -> Result<RouteLeg>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}

// ==========================================================================
// Mock provider
// ==========================================================================

/// Deterministic provider for tests and offline runs.
///
/// Addresses hash to stable coordinates in southern Ontario; legs are
/// straight line × road coefficient at a fixed speed unless overridden.
pub struct MockRoutingProvider {
    road_coefficient: f64,
    average_speed_kmh: f64,
    overrides: HashMap<(String, String), RouteLeg>,
    ungeocodable: HashSet<String>,
    fail_routes: bool,
    delay: Option<Duration>,
    route_calls: AtomicUsize,
    geocode_calls: AtomicUsize,
}

impl Default for MockRoutingProvider {
    fn default() -> Self {
        Self {
            road_coefficient: ROAD_COEFFICIENT,
            average_speed_kmh: DEFAULT_FALLBACK_SPEED_KMH,
            overrides: HashMap::new(),
            ungeocodable: HashSet::new(),
            fail_routes: false,
            delay: None,
            route_calls: AtomicUsize::new(0),
            geocode_calls: AtomicUsize::new(0),
        }
    }
}

impl MockRoutingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed leg for a pair of addresses, in both directions
    pub fn with_route(mut self, from: &str, to: &str, distance_km: f64, drive_hours: f64) -> Self {
        let leg = RouteLeg {
            distance_km,
            drive_hours,
        };
        self.overrides
            .insert((normalize_address(from), normalize_address(to)), leg);
        self.overrides
            .insert((normalize_address(to), normalize_address(from)), leg);
        self
    }

    pub fn with_ungeocodable(mut self, address: &str) -> Self {
        self.ungeocodable.insert(normalize_address(address));
        self
    }

    pub fn failing_routes(mut self) -> Self {
        self.fail_routes = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn route_calls(&self) -> usize {
        self.route_calls.load(Ordering::SeqCst)
    }

    pub fn geocode_calls(&self) -> usize {
        self.geocode_calls.load(Ordering::SeqCst)
    }

    fn hash_to_coordinates(query: &str) -> Coordinates {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        query.hash(&mut hasher);
        let hash = hasher.finish();

        // Southern Ontario, Windsor to Kingston
        const LAT_MIN: f64 = 42.5;
        const LAT_MAX: f64 = 45.0;
        const LNG_MIN: f64 = -81.5;
        const LNG_MAX: f64 = -76.5;

        let lat_normalized = ((hash >> 32) as f64) / (u32::MAX as f64);
        let lng_normalized = ((hash & 0xFFFF_FFFF) as f64) / (u32::MAX as f64);

        Coordinates::new(
            LAT_MIN + lat_normalized * (LAT_MAX - LAT_MIN),
            LNG_MIN + lng_normalized * (LNG_MAX - LNG_MIN),
        )
    }
}

#[async_trait]
impl RoutingProvider for MockRoutingProvider {
    async fn geocode(&self, query: &str) -> Result<Option<GeoPoint>> {
        self.geocode_calls.fetch_add(1, Ordering::SeqCst);
        let normalized = normalize_address(query);
        if normalized.is_empty() || self.ungeocodable.contains(&normalized) {
            return Ok(None);
        }
        let coords = Self::hash_to_coordinates(&normalized);
        Ok(Some(GeoPoint {
            query: query.to_string(),
            latitude: coords.lat,
            longitude: coords.lng,
            short_address: Some(query.to_string()),
            place_categories: Vec::new(),
        }))
    }

    async fn route(&self, from: &GeoPoint, to: &GeoPoint) -> Result<RouteLeg> {
        self.route_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_routes {
            anyhow::bail!("mock routing failure");
        }
        let key = (normalize_address(&from.query), normalize_address(&to.query));
        if let Some(leg) = self.overrides.get(&key) {
            return Ok(*leg);
        }
        let straight = crate::services::geo::haversine_distance(&from.coordinates(), &to.coordinates());
        let distance_km = straight * self.road_coefficient;
        Ok(RouteLeg {
            distance_km,
            drive_hours: distance_km / self.average_speed_kmh,
        })
    }

    fn name(&self) -> &str {
        "MockRouting"
    }
}

// ==========================================================================
// RoutingClient
// ==========================================================================

#[derive(Debug, Clone)]
pub struct RoutingClientConfig {
    /// Per-call provider timeout
    pub timeout: Duration,
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles after each failure
    pub initial_backoff: Duration,
    pub cache_ttl: Duration,
    /// Speed used for straight-line fallback legs
    pub fallback_speed_kmh: f64,
}

impl Default for RoutingClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            fallback_speed_kmh: DEFAULT_FALLBACK_SPEED_KMH,
        }
    }
}

pub struct RoutingClient {
    provider: Arc<dyn RoutingProvider>,
    config: RoutingClientConfig,
    routes: RouteCache,
    geocodes: Mutex<HashMap<String, GeoPoint>>,
}

impl RoutingClient {
    pub fn new(provider: Arc<dyn RoutingProvider>, config: RoutingClientConfig) -> Self {
        let routes = RouteCache::new(config.cache_ttl);
        Self {
            provider,
            config,
            routes,
            geocodes: Mutex::new(HashMap::new()),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn cached_routes(&self) -> usize {
        self.routes.len()
    }

    /// Geocode an address, cached per normalized address.
    pub async fn geocode(&self, address: &str) -> std::result::Result<GeoPoint, RoutingWarning> {
        let key = normalize_address(address);
        if key.is_empty() {
            return Err(RoutingWarning::new("Geocoding skipped: empty address"));
        }
        if let Some(hit) = self.geocodes.lock().get(&key).cloned() {
            debug!(address, "geocode cache hit");
            return Ok(hit);
        }

        let label = format!("geocode '{}'", address);
        match self.with_retry(&label, || self.provider.geocode(address)).await {
            Ok(Some(point)) => {
                self.geocodes.lock().insert(key, point.clone());
                Ok(point)
            }
            Ok(None) => {
                warn!(address, provider = self.provider.name(), "no geocoding match");
                Err(RoutingWarning::new(format!("Geocoding failed for '{}': no match", address)))
            }
            Err(e) => {
                warn!(address, error = %e, "geocoding failed");
                Err(RoutingWarning::new(format!("Geocoding failed for '{}': {}", address, e)))
            }
        }
    }

    /// Route between two addresses.
    ///
    /// `Err(Degraded)` carries a usable estimate: a zero leg when an address
    /// cannot be geocoded, otherwise a straight-line road estimate.
    pub async fn route(
        &self,
        origin: &str,
        destination: &str,
        departure: Option<NaiveDateTime>,
    ) -> std::result::Result<RouteLeg, Degraded<RouteLeg>> {
        if normalize_address(origin) == normalize_address(destination) {
            return Ok(RouteLeg::zero());
        }

        let hour = departure.map(|d| d.hour());
        if let Some(hit) = self.routes.get(origin, destination, hour) {
            debug!(origin, destination, ?hour, "route cache hit");
            return Ok(hit);
        }

        let from = match self.geocode(origin).await {
            Ok(p) => p,
            Err(warning) => return Err(zero_leg(warning, origin, destination)),
        };
        let to = match self.geocode(destination).await {
            Ok(p) => p,
            Err(warning) => return Err(zero_leg(warning, origin, destination)),
        };

        let label = format!("route '{}' -> '{}'", origin, destination);
        match self.with_retry(&label, || self.provider.route(&from, &to)).await {
            Ok(leg) => {
                debug!(origin, destination, km = leg.distance_km, hours = leg.drive_hours, "route resolved");
                self.routes.insert(origin, destination, hour, leg);
                Ok(leg)
            }
            Err(e) => {
                let (distance_km, drive_hours) =
                    estimate_leg(&from.coordinates(), &to.coordinates(), self.config.fallback_speed_kmh);
                warn!(origin, destination, error = %e, km = distance_km, "routing failed, using straight-line estimate");
                Err(Degraded {
                    estimate: RouteLeg {
                        distance_km,
                        drive_hours,
                    },
                    warning: RoutingWarning::new(format!(
                        "Routing failed for {} -> {} ({}); using straight-line estimate of {:.1} km",
                        origin, destination, e, distance_km
                    )),
                })
            }
        }
    }

    /// Legs from `origin` through every stop in order.
    pub async fn segments(&self, origin: &str, stops: &[Stop], departure: Option<NaiveDateTime>) -> TripSegments {
        let mut segments = TripSegments::default();
        let mut previous = origin.to_string();
        let mut clock = departure;

        for stop in stops {
            let leg = segments
                .warnings
                .absorb(self.route(&previous, &stop.address, clock).await);
            clock = clock.map(|c| c + ChronoDuration::minutes((leg.drive_hours * 60.0).round() as i64));
            segments.legs.push(leg);
            previous = stop.address.clone();
        }

        segments
    }

    async fn with_retry<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.initial_backoff;
        let mut last_error = anyhow!("{}: no attempts made", label);

        for attempt in 1..=attempts {
            match tokio::time::timeout(self.config.timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => last_error = e,
                Err(_) => last_error = anyhow!("timed out after {:?}", self.config.timeout),
            }
            debug!(label, attempt, error = %last_error, provider = self.provider.name(), "provider call failed");
            if attempt < attempts {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }

        Err(last_error)
    }
}

fn zero_leg(warning: RoutingWarning, origin: &str, destination: &str) -> Degraded<RouteLeg> {
    Degraded {
        estimate: RouteLeg::zero(),
        warning: RoutingWarning::new(format!(
            "{}; leg {} -> {} set to 0 km",
            warning.message, origin, destination
        )),
    }
}

/// Create the production provider when a token is configured, mock otherwise
pub fn create_routing_provider(mapbox: Option<MapboxConfig>) -> Result<Arc<dyn RoutingProvider>> {
    match mapbox {
        Some(cfg) => Ok(Arc::new(MapboxClient::new(cfg)?)),
        None => {
            debug!("Using mock routing provider (Mapbox not configured)");
            Ok(Arc::new(MockRoutingProvider::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> RoutingClientConfig {
        RoutingClientConfig {
            timeout: Duration::from_millis(200),
            initial_backoff: Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn client(provider: Arc<MockRoutingProvider>) -> RoutingClient {
        RoutingClient::new(provider, fast_config())
    }

    #[tokio::test]
    async fn test_mock_geocode_is_deterministic() {
        let mock = MockRoutingProvider::new();
        let a = mock.geocode("Barrie, ON").await.unwrap().unwrap();
        let b = mock.geocode("Barrie, ON").await.unwrap().unwrap();
        assert_eq!(a.latitude, b.latitude);
        assert_eq!(a.longitude, b.longitude);
        assert!(a.latitude > 42.0 && a.latitude < 45.5);
    }

    #[tokio::test]
    async fn test_route_override_both_directions() {
        let mock = Arc::new(MockRoutingProvider::new().with_route("Yard", "Barrie, ON", 90.0, 1.2));
        let c = client(mock);
        let there = c.route("Yard", "Barrie, ON", None).await.unwrap();
        let back = c.route("Barrie, ON", "Yard", None).await.unwrap();
        assert_eq!(there.distance_km, 90.0);
        assert_eq!(back.drive_hours, 1.2);
    }

    #[tokio::test]
    async fn test_same_address_is_zero_leg() {
        let mock = Arc::new(MockRoutingProvider::new());
        let c = client(mock.clone());
        let leg = c.route("Yard", " yard ", None).await.unwrap();
        assert_eq!(leg, RouteLeg::zero());
        assert_eq!(mock.route_calls(), 0);
    }

    #[tokio::test]
    async fn test_route_is_cached_per_hour_bucket() {
        let mock = Arc::new(MockRoutingProvider::new());
        let c = client(mock.clone());
        let seven = chrono::NaiveDate::from_ymd_opt(2025, 3, 4)
            .unwrap()
            .and_hms_opt(7, 15, 0)
            .unwrap();

        c.route("A St, Toronto", "B St, Oshawa", Some(seven)).await.unwrap();
        c.route("A St, Toronto", "B St, Oshawa", Some(seven + ChronoDuration::minutes(30)))
            .await
            .unwrap();
        assert_eq!(mock.route_calls(), 1);

        c.route("A St, Toronto", "B St, Oshawa", Some(seven + ChronoDuration::hours(2)))
            .await
            .unwrap();
        assert_eq!(mock.route_calls(), 2);
        assert_eq!(c.cached_routes(), 2);
    }

    #[tokio::test]
    async fn test_provider_failure_falls_back_to_haversine() {
        let mock = Arc::new(MockRoutingProvider::new().failing_routes());
        let c = client(mock.clone());

        let degraded = c.route("A St, Toronto", "B St, Ottawa", None).await.unwrap_err();
        assert!(degraded.estimate.distance_km > 0.0);
        let expected_hours = degraded.estimate.distance_km / DEFAULT_FALLBACK_SPEED_KMH;
        assert!((degraded.estimate.drive_hours - expected_hours).abs() < 1e-9);
        assert!(degraded.warning.message.contains("straight-line"));
        // three attempts, nothing cached
        assert_eq!(mock.route_calls(), 3);
        assert_eq!(c.cached_routes(), 0);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let mock = Arc::new(MockRoutingProvider::new().with_delay(Duration::from_millis(500)));
        let c = RoutingClient::new(
            mock.clone(),
            RoutingClientConfig {
                timeout: Duration::from_millis(10),
                max_attempts: 2,
                initial_backoff: Duration::from_millis(1),
                ..Default::default()
            },
        );
        let degraded = c.route("A", "B", None).await.unwrap_err();
        assert!(degraded.warning.message.contains("timed out"));
        assert_eq!(mock.route_calls(), 2);
    }

    #[tokio::test]
    async fn test_ungeocodable_address_gives_zero_leg() {
        let mock = Arc::new(MockRoutingProvider::new().with_ungeocodable("Nowhere"));
        let c = client(mock.clone());
        let degraded = c.route("Yard", "Nowhere", None).await.unwrap_err();
        assert_eq!(degraded.estimate, RouteLeg::zero());
        assert!(degraded.warning.message.contains("Geocoding failed"));
        assert_eq!(mock.route_calls(), 0);
    }

    #[tokio::test]
    async fn test_geocode_is_cached() {
        let mock = Arc::new(MockRoutingProvider::new());
        let c = client(mock.clone());
        c.geocode("Barrie, ON").await.unwrap();
        c.geocode("barrie,  on").await.unwrap();
        assert_eq!(mock.geocode_calls(), 1);
    }

    #[tokio::test]
    async fn test_segments_collect_legs_and_warnings() {
        let mock = Arc::new(
            MockRoutingProvider::new()
                .with_route("Yard", "P", 20.0, 0.4)
                .with_route("P", "D", 250.0, 3.0)
                .with_ungeocodable("Lost"),
        );
        let c = client(mock);
        let stops = vec![Stop::pickup(1, "P"), Stop::delivery(2, "D"), Stop::delivery(3, "Lost")];

        let segs = c.segments("Yard", &stops, None).await;
        assert_eq!(segs.legs.len(), 3);
        assert_eq!(segs.legs[0].distance_km, 20.0);
        assert_eq!(segs.legs[1].distance_km, 250.0);
        assert_eq!(segs.legs[2], RouteLeg::zero());
        assert_eq!(segs.total_distance_km(), 270.0);
        assert_eq!(segs.warnings.len(), 1);
    }

    #[test]
    fn test_provider_name() {
        assert_eq!(MockRoutingProvider::new().name(), "MockRouting");
    }

    #[test]
    fn test_create_routing_provider_without_token() {
        let provider = create_routing_provider(None).unwrap();
        assert_eq!(provider.name(), "MockRouting");
    }
}
