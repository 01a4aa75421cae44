//! In-process route cache
//!
//! Entries are keyed by normalized origin, destination and departure hour so a
//! 07:00 and a 16:00 departure between the same addresses are cached apart.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::RouteLeg;

#[derive(Debug, Clone)]
struct CachedRoute {
    origin: String,
    destination: String,
    departure_hour: Option<u32>,
    distance_km: f64,
    duration_minutes: f64,
    cached_at: Instant,
}

/// Lower-cased, whitespace-collapsed address used for cache keys.
pub fn normalize_address(address: &str) -> String {
    address
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn cache_key(origin: &str, destination: &str, departure_hour: Option<u32>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_address(origin).as_bytes());
    hasher.update(b"|");
    hasher.update(normalize_address(destination).as_bytes());
    hasher.update(b"|");
    if let Some(hour) = departure_hour {
        hasher.update(hour.to_string().as_bytes());
    }
    hex::encode(hasher.finalize())
}

pub struct RouteCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedRoute>>,
}

impl RouteCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, origin: &str, destination: &str, departure_hour: Option<u32>) -> Option<RouteLeg> {
        let key = cache_key(origin, destination, departure_hour);
        let mut entries = self.entries.lock();
        let entry = entries.get(&key)?;
        if entry.cached_at.elapsed() > self.ttl {
            debug!(origin = %entry.origin, destination = %entry.destination, "route cache entry expired");
            entries.remove(&key);
            return None;
        }
        Some(RouteLeg {
            distance_km: entry.distance_km,
            drive_hours: entry.duration_minutes / 60.0,
        })
    }

    /// Store a leg, first sweeping out anything past its TTL.
    pub fn insert(&self, origin: &str, destination: &str, departure_hour: Option<u32>, leg: RouteLeg) {
        let key = cache_key(origin, destination, departure_hour);
        let entry = CachedRoute {
            origin: normalize_address(origin),
            destination: normalize_address(destination),
            departure_hour,
            distance_km: leg.distance_km,
            duration_minutes: leg.drive_hours * 60.0,
            cached_at: Instant::now(),
        };

        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.cached_at.elapsed() <= self.ttl);
        if entries.len() < before {
            debug!(swept = before - entries.len(), "expired route cache entries removed");
        }
        debug!(
            origin = %entry.origin,
            destination = %entry.destination,
            hour = ?entry.departure_hour,
            "route cached"
        );
        entries.insert(key, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
