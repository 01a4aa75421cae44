//! Configuration management

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::defaults::DEFAULT_YARD_ADDRESS;
use crate::services::pricing::PricingConfig;
use crate::services::routing::{MapboxConfig, RoutingClientConfig};
use crate::services::run_planner::PlannerConfig;
use crate::services::schedule::SchedulingConfig;

/// Business rules, loadable from a JSON file. Missing sections and fields
/// keep their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchRules {
    pub pricing: PricingConfig,
    pub scheduling: SchedulingConfig,
    pub planner: PlannerConfig,
}

impl DispatchRules {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read rules file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid rules file {}", path.display()))
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Mapbox settings; `None` selects the mock provider
    pub mapbox: Option<MapboxConfig>,

    pub routing: RoutingClientConfig,

    /// Origin for shipments without an assigned vehicle
    pub default_yard: String,

    pub rules: DispatchRules,

    pub logs_dir: PathBuf,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mapbox = get("MAPBOX_ACCESS_TOKEN").map(|token| {
            let mut cfg = MapboxConfig::new(token);
            if let Some(url) = get("MAPBOX_BASE_URL") {
                cfg.base_url = url;
            }
            cfg
        });

        let mut routing = RoutingClientConfig::default();
        if let Some(secs) = parse::<u64>(get("ROUTING_TIMEOUT_SECS"), "ROUTING_TIMEOUT_SECS")? {
            routing.timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse::<u32>(get("ROUTING_MAX_ATTEMPTS"), "ROUTING_MAX_ATTEMPTS")? {
            routing.max_attempts = n.max(1);
        }
        if let Some(ms) = parse::<u64>(get("ROUTING_BACKOFF_MS"), "ROUTING_BACKOFF_MS")? {
            routing.initial_backoff = Duration::from_millis(ms);
        }
        if let Some(secs) = parse::<u64>(get("ROUTE_CACHE_TTL_SECS"), "ROUTE_CACHE_TTL_SECS")? {
            routing.cache_ttl = Duration::from_secs(secs);
        }

        let default_yard = get("DEFAULT_YARD_ADDRESS").unwrap_or_else(|| DEFAULT_YARD_ADDRESS.to_string());

        let rules = match get("DISPATCH_RULES_PATH") {
            Some(path) => DispatchRules::from_json_file(Path::new(&path))?,
            None => DispatchRules::default(),
        };

        let logs_dir = PathBuf::from(get("LOGS_DIR").unwrap_or_else(|| "./logs".to_string()));

        Ok(Self {
            mapbox,
            routing,
            default_yard,
            rules,
            logs_dir,
        })
    }
}

fn parse<T>(value: Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .map(|v| v.parse::<T>().with_context(|| format!("{} must be a number, got '{}'", key, v)))
        .transpose()
}
