use serde::Serialize;

use super::config::PricingConfig;

/// Coarse distance/geography bucket that sets the minimum acceptable profit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Zone {
    Gta,
    Regional,
    CrossCountry,
    CrossBorder,
}

impl Zone {
    /// Cross-border wins over distance; otherwise bucket by km
    pub fn classify(distance_km: f64, cross_border: bool, config: &PricingConfig) -> Self {
        if cross_border {
            Zone::CrossBorder
        } else if distance_km <= config.gta_max_km {
            Zone::Gta
        } else if distance_km <= config.regional_max_km {
            Zone::Regional
        } else {
            Zone::CrossCountry
        }
    }

    pub fn min_profit(self, config: &PricingConfig) -> f64 {
        match self {
            Zone::Gta => config.local_min_profit,
            Zone::Regional => config.regional_min_profit,
            Zone::CrossCountry | Zone::CrossBorder => config.longhaul_min_profit,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Zone::Gta => "GTA",
            Zone::Regional => "REGIONAL",
            Zone::CrossCountry => "CROSS_COUNTRY",
            Zone::CrossBorder => "CROSS_BORDER",
        }
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
