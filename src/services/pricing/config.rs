//! Pricing and underwriting rules
//!
//! Constructed explicitly and passed into the engine. Every field has a
//! default so a rules file only needs the values it overrides.

use serde::{Deserialize, Serialize};

/// Miles per kilometre
pub const KM_TO_MILES: f64 = 0.621371;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    // Revenue
    pub dry_rate_per_km: f64,
    pub reefer_rate_per_km: f64,
    pub min_load_charge: f64,
    pub extra_stop_fee: f64,
    pub per_pallet_rate: f64,
    pub overload_per_pallet: f64,
    /// Pallets above this count pay the overload fee
    pub overload_threshold_pallets: u32,
    pub liftgate_fee: f64,
    pub inside_delivery_fee: f64,

    // Cost
    pub fuel_cost_per_km: f64,
    pub maintenance_cost_per_km: f64,
    /// Floor for the per-km operating cost
    pub safety_cost_per_km: f64,
    pub overnight_cost_per_night: f64,
    pub detention_per_hour: f64,
    /// Free dock time per stop before detention is charged
    pub free_detention_hours: f64,
    pub max_drive_hours_per_day: f64,
    pub max_drive_hours_cross_border: f64,

    // Underwriting
    /// Deadhead share of total km above which a load is rejected (0.4 = 40 %)
    pub deadhead_reject_percent: f64,
    pub local_min_profit: f64,
    pub regional_min_profit: f64,
    pub longhaul_min_profit: f64,
    pub cross_border_min_rate_per_mile: f64,
    pub gta_min_rate_per_km: f64,
    pub gta_max_km: f64,
    pub regional_max_km: f64,
    pub heavy_load_lbs: f64,
    pub max_payload_lbs: f64,
    pub max_pallets: u32,
    pub accept_score: f64,
    pub review_score: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            dry_rate_per_km: 2.10,
            reefer_rate_per_km: 2.45,
            min_load_charge: 450.0,
            extra_stop_fee: 75.0,
            per_pallet_rate: 95.0,
            overload_per_pallet: 35.0,
            overload_threshold_pallets: 12,
            liftgate_fee: 85.0,
            inside_delivery_fee: 100.0,

            fuel_cost_per_km: 0.50,
            maintenance_cost_per_km: 0.22,
            safety_cost_per_km: 0.65,
            overnight_cost_per_night: 250.0,
            detention_per_hour: 75.0,
            free_detention_hours: 2.0,
            max_drive_hours_per_day: 13.0,
            max_drive_hours_cross_border: 11.0,

            deadhead_reject_percent: 0.4,
            local_min_profit: 250.0,
            regional_min_profit: 500.0,
            longhaul_min_profit: 1200.0,
            cross_border_min_rate_per_mile: 3.0,
            gta_min_rate_per_km: 2.50,
            gta_max_km: 120.0,
            regional_max_km: 700.0,
            heavy_load_lbs: 11500.0,
            max_payload_lbs: 13000.0,
            max_pallets: 12,
            accept_score: 75.0,
            review_score: 60.0,
        }
    }
}

impl PricingConfig {
    /// Operating cost per km: fuel + maintenance, never below the safety floor
    pub fn cost_per_km(&self) -> f64 {
        (self.fuel_cost_per_km + self.maintenance_cost_per_km).max(self.safety_cost_per_km)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: PricingConfig = serde_json::from_str(r#"{"dry_rate_per_km": 2.3, "max_pallets": 14}"#).unwrap();
        assert_eq!(config.dry_rate_per_km, 2.3);
        assert_eq!(config.max_pallets, 14);
        assert_eq!(config.reefer_rate_per_km, 2.45);
        assert_eq!(config.regional_min_profit, 500.0);
    }

    #[test]
    fn test_cost_per_km_uses_safety_floor() {
        let mut config = PricingConfig::default();
        assert!((config.cost_per_km() - 0.72).abs() < 1e-9);

        config.fuel_cost_per_km = 0.3;
        config.maintenance_cost_per_km = 0.1;
        assert!((config.cost_per_km() - 0.65).abs() < 1e-9);
    }
}
