//! Pricing and accept/reject underwriting for a shipment
//!
//! Reads the leg distances and drive times the scheduler wrote on each stop,
//! splits them into loaded and deadhead km, prices cost and revenue, then runs
//! the decision matrix. Missing inputs degrade to a REVIEW with a warning.

mod config;
mod zone;

pub use config::{PricingConfig, KM_TO_MILES};
pub use zone::Zone;

use serde::Serialize;
use tracing::debug;

use crate::defaults::DEFAULT_HOME_COUNTRY;
use crate::error::{insufficient_data, Warnings};
use crate::types::{normalize_country, BillingMode, Equipment, PricingUpdate, Shipment, Stop};

/// Underwriting outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Accept,
    Review,
    Reject,
    RejectOverPayload,
    RejectOverPallets,
    RejectHighDeadhead,
    RejectLoss,
    RejectLowGta,
    RejectLowRegional,
    RejectLowCrossCountry,
    RejectLowRate,
}

impl Decision {
    pub const fn as_str(self) -> &'static str {
        match self {
            Decision::Accept => "ACCEPT",
            Decision::Review => "REVIEW",
            Decision::Reject => "REJECT",
            Decision::RejectOverPayload => "REJECT_OVER_PAYLOAD",
            Decision::RejectOverPallets => "REJECT_OVER_PALLETS",
            Decision::RejectHighDeadhead => "REJECT_HIGH_DEADHEAD",
            Decision::RejectLoss => "REJECT_LOSS",
            Decision::RejectLowGta => "REJECT_LOW_GTA",
            Decision::RejectLowRegional => "REJECT_LOW_REGIONAL",
            Decision::RejectLowCrossCountry => "REJECT_LOW_CROSS_COUNTRY",
            Decision::RejectLowRate => "REJECT_LOW_RATE",
        }
    }

    fn low_profit(zone: Zone) -> Option<Self> {
        match zone {
            Zone::Gta => Some(Decision::RejectLowGta),
            Zone::Regional => Some(Decision::RejectLowRegional),
            Zone::CrossCountry => Some(Decision::RejectLowCrossCountry),
            Zone::CrossBorder => None,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PricingResult {
    pub estimated_cost: f64,
    pub suggested_rate: f64,
    pub gross_revenue: f64,
    pub net_profit: f64,
    pub base_cost: f64,
    pub overnight_cost: f64,
    pub detention_cost: f64,
    pub accessorial_revenue: f64,
    pub loaded_km: f64,
    pub deadhead_km: f64,
    pub total_km: f64,
    pub nights_required: u32,
    pub zone: Zone,
    pub rate_per_mile: f64,
    pub score: f64,
    pub decision: Decision,
    pub warnings: Warnings,
    pub recommendation: String,
}

impl PricingResult {
    pub fn deadhead_ratio(&self) -> f64 {
        if self.total_km > 0.0 {
            self.deadhead_km / self.total_km
        } else {
            0.0
        }
    }

    pub fn update(&self) -> PricingUpdate {
        PricingUpdate {
            suggested_rate: self.suggested_rate,
            estimated_cost: self.estimated_cost,
        }
    }
}

/// Loaded vs deadhead km by walking the stops' inbound legs.
///
/// A leg is loaded when cargo is aboard as it starts.
pub fn split_loaded_deadhead(stops: &[Stop]) -> (f64, f64) {
    let mut onboard: i32 = 0;
    let mut loaded = 0.0;
    let mut deadhead = 0.0;
    for stop in stops {
        if onboard > 0 {
            loaded += stop.distance_km;
        } else {
            deadhead += stop.distance_km;
        }
        onboard = (onboard + stop.cargo_delta()).max(0);
    }
    (loaded, deadhead)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Price a shipment whose stops already carry leg distances/drive times.
    pub fn price(&self, shipment: &Shipment) -> PricingResult {
        let cfg = &self.config;
        let mut warnings = Warnings::new();
        let stops = shipment.ordered_stops();

        let (payload_limit, pallet_limit, home_country) = match &shipment.assigned_vehicle {
            Some(v) => (
                v.payload_capacity_lbs,
                v.max_pallets,
                v.home_country
                    .as_deref()
                    .map(normalize_country)
                    .unwrap_or_else(|| DEFAULT_HOME_COUNTRY.to_string()),
            ),
            None => {
                warnings.push("No vehicle assigned; using default capacity limits");
                (cfg.max_payload_lbs, cfg.max_pallets, DEFAULT_HOME_COUNTRY.to_string())
            }
        };

        let total_km: f64 = stops.iter().map(|s| s.distance_km).sum();
        let cross_border = stops.iter().any(|s| s.country_code() != home_country);

        if stops.is_empty() || total_km <= 0.0 {
            let detail = if stops.is_empty() {
                "shipment has no stops"
            } else {
                "route distance is zero"
            };
            warnings.push(insufficient_data(detail));
            let zone = Zone::classify(0.0, cross_border, cfg);
            return PricingResult {
                estimated_cost: 0.0,
                suggested_rate: 0.0,
                gross_revenue: 0.0,
                net_profit: 0.0,
                base_cost: 0.0,
                overnight_cost: 0.0,
                detention_cost: 0.0,
                accessorial_revenue: 0.0,
                loaded_km: 0.0,
                deadhead_km: 0.0,
                total_km: 0.0,
                nights_required: 0,
                zone,
                rate_per_mile: 0.0,
                score: 0.0,
                decision: Decision::Review,
                recommendation: format!("{}. Route and stops must be completed before pricing.", insufficient_data(detail)),
                warnings,
            };
        }

        let (loaded_km, deadhead_km) = split_loaded_deadhead(&stops);
        let drive_hours: f64 = stops.iter().map(|s| s.drive_hours()).sum();
        let zone = Zone::classify(loaded_km, cross_border, cfg);

        // Cost
        let base_cost = total_km * cfg.cost_per_km();
        let max_drive = if cross_border {
            cfg.max_drive_hours_cross_border
        } else {
            cfg.max_drive_hours_per_day
        };
        let nights_required = if max_drive > 0.0 {
            (drive_hours / max_drive).floor() as u32
        } else {
            0
        };
        let overnight_cost = nights_required as f64 * cfg.overnight_cost_per_night;
        let detention_cost: f64 = stops
            .iter()
            .map(|s| (s.detention_hours - cfg.free_detention_hours).max(0.0) * cfg.detention_per_hour)
            .sum();
        let estimated_cost = base_cost + overnight_cost + detention_cost;

        // Revenue
        let pallets = shipment.total_pallets();
        let weight = shipment.total_weight_lbs();
        let km_rate = match shipment.equipment {
            Equipment::Dry => cfg.dry_rate_per_km,
            Equipment::Reefer => cfg.reefer_rate_per_km,
        };
        let deliveries = stops.iter().filter(|s| s.is_delivery()).count();
        let mut accessorial_revenue = 0.0;
        let base_revenue = match shipment.billing_mode {
            BillingMode::Flat => match shipment.final_rate {
                Some(rate) => rate,
                None => (loaded_km * km_rate).max(cfg.min_load_charge),
            },
            BillingMode::PerKm => loaded_km * km_rate,
            BillingMode::PerPallet => (pallets as f64 * cfg.per_pallet_rate).max(cfg.min_load_charge),
            BillingMode::PerStop => cfg.min_load_charge + cfg.extra_stop_fee * stops.len() as f64,
        };
        let flat_quote = shipment.billing_mode == BillingMode::Flat && shipment.final_rate.is_some();
        if !flat_quote {
            if shipment.billing_mode != BillingMode::PerStop && deliveries > 1 {
                accessorial_revenue += (deliveries - 1) as f64 * cfg.extra_stop_fee;
            }
            if pallets > cfg.overload_threshold_pallets {
                accessorial_revenue += (pallets - cfg.overload_threshold_pallets) as f64 * cfg.overload_per_pallet;
            }
            if shipment.liftgate {
                accessorial_revenue += cfg.liftgate_fee;
            }
            if shipment.inside_delivery {
                accessorial_revenue += cfg.inside_delivery_fee;
            }
        }
        let gross_revenue = base_revenue + accessorial_revenue;
        let net_profit = gross_revenue - estimated_cost;

        let loaded_miles = loaded_km * KM_TO_MILES;
        let rate_per_mile = if loaded_miles > 0.0 {
            gross_revenue / loaded_miles
        } else {
            0.0
        };
        let deadhead_ratio = deadhead_km / total_km;

        // Score
        let mut score: f64 = 100.0;
        if zone == Zone::Gta && loaded_km > 0.0 && gross_revenue / loaded_km < cfg.gta_min_rate_per_km {
            score -= 25.0;
        }
        if deadhead_ratio > 0.35 {
            score -= 25.0;
        } else if deadhead_ratio > 0.25 {
            score -= 15.0;
        } else if deadhead_ratio > 0.15 {
            score -= 5.0;
        }
        if nights_required > 0 {
            score -= 15.0;
        }
        if weight >= cfg.heavy_load_lbs {
            score -= 10.0;
        }
        if stops.len() > 5 {
            score -= 10.0;
        }
        if net_profit > 1000.0 {
            score += 5.0;
        }
        if net_profit < 400.0 {
            score -= 20.0;
        }
        let score = score.clamp(0.0, 100.0);

        // Decision matrix, first match wins
        let min_profit = zone.min_profit(cfg);
        let decision = if weight > payload_limit {
            Decision::RejectOverPayload
        } else if pallets > pallet_limit {
            Decision::RejectOverPallets
        } else if deadhead_ratio > cfg.deadhead_reject_percent {
            Decision::RejectHighDeadhead
        } else if net_profit < 0.0 {
            Decision::RejectLoss
        } else if let Some(low) = Decision::low_profit(zone).filter(|_| net_profit < min_profit) {
            low
        } else if cross_border && rate_per_mile < cfg.cross_border_min_rate_per_mile {
            Decision::RejectLowRate
        } else if score >= cfg.accept_score {
            Decision::Accept
        } else if score >= cfg.review_score {
            Decision::Review
        } else {
            Decision::Reject
        };

        let mut suggested_rate = gross_revenue.max(estimated_cost + min_profit);
        if cross_border {
            suggested_rate = suggested_rate.max(loaded_miles * cfg.cross_border_min_rate_per_mile);
        }

        let recommendation = format!(
            "{} ({} zone): {:.1} km total, {:.1} km loaded, {:.0}% deadhead, {:.2} h driving. \
             Cost ${:.0}, revenue ${:.0}, net ${:.0}. Suggested rate ${:.0}.",
            decision,
            zone,
            total_km,
            loaded_km,
            deadhead_ratio * 100.0,
            drive_hours,
            estimated_cost,
            gross_revenue,
            net_profit,
            suggested_rate.round(),
        );

        debug!(
            shipment = %shipment.id,
            %zone,
            %decision,
            score,
            net_profit,
            "shipment priced"
        );

        PricingResult {
            estimated_cost: round2(estimated_cost),
            suggested_rate: suggested_rate.round(),
            gross_revenue: round2(gross_revenue),
            net_profit: round2(net_profit),
            base_cost: round2(base_cost),
            overnight_cost: round2(overnight_cost),
            detention_cost: round2(detention_cost),
            accessorial_revenue: round2(accessorial_revenue),
            loaded_km: round2(loaded_km),
            deadhead_km: round2(deadhead_km),
            total_km: round2(total_km),
            nights_required,
            zone,
            rate_per_mile: round2(rate_per_mile),
            score,
            decision,
            warnings,
            recommendation,
        }
    }
}
