//! Stop types

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults::{DEFAULT_DELIVERY_SERVICE_MINUTES, DEFAULT_PICKUP_SERVICE_MINUTES};

/// Pickup or delivery leg of a shipment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopType {
    Pickup,
    Delivery,
}

impl StopType {
    pub const fn as_str(self) -> &'static str {
        match self {
            StopType::Pickup => "pickup",
            StopType::Delivery => "delivery",
        }
    }

    pub const fn default_service_minutes(self) -> i32 {
        match self {
            StopType::Pickup => DEFAULT_PICKUP_SERVICE_MINUTES,
            StopType::Delivery => DEFAULT_DELIVERY_SERVICE_MINUTES,
        }
    }

    /// +1 when freight goes on the truck, -1 when it comes off
    pub const fn cargo_delta(self) -> i32 {
        match self {
            StopType::Pickup => 1,
            StopType::Delivery => -1,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pickup" | "pick_up" | "pu" => Some(StopType::Pickup),
            "delivery" | "drop" | "del" => Some(StopType::Delivery),
            _ => None,
        }
    }
}

/// One pickup or one delivery of a shipment.
///
/// Timestamps are local wall-clock times of the dispatch office.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub id: Uuid,
    #[serde(default)]
    pub shipment_id: Option<Uuid>,
    pub sequence: i32,
    pub stop_type: StopType,
    pub address: String,
    /// ISO country code ("CA", "US"); inferred from the address when absent
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub pallets: u32,
    #[serde(default)]
    pub weight_lbs: f64,

    #[serde(default)]
    pub time_window_start: Option<NaiveDateTime>,
    #[serde(default)]
    pub time_window_end: Option<NaiveDateTime>,
    /// Window explicitly required by the customer (hard) vs inferred (soft)
    #[serde(default)]
    pub window_strict: bool,

    #[serde(default)]
    pub scheduled_datetime: Option<NaiveDateTime>,
    #[serde(default)]
    pub estimated_arrival: Option<NaiveDateTime>,
    /// Drive time of the inbound leg
    #[serde(default)]
    pub drive_minutes: f64,
    /// Distance of the inbound leg
    #[serde(default)]
    pub distance_km: f64,
    /// HOS break time folded into the inbound leg
    #[serde(default)]
    pub break_minutes: f64,
    /// Expected wait at the dock (billable after the free allowance)
    #[serde(default)]
    pub detention_hours: f64,
    #[serde(default)]
    pub service_duration_minutes: Option<i32>,

    #[serde(default)]
    pub run_id: Option<Uuid>,
    #[serde(default)]
    pub run_sequence: Option<i32>,
}

impl Stop {
    pub fn new(sequence: i32, stop_type: StopType, address: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            shipment_id: None,
            sequence,
            stop_type,
            address: address.into(),
            country: None,
            pallets: 0,
            weight_lbs: 0.0,
            time_window_start: None,
            time_window_end: None,
            window_strict: false,
            scheduled_datetime: None,
            estimated_arrival: None,
            drive_minutes: 0.0,
            distance_km: 0.0,
            break_minutes: 0.0,
            detention_hours: 0.0,
            service_duration_minutes: None,
            run_id: None,
            run_sequence: None,
        }
    }

    pub fn pickup(sequence: i32, address: impl Into<String>) -> Self {
        Self::new(sequence, StopType::Pickup, address)
    }

    pub fn delivery(sequence: i32, address: impl Into<String>) -> Self {
        Self::new(sequence, StopType::Delivery, address)
    }

    pub fn with_load(mut self, pallets: u32, weight_lbs: f64) -> Self {
        self.pallets = pallets;
        self.weight_lbs = weight_lbs;
        self
    }

    pub fn with_window(mut self, start: Option<NaiveDateTime>, end: Option<NaiveDateTime>, strict: bool) -> Self {
        self.time_window_start = start;
        self.time_window_end = end;
        self.window_strict = strict;
        self
    }

    pub fn is_pickup(&self) -> bool {
        self.stop_type == StopType::Pickup
    }

    pub fn is_delivery(&self) -> bool {
        self.stop_type == StopType::Delivery
    }

    pub fn cargo_delta(&self) -> i32 {
        self.stop_type.cargo_delta()
    }

    pub fn service_minutes(&self) -> i32 {
        self.service_duration_minutes
            .filter(|m| *m > 0)
            .unwrap_or_else(|| self.stop_type.default_service_minutes())
    }

    pub fn drive_hours(&self) -> f64 {
        self.drive_minutes / 60.0
    }

    pub fn set_drive_hours(&mut self, hours: f64) {
        self.drive_minutes = hours * 60.0;
    }

    /// Country code, falling back to address inference
    pub fn country_code(&self) -> String {
        self.country
            .as_deref()
            .map(normalize_country)
            .unwrap_or_else(|| country_from_address(&self.address))
    }
}

/// Pallets/weight actually carried by a set of stops.
///
/// Pickups and deliveries describe the same freight twice, so the load is the
/// larger of the two sides rather than their sum.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LoadSummary {
    pub pickup_pallets: u32,
    pub delivery_pallets: u32,
    pub pickup_weight_lbs: f64,
    pub delivery_weight_lbs: f64,
}

impl LoadSummary {
    pub fn of(stops: &[Stop]) -> Self {
        let mut summary = Self::default();
        for stop in stops {
            match stop.stop_type {
                StopType::Pickup => {
                    summary.pickup_pallets += stop.pallets;
                    summary.pickup_weight_lbs += stop.weight_lbs;
                }
                StopType::Delivery => {
                    summary.delivery_pallets += stop.pallets;
                    summary.delivery_weight_lbs += stop.weight_lbs;
                }
            }
        }
        summary
    }

    pub fn pallets(&self) -> u32 {
        self.pickup_pallets.max(self.delivery_pallets)
    }

    pub fn weight_lbs(&self) -> f64 {
        self.pickup_weight_lbs.max(self.delivery_weight_lbs)
    }

    pub fn pallets_balanced(&self) -> bool {
        self.pickup_pallets == self.delivery_pallets
    }
}

/// A delivery visited before any pickup of its shipment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryBeforePickup {
    /// Position in the visit order
    pub index: usize,
    pub sequence: i32,
    pub address: String,
}

impl fmt::Display for DeliveryBeforePickup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "delivery at stop {} ({}) comes before its pickup",
            self.sequence, self.address
        )
    }
}

/// Peak pallets/weight on board when stops are visited in the given order.
///
/// Freight is tracked per shipment: a delivery only unloads what its own
/// shipment has aboard, and a delivery reached before any pickup of its
/// shipment is an error. Stops without a shipment id count as one shipment.
pub fn peak_onboard(stops: &[Stop]) -> Result<(u32, f64), DeliveryBeforePickup> {
    let mut aboard: HashMap<Option<Uuid>, (u32, f64)> = HashMap::new();
    let mut pallets: u32 = 0;
    let mut weight = 0.0_f64;
    let mut peak_pallets: u32 = 0;
    let mut peak_weight = 0.0_f64;

    for (index, stop) in stops.iter().enumerate() {
        match stop.stop_type {
            StopType::Pickup => {
                let load = aboard.entry(stop.shipment_id).or_insert((0, 0.0));
                load.0 += stop.pallets;
                load.1 += stop.weight_lbs;
                pallets += stop.pallets;
                weight += stop.weight_lbs;
            }
            StopType::Delivery => {
                let Some(load) = aboard.get_mut(&stop.shipment_id) else {
                    return Err(DeliveryBeforePickup {
                        index,
                        sequence: stop.sequence,
                        address: stop.address.clone(),
                    });
                };
                let unloaded_pallets = stop.pallets.min(load.0);
                let unloaded_weight = stop.weight_lbs.min(load.1);
                load.0 -= unloaded_pallets;
                load.1 -= unloaded_weight;
                pallets -= unloaded_pallets;
                weight -= unloaded_weight;
            }
        }
        peak_pallets = peak_pallets.max(pallets);
        peak_weight = peak_weight.max(weight);
    }

    Ok((peak_pallets, peak_weight))
}

const US_TOKENS: &[&str] = &[" USA", ", US", "UNITED STATES", "U.S.A"];

pub fn country_from_address(address: &str) -> String {
    let upper = format!(" {}", address.to_uppercase());
    if US_TOKENS.iter().any(|t| upper.contains(t)) || upper.trim_end().ends_with(" US") {
        "US".to_string()
    } else {
        "CA".to_string()
    }
}

pub fn normalize_country(value: &str) -> String {
    match value.trim().to_uppercase().as_str() {
        "US" | "USA" | "UNITED STATES" | "UNITED STATES OF AMERICA" => "US".to_string(),
        "CA" | "CAN" | "CANADA" => "CA".to_string(),
        other => other.to_string(),
    }
}
