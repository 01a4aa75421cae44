//! Shipment (customer opportunity) types

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::types::stop::{LoadSummary, Stop};
use crate::types::vehicle::{Equipment, Vehicle};

/// How the customer is billed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingMode {
    #[default]
    Flat,
    PerKm,
    PerPallet,
    PerStop,
}

/// Pricing fields written back after a pricing pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingUpdate {
    pub suggested_rate: f64,
    pub estimated_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: Uuid,
    #[serde(default)]
    pub reference: Option<String>,
    /// Ordered by `sequence`
    #[serde(default)]
    pub stops: Vec<Stop>,
    #[serde(default)]
    pub assigned_vehicle: Option<Vehicle>,
    #[serde(default)]
    pub billing_mode: BillingMode,
    #[serde(default)]
    pub equipment: Equipment,

    /// Quoted/agreed rate; when present it is the revenue
    #[serde(default)]
    pub final_rate: Option<f64>,
    #[serde(default)]
    pub suggested_rate: Option<f64>,
    #[serde(default)]
    pub estimated_cost: Option<f64>,

    #[serde(default)]
    pub liftgate: bool,
    #[serde(default)]
    pub inside_delivery: bool,

    #[serde(default)]
    pub leave_yard_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub schedule_conflict: bool,
    #[serde(default)]
    pub dispatch_run: Option<Uuid>,
    /// Set once a downstream sales order is confirmed
    #[serde(default)]
    pricing_locked: bool,
}

impl Shipment {
    pub fn new(stops: Vec<Stop>) -> Self {
        let id = Uuid::new_v4();
        let stops = stops
            .into_iter()
            .map(|mut s| {
                s.shipment_id = Some(id);
                s
            })
            .collect();
        Self {
            id,
            reference: None,
            stops,
            assigned_vehicle: None,
            billing_mode: BillingMode::Flat,
            equipment: Equipment::Dry,
            final_rate: None,
            suggested_rate: None,
            estimated_cost: None,
            liftgate: false,
            inside_delivery: false,
            leave_yard_at: None,
            schedule_conflict: false,
            dispatch_run: None,
            pricing_locked: false,
        }
    }

    pub fn with_vehicle(mut self, vehicle: Vehicle) -> Self {
        self.assigned_vehicle = Some(vehicle);
        self
    }

    /// Stops sorted by sequence
    pub fn ordered_stops(&self) -> Vec<Stop> {
        let mut stops = self.stops.clone();
        stops.sort_by_key(|s| s.sequence);
        stops
    }

    pub fn sort_stops(&mut self) {
        self.stops.sort_by_key(|s| s.sequence);
    }

    pub fn load(&self) -> LoadSummary {
        LoadSummary::of(&self.stops)
    }

    pub fn total_distance_km(&self) -> f64 {
        self.stops.iter().map(|s| s.distance_km).sum()
    }

    pub fn total_drive_hours(&self) -> f64 {
        self.stops.iter().map(|s| s.drive_hours()).sum()
    }

    pub fn total_pallets(&self) -> u32 {
        self.load().pallets()
    }

    pub fn total_weight_lbs(&self) -> f64 {
        self.load().weight_lbs()
    }

    pub fn revenue_rate(&self) -> Option<f64> {
        self.final_rate.or(self.suggested_rate)
    }

    pub fn discount_amount(&self) -> f64 {
        match (self.suggested_rate, self.final_rate) {
            (Some(suggested), Some(fin)) => (suggested - fin).max(0.0),
            _ => 0.0,
        }
    }

    pub fn discount_percent(&self) -> f64 {
        match self.suggested_rate {
            Some(suggested) if suggested > 0.0 => self.discount_amount() / suggested * 100.0,
            _ => 0.0,
        }
    }

    pub fn pricing_locked(&self) -> bool {
        self.pricing_locked
    }

    pub fn lock_pricing(&mut self) {
        self.pricing_locked = true;
    }

    pub fn apply_pricing(&mut self, update: PricingUpdate) -> Result<(), DispatchError> {
        if self.pricing_locked {
            return Err(DispatchError::PricingLocked(self.id));
        }
        self.suggested_rate = Some(update.suggested_rate);
        self.estimated_cost = Some(update.estimated_cost);
        Ok(())
    }
}
