//! Vehicle run (one truck, one calendar day)

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults::work_start_time;
use crate::types::stop::Stop;
use crate::types::vehicle::Vehicle;

/// Simulated totals of a run. Written only by the run planner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RunTotals {
    pub total_distance_km: f64,
    pub total_drive_hours: f64,
    pub empty_distance_km: f64,
    pub loaded_distance_km: f64,
    pub estimated_revenue: f64,
    pub estimated_cost: f64,
    pub estimated_profit: f64,
    pub start_datetime: Option<NaiveDateTime>,
    pub end_datetime: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub vehicle: Vehicle,
    pub run_date: NaiveDate,
    /// Ordered by `run_sequence`
    stops: Vec<Stop>,
    totals: RunTotals,
    /// Revenue contributed by each shipment on the run
    #[serde(default)]
    shipment_revenue: HashMap<Uuid, f64>,
    /// Bumped on every commit
    revision: u64,
}

impl Run {
    pub fn new(vehicle: Vehicle, run_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            vehicle,
            run_date,
            stops: Vec::new(),
            totals: RunTotals::default(),
            shipment_revenue: HashMap::new(),
            revision: 0,
        }
    }

    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    pub fn totals(&self) -> &RunTotals {
        &self.totals
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn shipment_revenue(&self) -> &HashMap<Uuid, f64> {
        &self.shipment_revenue
    }

    pub fn total_revenue(&self) -> f64 {
        self.shipment_revenue.values().sum()
    }

    /// Run start: run date at the vehicle's work start hour
    pub fn start_of_day(&self) -> NaiveDateTime {
        self.run_date.and_time(work_start_time(self.vehicle.work_start_hour))
    }

    /// Replace stops and totals together, renumbering `run_sequence` 1..n.
    pub(crate) fn commit(&mut self, mut stops: Vec<Stop>, totals: RunTotals, shipment_revenue: HashMap<Uuid, f64>) {
        for (idx, stop) in stops.iter_mut().enumerate() {
            stop.run_id = Some(self.id);
            stop.run_sequence = Some(idx as i32 + 1);
        }
        self.stops = stops;
        self.totals = totals;
        self.shipment_revenue = shipment_revenue;
        self.revision += 1;
    }
}
