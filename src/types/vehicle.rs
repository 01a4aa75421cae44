use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults::DEFAULT_WORK_START_HOUR;

/// Trailer type; drives the per-km rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Equipment {
    #[default]
    Dry,
    Reefer,
}

/// Vehicle entity - a truck that can be assigned to shipments and runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Uuid,
    pub name: String,
    /// Yard address the truck leaves from
    pub home_location: String,
    /// ISO country of the yard; defaults to Canada
    #[serde(default)]
    pub home_country: Option<String>,
    /// Fractional hour, 8.5 = 08:30
    #[serde(default = "default_work_start_hour")]
    pub work_start_hour: f64,
    pub payload_capacity_lbs: f64,
    pub max_pallets: u32,
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub equipment: Equipment,
}

fn default_work_start_hour() -> f64 {
    DEFAULT_WORK_START_HOUR
}

impl Vehicle {
    pub fn new(name: impl Into<String>, home_location: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            home_location: home_location.into(),
            home_country: None,
            work_start_hour: DEFAULT_WORK_START_HOUR,
            payload_capacity_lbs: 13000.0,
            max_pallets: 12,
            driver: None,
            equipment: Equipment::Dry,
        }
    }

    pub fn with_capacity(mut self, payload_capacity_lbs: f64, max_pallets: u32) -> Self {
        self.payload_capacity_lbs = payload_capacity_lbs;
        self.max_pallets = max_pallets;
        self
    }
}
