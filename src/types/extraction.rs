//! Output contract of the freight-data extraction service

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One stop as extracted from an email/document. Everything is optional or
/// loosely typed; `services::normalize` turns it into a `Stop`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedStop {
    pub stop_type: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub pallets: Option<u32>,
    #[serde(default)]
    pub weight_lbs: Option<f64>,
    #[serde(default)]
    pub window_start: Option<NaiveDateTime>,
    #[serde(default)]
    pub window_end: Option<NaiveDateTime>,
    #[serde(default)]
    pub window_strict: bool,
    /// "liftgate", "inside_delivery", ...
    #[serde(default)]
    pub service_type: Option<String>,
    #[serde(default)]
    pub service_duration_minutes: Option<i32>,
    #[serde(default)]
    pub detention_hours: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutput {
    #[serde(default)]
    pub stops: Vec<ExtractedStop>,
    #[serde(default)]
    pub total_weight_lbs: Option<f64>,
    #[serde(default)]
    pub total_pallets: Option<u32>,
    #[serde(default)]
    pub warnings: Vec<String>,
}
