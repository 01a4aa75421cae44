//! Scheduling -> pricing pipeline for one shipment

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{DispatchError, Warnings};
use crate::services::normalize::apply_extraction;
use crate::services::pricing::{PricingEngine, PricingResult};
use crate::services::routing::RoutingClient;
use crate::services::schedule::{check_capacity, schedule_shipment, ScheduleSummary, SchedulingConfig};
use crate::types::{Equipment, ExtractionOutput, Shipment};

#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub schedule: ScheduleSummary,
    pub pricing: PricingResult,
    /// Everything the dispatcher should see, deduplicated, in order
    pub warnings: Warnings,
}

pub struct DispatchService {
    routing: Arc<RoutingClient>,
    pricing: PricingEngine,
    scheduling: SchedulingConfig,
    default_yard: String,
}

impl DispatchService {
    pub fn new(
        routing: Arc<RoutingClient>,
        pricing: PricingEngine,
        scheduling: SchedulingConfig,
        default_yard: impl Into<String>,
    ) -> Self {
        Self {
            routing,
            pricing,
            scheduling,
            default_yard: default_yard.into(),
        }
    }

    /// Route, schedule and price `shipment`, writing results onto it.
    ///
    /// Capacity is checked before any routing call. A locked price is left
    /// untouched and reported as a warning.
    pub async fn plan_shipment(
        &self,
        shipment: &mut Shipment,
        now: NaiveDateTime,
    ) -> Result<DispatchOutcome, DispatchError> {
        let mut warnings = Warnings::new();
        shipment.sort_stops();

        let (max_pallets, payload) = match &shipment.assigned_vehicle {
            Some(v) => (v.max_pallets, v.payload_capacity_lbs),
            None => (self.scheduling.default_max_pallets, self.scheduling.default_payload_lbs),
        };
        check_capacity(&shipment.load(), max_pallets, payload)?;

        if let Some(v) = &shipment.assigned_vehicle {
            if shipment.equipment == Equipment::Reefer && v.equipment != Equipment::Reefer {
                warn!(shipment = %shipment.id, vehicle = %v.name, "reefer load on a dry van");
                warnings.push(format!("Shipment needs a reefer but {} is a dry van", v.name));
            }
        }

        let origin = shipment
            .assigned_vehicle
            .as_ref()
            .map(|v| v.home_location.clone())
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| self.default_yard.clone());

        let segments = self.routing.segments(&origin, &shipment.stops, None).await;
        warnings.merge(&segments.warnings);

        let schedule = schedule_shipment(shipment, &segments.legs, now, &self.scheduling)?;
        warnings.merge(&schedule.warnings);

        let pricing = self.pricing.price(shipment);
        warnings.merge(&pricing.warnings);

        match shipment.apply_pricing(pricing.update()) {
            Ok(()) => {}
            Err(DispatchError::PricingLocked(id)) => {
                warn!(shipment = %id, "pricing locked, suggested rate not updated");
                warnings.push("Pricing is locked by a confirmed sales order; suggested rate not updated");
            }
            Err(e) => return Err(e),
        }

        info!(
            shipment = %shipment.id,
            decision = %pricing.decision,
            leave = ?schedule.leave_yard_at,
            km = pricing.total_km,
            warnings = warnings.len(),
            "shipment planned"
        );

        Ok(DispatchOutcome {
            schedule,
            pricing,
            warnings,
        })
    }

    /// Replace stops from extraction output, then plan.
    pub async fn plan_from_extraction(
        &self,
        shipment: &mut Shipment,
        output: &ExtractionOutput,
        now: NaiveDateTime,
    ) -> Result<DispatchOutcome, DispatchError> {
        let extraction_warnings = apply_extraction(shipment, output);
        let mut outcome = self.plan_shipment(shipment, now).await?;
        let mut warnings = extraction_warnings;
        warnings.merge(&outcome.warnings);
        outcome.warnings = warnings;
        Ok(outcome)
    }
}
