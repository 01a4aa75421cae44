//! Run planning: simulate a vehicle's day and insert new loads into it.
//!
//! Business conditions (no vehicle, wrong stop mix, nothing fits) never
//! error: they come back as an infeasible plan with an explanation. Only
//! committing an option can fail, when the run changed underneath it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{DispatchError, Warnings};
use crate::services::hos::HosRules;
use crate::services::insertion::{
    required_pairs, search_insertions, simulate, summary_line, InsertionCandidate, LegTable, RunSimulation,
    SearchParams,
};
use crate::services::routing::RoutingClient;
use crate::services::run_store::RunStore;
use crate::types::{peak_onboard, Run, RunTotals, Shipment, Stop, Vehicle};

/// Planner knobs (the `planner` section of the rules file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Value of one km of deadhead removed from the run
    pub deadhead_weight_per_km: f64,
    /// Operating cost charged against added km
    pub cost_per_km: f64,
    pub max_options: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            deadhead_weight_per_km: 0.35,
            cost_per_km: 1.65,
            max_options: 3,
        }
    }
}

/// A ranked way to fit a shipment into a run, ready to apply
#[derive(Debug, Clone, Serialize)]
pub struct InsertionOption {
    pub run_id: Uuid,
    /// Run revision the option was computed against
    pub base_revision: u64,
    #[serde(flatten)]
    pub candidate: InsertionCandidate,
}

#[derive(Debug, Clone, Serialize)]
pub struct InsertionPlan {
    pub feasible: bool,
    pub text: String,
    pub options: Vec<InsertionOption>,
    pub run_id: Option<Uuid>,
    pub warnings: Warnings,
}

impl InsertionPlan {
    fn infeasible(text: impl Into<String>, run_id: Option<Uuid>, warnings: Warnings) -> Self {
        Self {
            feasible: false,
            text: text.into(),
            options: Vec::new(),
            run_id,
            warnings,
        }
    }
}

/// `RunSimulation` plus the routing warnings gathered while building it
#[derive(Debug, Clone, Serialize)]
pub struct Simulation {
    #[serde(flatten)]
    pub run: RunSimulation,
    pub warnings: Warnings,
}

pub struct RunPlanner {
    routing: Arc<RoutingClient>,
    store: Arc<dyn RunStore>,
    config: PlannerConfig,
    hos: HosRules,
}

impl RunPlanner {
    pub fn new(routing: Arc<RoutingClient>, store: Arc<dyn RunStore>, config: PlannerConfig, hos: HosRules) -> Self {
        Self {
            routing,
            store,
            config,
            hos,
        }
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    /// Fetch legs for every pair, recording degraded legs as warnings.
    async fn leg_table(&self, pairs: &[(String, String)], departure: Option<NaiveDateTime>) -> (LegTable, Warnings) {
        let mut table = LegTable::new();
        let mut warnings = Warnings::new();
        for (from, to) in pairs {
            let leg = warnings.absorb(self.routing.route(from, to, departure).await);
            table.insert(from, to, leg);
        }
        (table, warnings)
    }

    fn consecutive_pairs(home: &str, stops: &[Stop]) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(stops.len());
        let mut previous = home.to_string();
        for stop in stops {
            pairs.push((previous.clone(), stop.address.clone()));
            previous = stop.address.clone();
        }
        pairs
    }

    /// Simulate `stops` in order on `run`'s vehicle and day.
    pub async fn simulate_run(&self, run: &Run, stops: &[Stop]) -> Simulation {
        let home = run.vehicle.home_location.as_str();
        let start = run.start_of_day();
        let pairs = Self::consecutive_pairs(home, stops);
        let (legs, warnings) = self.leg_table(&pairs, Some(start)).await;
        Simulation {
            run: simulate(home, stops, &legs, start, &self.hos),
            warnings,
        }
    }

    fn run_date(shipment: &Shipment, today: NaiveDate) -> NaiveDate {
        shipment.leave_yard_at.map(|t| t.date()).unwrap_or(today)
    }

    fn totals(&self, sim: &RunSimulation, revenue: &HashMap<Uuid, f64>, start: NaiveDateTime) -> RunTotals {
        let estimated_revenue: f64 = revenue.values().sum();
        let estimated_cost = sim.total_distance_km * self.config.cost_per_km;
        let end = sim
            .end_datetime
            .unwrap_or_else(|| start + Duration::seconds((sim.total_drive_hours * 3600.0).round() as i64));
        RunTotals {
            total_distance_km: sim.total_distance_km,
            total_drive_hours: sim.total_drive_hours,
            empty_distance_km: sim.empty_distance_km,
            loaded_distance_km: sim.loaded_distance_km,
            estimated_revenue,
            estimated_cost,
            estimated_profit: estimated_revenue - estimated_cost,
            start_datetime: Some(start),
            end_datetime: Some(end),
        }
    }

    fn search_params(&self, vehicle: &Vehicle, revenue: f64) -> SearchParams {
        SearchParams {
            revenue,
            deadhead_weight_per_km: self.config.deadhead_weight_per_km,
            cost_per_km: self.config.cost_per_km,
            max_pallets: vehicle.max_pallets,
            payload_capacity_lbs: vehicle.payload_capacity_lbs,
        }
    }

    /// Rank the ways `shipment` can join its vehicle's run for the day.
    ///
    /// An empty run simply receives the shipment's stops and is committed.
    pub async fn optimize_insertion_for_lead(&self, shipment: &mut Shipment, today: NaiveDate) -> InsertionPlan {
        let Some(vehicle) = shipment.assigned_vehicle.clone() else {
            return InsertionPlan::infeasible(
                "No assigned vehicle. Assign a vehicle before optimization.",
                None,
                Warnings::new(),
            );
        };

        let run = self.store.get_or_create(&vehicle, Self::run_date(shipment, today));
        let revenue = shipment.revenue_rate().unwrap_or(0.0);
        let mut new_stops = shipment.ordered_stops();
        for stop in &mut new_stops {
            stop.shipment_id = Some(shipment.id);
        }

        // Re-planning replaces this shipment's own stops
        let base: Vec<Stop> = run
            .stops()
            .iter()
            .filter(|s| s.shipment_id != Some(shipment.id))
            .cloned()
            .collect();

        if base.is_empty() {
            return self.append_to_empty_run(shipment, &run, new_stops, revenue).await;
        }

        let pickups: Vec<&Stop> = new_stops.iter().filter(|s| s.is_pickup()).collect();
        let deliveries: Vec<&Stop> = new_stops.iter().filter(|s| s.is_delivery()).collect();
        let (pickup, delivery) = match (pickups.as_slice(), deliveries.as_slice()) {
            ([p], [d]) => ((*p).clone(), (*d).clone()),
            _ => {
                return InsertionPlan::infeasible(
                    format!(
                        "Insertion needs exactly one pickup and one delivery (got {} and {}).",
                        pickups.len(),
                        deliveries.len()
                    ),
                    Some(run.id),
                    Warnings::new(),
                );
            }
        };

        if let Err(e) = peak_onboard(&base) {
            warn!(run = %run.id, error = %e, "run stops out of order");
            return InsertionPlan::infeasible(
                format!("Run {} is out of order: {}.", run.id, e),
                Some(run.id),
                Warnings::new(),
            );
        }

        let home = vehicle.home_location.as_str();
        let start = run.start_of_day();
        let pairs = required_pairs(home, &base, &pickup, &delivery);
        let (legs, warnings) = self.leg_table(&pairs, Some(start)).await;

        let candidates = search_insertions(
            home,
            &base,
            &pickup,
            &delivery,
            &legs,
            start,
            &self.hos,
            &self.search_params(&vehicle, revenue),
        );

        if candidates.is_empty() {
            warn!(shipment = %shipment.id, run = %run.id, "no insertion fits vehicle capacity");
            return InsertionPlan::infeasible(
                "No insertion position keeps the load within vehicle capacity.",
                Some(run.id),
                warnings,
            );
        }

        let options: Vec<InsertionOption> = candidates
            .into_iter()
            .take(self.config.max_options.max(1))
            .map(|candidate| InsertionOption {
                run_id: run.id,
                base_revision: run.revision(),
                candidate,
            })
            .collect();

        let mut lines = vec!["Top schedule options:".to_string()];
        lines.extend(
            options
                .iter()
                .enumerate()
                .map(|(idx, o)| summary_line(idx + 1, &o.candidate)),
        );

        info!(shipment = %shipment.id, run = %run.id, options = options.len(), "insertion options ranked");

        InsertionPlan {
            feasible: true,
            text: lines.join("\n"),
            options,
            run_id: Some(run.id),
            warnings,
        }
    }

    async fn append_to_empty_run(
        &self,
        shipment: &mut Shipment,
        run: &Run,
        new_stops: Vec<Stop>,
        revenue: f64,
    ) -> InsertionPlan {
        let (peak_pallets, peak_weight) = match peak_onboard(&new_stops) {
            Ok(peak) => peak,
            Err(e) => {
                warn!(shipment = %shipment.id, run = %run.id, error = %e, "stops out of order");
                return InsertionPlan::infeasible(
                    format!("Shipment stops cannot be run in sequence order: {}.", e),
                    Some(run.id),
                    Warnings::new(),
                );
            }
        };
        if peak_pallets > run.vehicle.max_pallets || peak_weight > run.vehicle.payload_capacity_lbs {
            return InsertionPlan::infeasible(
                format!(
                    "Shipment exceeds vehicle capacity ({} pallets / {:.0} lbs).",
                    peak_pallets, peak_weight
                ),
                Some(run.id),
                Warnings::new(),
            );
        }

        let sim = self.simulate_run(run, &new_stops).await;
        let candidate = InsertionCandidate {
            pickup_index: 0,
            delivery_index: new_stops.len().saturating_sub(1),
            score: revenue - sim.run.total_distance_km * self.config.cost_per_km,
            incremental_profit: revenue - sim.run.total_distance_km * self.config.cost_per_km,
            deadhead_reduction: 0.0,
            added_km: sim.run.total_distance_km,
            added_hours: sim.run.total_drive_hours,
            simulation: sim.run.clone(),
            order: new_stops,
        };
        let option = InsertionOption {
            run_id: run.id,
            base_revision: run.revision(),
            candidate,
        };

        match self.commit_option(shipment, &option, &sim.run) {
            Ok(_) => InsertionPlan {
                feasible: true,
                text: "Created new run and appended lead as first route.".to_string(),
                options: vec![option],
                run_id: Some(run.id),
                warnings: sim.warnings,
            },
            Err(e) => InsertionPlan::infeasible(e.to_string(), Some(run.id), sim.warnings),
        }
    }

    /// Commit a previously ranked option to its run.
    ///
    /// Fails with `StaleRun` if the run was committed since the option was
    /// computed; nothing is written in that case.
    pub async fn apply_option(&self, shipment: &mut Shipment, option: &InsertionOption) -> Result<Run, DispatchError> {
        let run = self.store.get(option.run_id)?;
        if run.revision() != option.base_revision {
            return Err(DispatchError::StaleRun {
                run_id: run.id,
                expected: option.base_revision,
                actual: run.revision(),
            });
        }
        let sim = self.simulate_run(&run, &option.candidate.order).await;
        self.commit_option(shipment, option, &sim.run)
    }

    fn commit_option(
        &self,
        shipment: &mut Shipment,
        option: &InsertionOption,
        sim: &RunSimulation,
    ) -> Result<Run, DispatchError> {
        let run = self.store.get(option.run_id)?;
        let mut revenue = run.shipment_revenue().clone();
        revenue.insert(shipment.id, shipment.revenue_rate().unwrap_or(0.0));
        let totals = self.totals(sim, &revenue, run.start_of_day());

        let committed = self.store.commit(
            option.run_id,
            option.base_revision,
            option.candidate.order.clone(),
            totals,
            revenue,
        )?;

        // Mirror run placement onto the shipment's own stops
        for stop in &mut shipment.stops {
            if let Some(placed) = committed.stops().iter().find(|s| s.id == stop.id) {
                stop.run_id = placed.run_id;
                stop.run_sequence = placed.run_sequence;
            }
        }
        shipment.dispatch_run = Some(committed.id);

        info!(
            shipment = %shipment.id,
            run = %committed.id,
            revision = committed.revision(),
            km = committed.totals().total_distance_km,
            "insertion applied"
        );
        Ok(committed)
    }
}
