//! Pickup/delivery insertion search over an existing run.
//!
//! Everything here is pure: stops are immutable slices, legs come from a
//! precomputed `LegTable`, and the result is a ranked list of candidates.
//! The async leg lookups live in `run_planner`.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::services::hos::HosRules;
use crate::services::routing::{normalize_address, RouteLeg};
use crate::services::schedule::timeline;
use crate::types::{peak_onboard, Stop};

/// Route legs keyed by normalized (from, to) address
#[derive(Debug, Clone, Default)]
pub struct LegTable {
    legs: HashMap<(String, String), RouteLeg>,
}

impl LegTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, from: &str, to: &str, leg: RouteLeg) {
        self.legs
            .insert((normalize_address(from), normalize_address(to)), leg);
    }

    pub fn get(&self, from: &str, to: &str) -> Option<RouteLeg> {
        let (from, to) = (normalize_address(from), normalize_address(to));
        if from == to {
            return Some(RouteLeg::zero());
        }
        self.legs.get(&(from, to)).copied()
    }

    pub fn contains(&self, from: &str, to: &str) -> bool {
        self.get(from, to).is_some()
    }

    pub fn len(&self) -> usize {
        self.legs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    /// Inbound leg of every stop, starting from `home`. Unknown legs are zero.
    pub fn legs_for(&self, home: &str, stops: &[Stop]) -> Vec<RouteLeg> {
        let mut previous = home;
        stops
            .iter()
            .map(|s| {
                let leg = self.get(previous, &s.address).unwrap_or_default();
                previous = &s.address;
                leg
            })
            .collect()
    }
}

/// Address pairs needed to evaluate every insertion of `pickup`/`delivery`
/// into `base`. Linear in the run length.
pub fn required_pairs(home: &str, base: &[Stop], pickup: &Stop, delivery: &Stop) -> Vec<(String, String)> {
    let mut points: Vec<&str> = Vec::with_capacity(base.len() + 1);
    points.push(home);
    points.extend(base.iter().map(|s| s.address.as_str()));

    let mut seen = HashSet::new();
    let mut pairs = Vec::new();
    let mut push = |from: &str, to: &str| {
        let key = (normalize_address(from), normalize_address(to));
        if key.0 != key.1 && seen.insert(key) {
            pairs.push((from.to_string(), to.to_string()));
        }
    };

    for w in points.windows(2) {
        push(w[0], w[1]);
    }
    for &p in &points {
        push(p, &pickup.address);
        push(p, &delivery.address);
        push(&pickup.address, p);
        push(&delivery.address, p);
    }
    push(&pickup.address, &delivery.address);

    pairs
}

/// Simulated run: distances, loaded/empty split, ETAs and peak load
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSimulation {
    pub total_distance_km: f64,
    pub total_drive_hours: f64,
    pub empty_distance_km: f64,
    pub loaded_distance_km: f64,
    pub per_stop_eta: Vec<NaiveDateTime>,
    pub end_datetime: Option<NaiveDateTime>,
    pub peak_pallets: u32,
    pub peak_weight_lbs: f64,
    /// Index of a delivery reached before its shipment's pickup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_before_pickup: Option<usize>,
}

/// Walk the stops from `home`, splitting km by whether cargo is aboard.
pub fn simulate(home: &str, stops: &[Stop], legs: &LegTable, start: NaiveDateTime, rules: &HosRules) -> RunSimulation {
    let inbound = legs.legs_for(home, stops);

    let mut sim = RunSimulation::default();
    let mut cargo: i32 = 0;
    for (stop, leg) in stops.iter().zip(&inbound) {
        if cargo > 0 {
            sim.loaded_distance_km += leg.distance_km;
        } else {
            sim.empty_distance_km += leg.distance_km;
        }
        sim.total_distance_km += leg.distance_km;
        sim.total_drive_hours += leg.drive_hours;
        cargo = (cargo + stop.cargo_delta()).max(0);
    }

    let timings = timeline(start, stops, &inbound, rules);
    sim.end_datetime = timings.last().map(|t| t.departure);
    sim.per_stop_eta = timings.into_iter().map(|t| t.arrival).collect();

    match peak_onboard(stops) {
        Ok((peak_pallets, peak_weight)) => {
            sim.peak_pallets = peak_pallets;
            sim.peak_weight_lbs = peak_weight;
        }
        Err(e) => sim.delivery_before_pickup = Some(e.index),
    }
    sim
}

/// Stop order with `pickup` at index `i` and `delivery` at index `j` of the result.
pub fn splice(base: &[Stop], pickup: &Stop, delivery: &Stop, i: usize, j: usize) -> Vec<Stop> {
    let mut order = base.to_vec();
    order.insert(i, pickup.clone());
    order.insert(j, delivery.clone());
    order
}

/// Scoring and capacity limits for the search
#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    /// Revenue of the shipment being inserted
    pub revenue: f64,
    pub deadhead_weight_per_km: f64,
    pub cost_per_km: f64,
    pub max_pallets: u32,
    pub payload_capacity_lbs: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InsertionCandidate {
    pub pickup_index: usize,
    pub delivery_index: usize,
    pub score: f64,
    pub incremental_profit: f64,
    pub deadhead_reduction: f64,
    pub added_km: f64,
    pub added_hours: f64,
    pub simulation: RunSimulation,
    pub order: Vec<Stop>,
}

/// Score of a candidate simulation against the base run
pub fn score_candidate(base: &RunSimulation, candidate: &RunSimulation, params: &SearchParams) -> (f64, f64, f64) {
    let deadhead_reduction = base.empty_distance_km - candidate.empty_distance_km;
    let added_km = candidate.total_distance_km - base.total_distance_km;
    let incremental_cost = (added_km * params.cost_per_km).max(0.0);
    let incremental_profit = params.revenue - incremental_cost;
    let score = incremental_profit + deadhead_reduction * params.deadhead_weight_per_km;
    (score, incremental_profit, deadhead_reduction)
}

/// Every `(i, j)` with `0 <= i < j <= n + 1`, best score first.
///
/// Candidates that deliver before picking up, or whose peak load exceeds
/// the vehicle, are dropped.
#[allow(clippy::too_many_arguments)]
pub fn search_insertions(
    home: &str,
    base: &[Stop],
    pickup: &Stop,
    delivery: &Stop,
    legs: &LegTable,
    start: NaiveDateTime,
    rules: &HosRules,
    params: &SearchParams,
) -> Vec<InsertionCandidate> {
    let base_sim = simulate(home, base, legs, start, rules);
    let n = base.len();
    let mut candidates = Vec::with_capacity((n + 1) * (n + 2) / 2);

    for i in 0..=n {
        for j in (i + 1)..=(n + 1) {
            let order = splice(base, pickup, delivery, i, j);
            let sim = simulate(home, &order, legs, start, rules);
            if sim.delivery_before_pickup.is_some() {
                continue;
            }
            if sim.peak_pallets > params.max_pallets || sim.peak_weight_lbs > params.payload_capacity_lbs {
                continue;
            }
            let (score, incremental_profit, deadhead_reduction) = score_candidate(&base_sim, &sim, params);
            candidates.push(InsertionCandidate {
                pickup_index: i,
                delivery_index: j,
                score,
                incremental_profit,
                deadhead_reduction,
                added_km: sim.total_distance_km - base_sim.total_distance_km,
                added_hours: sim.total_drive_hours - base_sim.total_drive_hours,
                simulation: sim,
                order,
            });
        }
    }

    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    candidates
}

/// "Option 1: +12.0 km, +0.25 h, deadhead Δ 30.0 km, incremental profit $480.20."
pub fn summary_line(index: usize, candidate: &InsertionCandidate) -> String {
    format!(
        "Option {}: +{:.1} km, +{:.2} h, deadhead Δ {:.1} km, incremental profit ${:.2}.",
        index, candidate.added_km, candidate.added_hours, candidate.deadhead_reduction, candidate.incremental_profit
    )
}
