//! End-to-end dispatch flows against the mock routing provider

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use dispatch_engine::error::{CapacityResource, DispatchError};
use dispatch_engine::services::dispatch::DispatchService;
use dispatch_engine::services::hos::HosRules;
use dispatch_engine::services::pricing::{Decision, PricingConfig, PricingEngine, Zone};
use dispatch_engine::services::routing::{MockRoutingProvider, RoutingClient, RoutingClientConfig};
use dispatch_engine::services::run_planner::{PlannerConfig, RunPlanner};
use dispatch_engine::services::run_store::{InMemoryRunStore, RunStore};
use dispatch_engine::services::schedule::SchedulingConfig;
use dispatch_engine::types::{Shipment, Stop, Vehicle};

const YARD: &str = "5585 McAdam Rd, Mississauga, ON";

fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, day)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

fn routing(mock: MockRoutingProvider) -> Arc<RoutingClient> {
    let config = RoutingClientConfig {
        initial_backoff: Duration::from_millis(1),
        ..Default::default()
    };
    Arc::new(RoutingClient::new(Arc::new(mock), config))
}

fn dispatch(routing: Arc<RoutingClient>) -> DispatchService {
    DispatchService::new(
        routing,
        PricingEngine::new(PricingConfig::default()),
        SchedulingConfig::default(),
        YARD,
    )
}

fn truck() -> Vehicle {
    Vehicle::new("Truck 12", YARD).with_capacity(13000.0, 12)
}

/// Yard -> Mississauga -> Kingston -> Brockville, straight along the 401
fn corridor() -> MockRoutingProvider {
    let points = [
        (YARD, 0.0),
        ("Mississauga, ON", 10.0),
        ("Oshawa, ON", 70.0),
        ("Kingston, ON", 260.0),
        ("Brockville, ON", 340.0),
    ];
    let mut mock = MockRoutingProvider::new();
    for (i, (from, x)) in points.iter().enumerate() {
        for (to, y) in points.iter().skip(i + 1) {
            let km = f64::abs(x - y);
            mock = mock.with_route(from, to, km, km / 85.0);
        }
    }
    mock
}

// =============================================================================
// 1. Pricing through the pipeline
// =============================================================================

#[tokio::test]
async fn test_regional_flat_rate_below_minimum_profit_is_rejected() {
    let mock = MockRoutingProvider::new().with_route(YARD, "Kingston, ON", 250.0, 3.0);
    let svc = dispatch(routing(mock));

    let mut shipment = Shipment::new(vec![
        Stop::pickup(1, YARD).with_load(6, 6000.0),
        Stop::delivery(2, "Kingston, ON").with_load(6, 6000.0),
    ])
    .with_vehicle(truck());
    shipment.final_rate = Some(500.0);

    let outcome = svc.plan_shipment(&mut shipment, at(4, 9, 0)).await.unwrap();

    assert_eq!(outcome.pricing.zone, Zone::Regional);
    assert_eq!(outcome.pricing.decision, Decision::RejectLowRegional);
    assert_eq!(outcome.pricing.deadhead_km, 0.0);
    assert_eq!(outcome.pricing.loaded_km, 250.0);
    // cost 250 * 0.72 = 180, plus the 500 regional minimum
    assert_eq!(outcome.pricing.suggested_rate, 680.0);
    assert_eq!(shipment.suggested_rate, Some(680.0));
    assert_eq!(shipment.estimated_cost, Some(180.0));
}

#[tokio::test]
async fn test_replanning_is_idempotent() {
    let svc = dispatch(routing(corridor()));
    let mut shipment = Shipment::new(vec![
        Stop::pickup(1, "Oshawa, ON").with_load(4, 5000.0),
        Stop::delivery(2, "Brockville, ON").with_load(4, 5000.0),
    ])
    .with_vehicle(truck());

    let first = svc.plan_shipment(&mut shipment, at(4, 9, 0)).await.unwrap();
    let snapshot = shipment.clone();
    let second = svc.plan_shipment(&mut shipment, at(4, 9, 0)).await.unwrap();

    assert_eq!(shipment, snapshot);
    assert_eq!(first.pricing.decision, second.pricing.decision);
    assert_eq!(first.schedule.leave_yard_at, second.schedule.leave_yard_at);
}

// =============================================================================
// 2. Scheduling through the pipeline
// =============================================================================

#[tokio::test]
async fn test_overweight_shipment_fails_without_writes() {
    let svc = dispatch(routing(corridor()));
    let mut shipment = Shipment::new(vec![
        Stop::pickup(1, "Mississauga, ON").with_load(8, 15000.0),
        Stop::delivery(2, "Kingston, ON").with_load(8, 15000.0),
    ])
    .with_vehicle(truck());
    let before = shipment.clone();

    let err = svc.plan_shipment(&mut shipment, at(4, 9, 0)).await.unwrap_err();

    assert!(matches!(
        err,
        DispatchError::CapacityExceeded {
            resource: CapacityResource::WeightLbs,
            ..
        }
    ));
    assert_eq!(shipment, before);
}

#[tokio::test]
async fn test_nine_hour_leg_includes_one_hour_of_breaks() {
    let mock = MockRoutingProvider::new().with_route(YARD, "Thunder Bay, ON", 760.0, 9.0);
    let svc = dispatch(routing(mock));

    let mut shipment = Shipment::new(vec![
        Stop::pickup(1, YARD).with_load(2, 2000.0),
        Stop::delivery(2, "Thunder Bay, ON").with_load(2, 2000.0),
    ])
    .with_vehicle(truck());

    svc.plan_shipment(&mut shipment, at(4, 7, 0)).await.unwrap();

    // leave 08:00, 60 min pickup service, 9 h drive, 15 + 45 min breaks
    assert_eq!(shipment.leave_yard_at, Some(at(4, 8, 0)));
    let delivery = &shipment.stops[1];
    assert_eq!(delivery.break_minutes, 60.0);
    assert_eq!(delivery.scheduled_datetime, Some(at(4, 19, 0)));
}

#[tokio::test]
async fn test_strict_window_miss_is_infeasible() {
    let svc = dispatch(routing(corridor()));
    let mut delivery = Stop::delivery(2, "Brockville, ON").with_load(2, 2000.0);
    delivery.time_window_end = Some(at(4, 9, 0));
    delivery.window_strict = true;
    let mut shipment = Shipment::new(vec![Stop::pickup(1, "Mississauga, ON").with_load(2, 2000.0), delivery])
        .with_vehicle(truck());

    let err = svc.plan_shipment(&mut shipment, at(4, 7, 0)).await.unwrap_err();
    assert!(matches!(err, DispatchError::InfeasibleSchedule { sequence: 2, .. }));
    assert!(shipment.stops.iter().all(|s| s.scheduled_datetime.is_none()));
}

#[tokio::test]
async fn test_soft_window_miss_is_a_conflict() {
    let svc = dispatch(routing(corridor()));
    let mut delivery = Stop::delivery(2, "Brockville, ON").with_load(2, 2000.0);
    delivery.time_window_end = Some(at(4, 9, 0));
    let mut shipment = Shipment::new(vec![Stop::pickup(1, "Mississauga, ON").with_load(2, 2000.0), delivery])
        .with_vehicle(truck());

    let outcome = svc.plan_shipment(&mut shipment, at(4, 7, 0)).await.unwrap();
    assert!(shipment.schedule_conflict);
    assert!(outcome.warnings.contains("after its window closes"));
}

// =============================================================================
// 3. Run planning
// =============================================================================

fn planner(routing: Arc<RoutingClient>) -> (RunPlanner, Arc<InMemoryRunStore>) {
    let store = Arc::new(InMemoryRunStore::new());
    let planner = RunPlanner::new(routing, store.clone(), PlannerConfig::default(), HosRules::default());
    (planner, store)
}

fn lead(pickup: &str, delivery: &str, vehicle: &Vehicle, rate: f64) -> Shipment {
    let mut s = Shipment::new(vec![
        Stop::pickup(1, pickup).with_load(3, 3000.0),
        Stop::delivery(2, delivery).with_load(3, 3000.0),
    ])
    .with_vehicle(vehicle.clone());
    s.final_rate = Some(rate);
    s
}

#[tokio::test]
async fn test_first_lead_creates_run() {
    let (planner, store) = planner(routing(corridor()));
    let vehicle = truck();
    let mut shipment = lead("Mississauga, ON", "Kingston, ON", &vehicle, 900.0);
    let day = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();

    let plan = planner.optimize_insertion_for_lead(&mut shipment, day).await;

    assert!(plan.feasible);
    assert_eq!(plan.text, "Created new run and appended lead as first route.");
    assert_eq!(plan.options.len(), 1);
    assert_eq!(plan.options[0].candidate.deadhead_reduction, 0.0);

    let run = store.get(plan.run_id.unwrap()).unwrap();
    assert_eq!(run.stops().len(), 2);
    assert_eq!(run.revision(), 1);
    assert_eq!(shipment.dispatch_run, Some(run.id));
    assert_eq!(shipment.stops[0].run_sequence, Some(1));
    assert_eq!(run.totals().total_distance_km, 260.0);
}

#[tokio::test]
async fn test_second_lead_is_inserted_and_applied() {
    let (planner, store) = planner(routing(corridor()));
    let vehicle = truck();
    let day = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();

    let mut first = lead("Mississauga, ON", "Brockville, ON", &vehicle, 1100.0);
    planner.optimize_insertion_for_lead(&mut first, day).await;

    let mut second = lead("Oshawa, ON", "Kingston, ON", &vehicle, 700.0);
    let plan = planner.optimize_insertion_for_lead(&mut second, day).await;

    assert!(plan.feasible);
    assert!(plan.text.starts_with("Top schedule options:"));
    assert!(plan.text.contains("Option 1:"));
    assert!(plan.options.len() <= 3);

    // Oshawa and Kingston sit between the existing stops: no extra km
    let best = &plan.options[0];
    assert_eq!(best.candidate.added_km, 0.0);
    let addresses: Vec<&str> = best.candidate.order.iter().map(|s| s.address.as_str()).collect();
    assert_eq!(
        addresses,
        ["Mississauga, ON", "Oshawa, ON", "Kingston, ON", "Brockville, ON"]
    );

    let run = planner.apply_option(&mut second, best).await.unwrap();
    assert_eq!(run.stops().len(), 4);
    assert_eq!(run.revision(), 2);
    assert_eq!(run.total_revenue(), 1800.0);
    assert_eq!(store.get(run.id).unwrap(), run);

    // Same option again is stale
    let err = planner.apply_option(&mut second, best).await.unwrap_err();
    assert!(matches!(err, DispatchError::StaleRun { expected: 1, actual: 2, .. }));
}

#[tokio::test]
async fn test_lead_without_vehicle_is_infeasible() {
    let (planner, store) = planner(routing(corridor()));
    let mut shipment = Shipment::new(vec![
        Stop::pickup(1, "Oshawa, ON"),
        Stop::delivery(2, "Kingston, ON"),
    ]);

    let plan = planner
        .optimize_insertion_for_lead(&mut shipment, NaiveDate::from_ymd_opt(2025, 3, 4).unwrap())
        .await;
    assert!(!plan.feasible);
    assert_eq!(plan.text, "No assigned vehicle. Assign a vehicle before optimization.");
    assert!(store.is_empty());
}

// =============================================================================
// 4. Plan then insert
// =============================================================================

#[tokio::test]
async fn test_planned_shipment_lands_on_its_departure_day() {
    let client = routing(corridor());
    let svc = dispatch(client.clone());
    let (planner, store) = planner(client);
    let vehicle = truck();

    let mut shipment = lead("Mississauga, ON", "Kingston, ON", &vehicle, 950.0);
    // after the cutoff: leaves the next morning
    svc.plan_shipment(&mut shipment, at(4, 15, 0)).await.unwrap();
    assert_eq!(shipment.leave_yard_at, Some(at(5, 8, 0)));

    let plan = planner
        .optimize_insertion_for_lead(&mut shipment, NaiveDate::from_ymd_opt(2025, 3, 4).unwrap())
        .await;
    let run = store.get(plan.run_id.unwrap()).unwrap();
    assert_eq!(run.run_date, NaiveDate::from_ymd_opt(2025, 3, 5).unwrap());
    assert_eq!(run.shipment_revenue().get(&shipment.id), Some(&950.0));
}
