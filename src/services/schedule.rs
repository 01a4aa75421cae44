//! Stop scheduling with Hours-of-Service breaks.
//!
//! Given the ordered stops of a shipment, the inbound route leg of every stop
//! and the assigned vehicle, this module picks the leave-yard time and walks
//! the stops computing arrival/departure times. Nothing is written to the
//! stops until the whole schedule has been computed without a hard error.

use chrono::{Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::defaults::{
    work_start_time, DEFAULT_PREP_BUFFER_MINUTES, DEFAULT_WORK_START_HOUR, NEXT_DAY_CUTOFF_HOUR,
};
use crate::error::{CapacityResource, DispatchError, Warnings};
use crate::services::hos::{HosRules, HosState};
use crate::services::routing::RouteLeg;
use crate::types::{LoadSummary, Shipment, Stop, Vehicle};

/// Scheduling knobs (the `scheduling` section of the rules file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    pub hos: HosRules,
    /// Slack before the first anchored window
    pub prep_buffer_minutes: i64,
    /// Requests made at or after this hour are planned for the next day
    pub next_day_cutoff_hour: u32,
    /// Used when no vehicle is assigned
    pub default_work_start_hour: f64,
    pub default_payload_lbs: f64,
    pub default_max_pallets: u32,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            hos: HosRules::default(),
            prep_buffer_minutes: DEFAULT_PREP_BUFFER_MINUTES,
            next_day_cutoff_hour: NEXT_DAY_CUTOFF_HOUR,
            default_work_start_hour: DEFAULT_WORK_START_HOUR,
            default_payload_lbs: 13000.0,
            default_max_pallets: 12,
        }
    }
}

/// Computed times for one stop
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopTiming {
    pub stop_id: Uuid,
    pub sequence: i32,
    pub arrival: NaiveDateTime,
    pub departure: NaiveDateTime,
    pub distance_km: f64,
    pub drive_hours: f64,
    pub break_minutes: f64,
    /// Time spent waiting for the window to open
    pub wait_minutes: i64,
    /// Arrived after the window closed
    pub late: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleSummary {
    pub leave_yard_at: Option<NaiveDateTime>,
    pub total_distance_km: f64,
    /// Pure drive time, breaks excluded
    pub total_drive_hours: f64,
    pub total_break_minutes: f64,
    pub conflict: bool,
    pub warnings: Warnings,
    pub stops: Vec<StopTiming>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn add_hours(t: NaiveDateTime, hours: f64) -> NaiveDateTime {
    t + Duration::seconds((hours * 3600.0).round() as i64)
}

fn add_minutes(t: NaiveDateTime, minutes: i64) -> NaiveDateTime {
    t + Duration::minutes(minutes)
}

fn leg_at(legs: &[RouteLeg], idx: usize) -> RouteLeg {
    legs.get(idx).copied().unwrap_or_default()
}

/// Effective (break-inclusive) hours of every leg, driven back to back
fn effective_legs(legs: &[RouteLeg], count: usize, rules: &HosRules) -> Vec<(f64, f64)> {
    let mut state = HosState::new();
    (0..count)
        .map(|i| {
            let b = state.drive(rules, leg_at(legs, i).drive_hours);
            (b.effective_hours(), b.break_minutes)
        })
        .collect()
}

/// Check pallets and weight against the vehicle (or configured defaults).
pub fn check_capacity(load: &LoadSummary, max_pallets: u32, payload_lbs: f64) -> Result<(), DispatchError> {
    if load.pallets() > max_pallets {
        return Err(DispatchError::CapacityExceeded {
            resource: CapacityResource::Pallets,
            actual: load.pallets() as f64,
            limit: max_pallets as f64,
        });
    }
    if load.weight_lbs() > payload_lbs {
        return Err(DispatchError::CapacityExceeded {
            resource: CapacityResource::WeightLbs,
            actual: load.weight_lbs(),
            limit: payload_lbs,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Timeline
// ---------------------------------------------------------------------------

/// Walk stops forward from `start`, waiting for windows to open.
///
/// `legs[i]` is the inbound leg of `stops[i]`; missing legs count as zero.
/// Late arrivals are flagged, not rejected.
pub fn timeline(start: NaiveDateTime, stops: &[Stop], legs: &[RouteLeg], rules: &HosRules) -> Vec<StopTiming> {
    let effective = effective_legs(legs, stops.len(), rules);
    let mut cursor = start;
    let mut out = Vec::with_capacity(stops.len());

    for (i, stop) in stops.iter().enumerate() {
        let leg = leg_at(legs, i);
        let (effective_hours, break_minutes) = effective[i];

        let earliest = add_hours(cursor, effective_hours);
        let arrival = match stop.time_window_start {
            Some(open) if open > earliest => open,
            _ => earliest,
        };
        let wait_minutes = (arrival - earliest).num_minutes();
        let late = stop.time_window_end.is_some_and(|close| arrival > close);
        let departure = add_minutes(arrival, stop.service_minutes() as i64);

        out.push(StopTiming {
            stop_id: stop.id,
            sequence: stop.sequence,
            arrival,
            departure,
            distance_km: leg.distance_km,
            drive_hours: leg.drive_hours,
            break_minutes,
            wait_minutes,
            late,
        });
        cursor = departure;
    }

    out
}

/// Leave-yard time.
///
/// With windows: back from the earliest window start by the effective drive
/// time and service durations before it, minus the prep buffer. Without:
/// work start on `now`'s date, or the next day after the cutoff hour, and
/// never earlier than `now`.
pub fn leave_yard_time(
    stops: &[Stop],
    legs: &[RouteLeg],
    work_start_hour: f64,
    now: NaiveDateTime,
    config: &SchedulingConfig,
) -> NaiveDateTime {
    let anchor = stops
        .iter()
        .enumerate()
        .filter_map(|(i, s)| s.time_window_start.map(|w| (i, w)))
        .min_by_key(|(_, w)| *w);

    match anchor {
        Some((k, window_start)) => {
            let effective = effective_legs(legs, k + 1, &config.hos);
            let drive: f64 = effective.iter().map(|(h, _)| h).sum();
            let service: i64 = stops[..k].iter().map(|s| s.service_minutes() as i64).sum();
            let leave = add_hours(window_start, -drive);
            add_minutes(leave, -(service + config.prep_buffer_minutes))
        }
        None => {
            let mut date = now.date();
            if now.hour() >= config.next_day_cutoff_hour {
                date = date.succ_opt().unwrap_or(date);
            }
            date.and_time(work_start_time(work_start_hour)).max(now)
        }
    }
}

// ---------------------------------------------------------------------------
// Core computation
// ---------------------------------------------------------------------------

/// Compute and write the schedule for ordered stops.
///
/// Hard errors (`CapacityExceeded`, `InfeasibleSchedule`) leave every stop
/// untouched. Identical inputs give identical outputs.
pub fn compute_schedule(
    stops: &mut [Stop],
    legs: &[RouteLeg],
    vehicle: Option<&Vehicle>,
    now: NaiveDateTime,
    config: &SchedulingConfig,
) -> Result<ScheduleSummary, DispatchError> {
    let mut warnings = Warnings::new();

    // 1. Capacity before any route math
    let load = LoadSummary::of(stops);
    let (max_pallets, payload, work_start_hour) = match vehicle {
        Some(v) => (v.max_pallets, v.payload_capacity_lbs, v.work_start_hour),
        None => (
            config.default_max_pallets,
            config.default_payload_lbs,
            config.default_work_start_hour,
        ),
    };
    check_capacity(&load, max_pallets, payload)?;

    if !load.pallets_balanced() {
        warnings.push(format!(
            "Pallet mismatch: pickups total {} pallets but deliveries total {}",
            load.pickup_pallets, load.delivery_pallets
        ));
    }

    if stops.is_empty() {
        warnings.push("No stops to schedule");
        return Ok(ScheduleSummary {
            leave_yard_at: None,
            total_distance_km: 0.0,
            total_drive_hours: 0.0,
            total_break_minutes: 0.0,
            conflict: false,
            warnings,
            stops: Vec::new(),
        });
    }

    for stop in stops.iter().skip(legs.len()) {
        warnings.push(format!(
            "No route leg for stop {} ({}); assuming 0 km",
            stop.sequence, stop.address
        ));
    }

    // 2. Anchor + forward walk
    let leave = leave_yard_time(stops, legs, work_start_hour, now, config);
    let timings = timeline(leave, stops, legs, &config.hos);

    // 3. Window enforcement
    let mut conflict = false;
    for (stop, timing) in stops.iter().zip(&timings) {
        if !timing.late {
            continue;
        }
        let Some(window_end) = stop.time_window_end else {
            continue;
        };
        if stop.window_strict {
            return Err(DispatchError::InfeasibleSchedule {
                sequence: stop.sequence,
                arrival: timing.arrival,
                window_end,
            });
        }
        conflict = true;
        warn!(sequence = stop.sequence, arrival = %timing.arrival, %window_end, "soft window missed");
        warnings.push(format!(
            "Stop {} ({}) arrives {} after its window closes at {}",
            stop.sequence,
            stop.address,
            timing.arrival.format("%Y-%m-%d %H:%M"),
            window_end.format("%Y-%m-%d %H:%M")
        ));
    }

    // 4. Write back
    for (stop, timing) in stops.iter_mut().zip(&timings) {
        stop.scheduled_datetime = Some(timing.arrival);
        stop.estimated_arrival = Some(timing.arrival);
        stop.distance_km = timing.distance_km;
        stop.set_drive_hours(timing.drive_hours);
        stop.break_minutes = timing.break_minutes;
    }

    let summary = ScheduleSummary {
        leave_yard_at: Some(leave),
        total_distance_km: timings.iter().map(|t| t.distance_km).sum(),
        total_drive_hours: timings.iter().map(|t| t.drive_hours).sum(),
        total_break_minutes: timings.iter().map(|t| t.break_minutes).sum(),
        conflict,
        warnings,
        stops: timings,
    };

    debug!(
        leave = ?summary.leave_yard_at,
        km = summary.total_distance_km,
        hours = summary.total_drive_hours,
        conflict,
        "schedule computed"
    );

    Ok(summary)
}

/// Schedule a shipment's stops in sequence order and record the result on it.
pub fn schedule_shipment(
    shipment: &mut Shipment,
    legs: &[RouteLeg],
    now: NaiveDateTime,
    config: &SchedulingConfig,
) -> Result<ScheduleSummary, DispatchError> {
    shipment.sort_stops();
    let vehicle = shipment.assigned_vehicle.clone();
    let summary = compute_schedule(&mut shipment.stops, legs, vehicle.as_ref(), now, config)?;
    shipment.leave_yard_at = summary.leave_yard_at;
    shipment.schedule_conflict = summary.conflict;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 4)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn leg(km: f64, hours: f64) -> RouteLeg {
        RouteLeg {
            distance_km: km,
            drive_hours: hours,
        }
    }

    fn truck() -> Vehicle {
        Vehicle::new("Truck 1", "Yard").with_capacity(13000.0, 12)
    }

    fn pair() -> Vec<Stop> {
        vec![
            Stop::pickup(1, "Barrie, ON").with_load(4, 3000.0),
            Stop::delivery(2, "Toronto, ON").with_load(4, 3000.0),
        ]
    }

    // -----------------------------------------------------------------------
    // 1. Capacity
    // -----------------------------------------------------------------------

    #[test]
    fn overweight_is_rejected_without_writes() {
        let mut stops = vec![
            Stop::pickup(1, "A").with_load(10, 15000.0),
            Stop::delivery(2, "B").with_load(10, 15000.0),
        ];
        let legs = vec![leg(10.0, 0.2), leg(100.0, 1.5)];

        let err = compute_schedule(&mut stops, &legs, Some(&truck()), dt(9, 0), &SchedulingConfig::default())
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::CapacityExceeded {
                resource: CapacityResource::WeightLbs,
                ..
            }
        ));
        assert!(stops.iter().all(|s| s.scheduled_datetime.is_none()));
        assert!(stops.iter().all(|s| s.distance_km == 0.0));
    }

    #[test]
    fn too_many_pallets_is_rejected() {
        let mut stops = vec![
            Stop::pickup(1, "A").with_load(14, 5000.0),
            Stop::delivery(2, "B").with_load(14, 5000.0),
        ];
        let err = compute_schedule(&mut stops, &[], Some(&truck()), dt(9, 0), &SchedulingConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::CapacityExceeded {
                resource: CapacityResource::Pallets,
                ..
            }
        ));
    }

    #[test]
    fn pallet_mismatch_is_a_warning() {
        let mut stops = vec![
            Stop::pickup(1, "A").with_load(6, 3000.0),
            Stop::delivery(2, "B").with_load(4, 3000.0),
        ];
        let legs = vec![leg(0.0, 0.0), leg(50.0, 1.0)];
        let summary =
            compute_schedule(&mut stops, &legs, Some(&truck()), dt(9, 0), &SchedulingConfig::default()).unwrap();
        assert!(summary.warnings.contains("Pallet mismatch"));
    }

    // -----------------------------------------------------------------------
    // 2. Anchor selection
    // -----------------------------------------------------------------------

    #[test]
    fn forward_from_work_start_today() {
        let mut stops = pair();
        let legs = vec![leg(20.0, 0.5), leg(100.0, 1.5)];
        let summary =
            compute_schedule(&mut stops, &legs, Some(&truck()), dt(7, 0), &SchedulingConfig::default()).unwrap();

        assert_eq!(summary.leave_yard_at, Some(dt(8, 0)));
        // 08:00 + 30 min drive
        assert_eq!(stops[0].estimated_arrival, Some(dt(8, 30)));
        // + 60 min service + 90 min drive
        assert_eq!(stops[1].estimated_arrival, Some(dt(11, 0)));
        assert_eq!(stops[1].scheduled_datetime, stops[1].estimated_arrival);
    }

    #[test]
    fn forward_start_never_before_now() {
        let mut stops = pair();
        let legs = vec![leg(20.0, 0.5), leg(100.0, 1.5)];
        let summary =
            compute_schedule(&mut stops, &legs, Some(&truck()), dt(10, 0), &SchedulingConfig::default()).unwrap();

        // work start already passed, so the truck leaves now
        assert_eq!(summary.leave_yard_at, Some(dt(10, 0)));
        assert_eq!(stops[0].estimated_arrival, Some(dt(10, 30)));
    }

    #[test]
    fn forward_rolls_to_next_day_after_cutoff() {
        let mut stops = pair();
        let legs = vec![leg(20.0, 0.5), leg(100.0, 1.5)];
        let mut vehicle = truck();
        vehicle.work_start_hour = 6.5;
        let summary =
            compute_schedule(&mut stops, &legs, Some(&vehicle), dt(13, 0), &SchedulingConfig::default()).unwrap();

        let expected = NaiveDate::from_ymd_opt(2025, 3, 5)
            .unwrap()
            .and_hms_opt(6, 30, 0)
            .unwrap();
        assert_eq!(summary.leave_yard_at, Some(expected));
    }

    #[test]
    fn backward_from_earliest_window() {
        let mut stops = pair();
        stops[1].time_window_start = Some(dt(14, 0));
        let legs = vec![leg(20.0, 0.5), leg(100.0, 1.5)];
        let summary =
            compute_schedule(&mut stops, &legs, Some(&truck()), dt(9, 0), &SchedulingConfig::default()).unwrap();

        // 14:00 - (0.5 h + 1.5 h + 60 min service) - 15 min prep
        assert_eq!(summary.leave_yard_at, Some(dt(10, 45)));
        // arrives 15 min early and waits for the window
        assert_eq!(stops[1].estimated_arrival, Some(dt(14, 0)));
        assert_eq!(summary.stops[1].wait_minutes, 15);
    }

    // -----------------------------------------------------------------------
    // 3. HOS
    // -----------------------------------------------------------------------

    #[test]
    fn nine_hour_leg_adds_one_hour_of_breaks() {
        let mut stops = vec![
            Stop::pickup(1, "Yard").with_load(2, 1000.0),
            Stop::delivery(2, "Far").with_load(2, 1000.0),
        ];
        let legs = vec![leg(0.0, 0.0), leg(800.0, 9.0)];
        let summary =
            compute_schedule(&mut stops, &legs, Some(&truck()), dt(7, 0), &SchedulingConfig::default()).unwrap();

        assert_eq!(stops[1].break_minutes, 60.0);
        assert_eq!(stops[1].drive_minutes, 540.0);
        // 08:00 + 60 min service + 10 h effective
        assert_eq!(stops[1].estimated_arrival, Some(dt(19, 0)));
        assert_eq!(summary.total_drive_hours, 9.0);
        assert_eq!(summary.total_break_minutes, 60.0);
    }

    // -----------------------------------------------------------------------
    // 4. Windows
    // -----------------------------------------------------------------------

    #[test]
    fn strict_window_miss_is_infeasible_and_writes_nothing() {
        let mut stops = pair();
        stops[1].time_window_end = Some(dt(9, 0));
        stops[1].window_strict = true;
        let legs = vec![leg(20.0, 0.5), leg(100.0, 1.5)];

        let err = compute_schedule(&mut stops, &legs, Some(&truck()), dt(7, 0), &SchedulingConfig::default())
            .unwrap_err();
        assert!(matches!(err, DispatchError::InfeasibleSchedule { sequence: 2, .. }));
        assert!(stops.iter().all(|s| s.scheduled_datetime.is_none()));
    }

    #[test]
    fn soft_window_miss_sets_conflict() {
        let mut stops = pair();
        stops[1].time_window_end = Some(dt(9, 0));
        let legs = vec![leg(20.0, 0.5), leg(100.0, 1.5)];

        let summary =
            compute_schedule(&mut stops, &legs, Some(&truck()), dt(7, 0), &SchedulingConfig::default()).unwrap();
        assert!(summary.conflict);
        assert!(summary.warnings.contains("after its window closes"));
        assert!(stops[1].scheduled_datetime.is_some());
    }

    // -----------------------------------------------------------------------
    // 5. Properties
    // -----------------------------------------------------------------------

    #[test]
    fn schedule_is_idempotent() {
        let legs = vec![leg(20.0, 0.5), leg(300.0, 4.5)];
        let mut first = pair();
        let mut second = pair();
        let a = compute_schedule(&mut first, &legs, Some(&truck()), dt(9, 0), &SchedulingConfig::default()).unwrap();
        let b = compute_schedule(&mut second, &legs, Some(&truck()), dt(9, 0), &SchedulingConfig::default()).unwrap();

        assert_eq!(a.leave_yard_at, b.leave_yard_at);
        for (x, y) in first.iter().zip(&second) {
            assert_eq!(x.scheduled_datetime, y.scheduled_datetime);
            assert_eq!(x.break_minutes, y.break_minutes);
        }

        // rerunning over already-scheduled stops gives the same answer
        let c = compute_schedule(&mut first, &legs, Some(&truck()), dt(9, 0), &SchedulingConfig::default()).unwrap();
        assert_eq!(a.stops, c.stops);
    }

    #[test]
    fn arrivals_are_monotonic() {
        let mut stops = vec![
            Stop::pickup(1, "A").with_load(2, 1000.0),
            Stop::pickup(2, "B").with_load(2, 1000.0),
            Stop::delivery(3, "C").with_load(2, 1000.0),
            Stop::delivery(4, "D").with_load(2, 1000.0),
        ];
        stops[2].time_window_start = Some(dt(16, 0));
        let legs = vec![leg(10.0, 0.3), leg(200.0, 3.0), leg(150.0, 2.0), leg(400.0, 5.5)];
        let summary =
            compute_schedule(&mut stops, &legs, Some(&truck()), dt(9, 0), &SchedulingConfig::default()).unwrap();

        for w in summary.stops.windows(2) {
            let travel = w[1].drive_hours + w[1].break_minutes / 60.0;
            assert!(w[1].arrival >= add_hours(w[0].departure, travel) - Duration::seconds(1));
        }
    }

    #[test]
    fn missing_legs_become_zero_with_warning() {
        let mut stops = pair();
        let legs = vec![leg(20.0, 0.5)];
        let summary =
            compute_schedule(&mut stops, &legs, Some(&truck()), dt(9, 0), &SchedulingConfig::default()).unwrap();
        assert!(summary.warnings.contains("No route leg for stop 2"));
        assert_eq!(stops[1].distance_km, 0.0);
    }

    #[test]
    fn schedule_shipment_records_leave_and_conflict() {
        let mut shipment = Shipment::new(vec![
            Stop::delivery(2, "Toronto, ON").with_load(4, 3000.0),
            Stop::pickup(1, "Barrie, ON").with_load(4, 3000.0),
        ])
        .with_vehicle(truck());
        let legs = vec![leg(20.0, 0.5), leg(100.0, 1.5)];

        let summary = schedule_shipment(&mut shipment, &legs, dt(9, 0), &SchedulingConfig::default()).unwrap();
        assert_eq!(shipment.stops[0].address, "Barrie, ON");
        assert_eq!(shipment.leave_yard_at, summary.leave_yard_at);
        assert!(!shipment.schedule_conflict);
        assert_eq!(shipment.total_distance_km(), 120.0);
    }
}
