use chrono::NaiveTime;

pub const DEFAULT_PICKUP_SERVICE_MINUTES: i32 = 60;
pub const DEFAULT_DELIVERY_SERVICE_MINUTES: i32 = 45;

/// Yard used when a shipment has no assigned vehicle
pub const DEFAULT_YARD_ADDRESS: &str = "5585 McAdam Rd, Mississauga, ON L4Z 1P1";
pub const DEFAULT_HOME_COUNTRY: &str = "CA";

/// Pallet estimate when only weight is known
pub const LBS_PER_PALLET_ESTIMATE: f64 = 1800.0;

pub const DEFAULT_WORK_START_HOUR: f64 = 8.0;
/// Requests made at or after this hour plan for the next day
pub const NEXT_DAY_CUTOFF_HOUR: u32 = 13;
pub const DEFAULT_PREP_BUFFER_MINUTES: i64 = 15;

pub fn default_work_start() -> NaiveTime {
    work_start_time(DEFAULT_WORK_START_HOUR)
}

/// Convert a fractional hour (8.5 = 08:30) into a wall-clock time.
pub fn work_start_time(hour: f64) -> NaiveTime {
    let minutes = (hour.clamp(0.0, 23.99) * 60.0).round() as u32;
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0).unwrap_or(NaiveTime::MIN)
}
