//! Error taxonomy and soft-failure carriers
//!
//! Hard failures (`DispatchError`) abort the current call before anything is
//! written. Soft failures never abort: routing problems come back as
//! `RoutingWarning`/`Degraded<T>`, and everything that should reach the
//! dispatcher ends up in a `Warnings` list next to the computed answer.

use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Which vehicle limit was exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityResource {
    Pallets,
    WeightLbs,
}

impl fmt::Display for CapacityResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacityResource::Pallets => write!(f, "pallets"),
            CapacityResource::WeightLbs => write!(f, "weight (lbs)"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("capacity exceeded: {resource} {actual} > vehicle limit {limit}")]
    CapacityExceeded {
        resource: CapacityResource,
        actual: f64,
        limit: f64,
    },

    #[error("stop {sequence} misses its required window: arrival {arrival} is after {window_end}")]
    InfeasibleSchedule {
        sequence: i32,
        arrival: NaiveDateTime,
        window_end: NaiveDateTime,
    },

    #[error("pricing for shipment {0} is locked by a confirmed sales order")]
    PricingLocked(Uuid),

    #[error("run {0} not found")]
    RunNotFound(Uuid),

    #[error("run {run_id} changed since the option was computed (revision {expected} -> {actual})")]
    StaleRun {
        run_id: Uuid,
        expected: u64,
        actual: u64,
    },
}

/// Routing or geocoding could not be served by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingWarning {
    pub message: String,
}

impl RoutingWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for RoutingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// A best-effort value produced after the provider failed.
#[derive(Debug, Clone, PartialEq)]
pub struct Degraded<T> {
    pub estimate: T,
    pub warning: RoutingWarning,
}

/// Prefix used for pricing that ran on missing inputs.
pub const INSUFFICIENT_DATA: &str = "Insufficient data";

pub fn insufficient_data(detail: &str) -> String {
    format!("{}: {}", INSUFFICIENT_DATA, detail)
}

/// Ordered, deduplicated warning list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Warnings {
    items: Vec<String>,
    #[serde(skip)]
    seen: HashSet<String>,
}

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        if warning.is_empty() {
            return;
        }
        if self.seen.insert(warning.clone()) {
            self.items.push(warning);
        }
    }

    pub fn extend<I, S>(&mut self, warnings: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for w in warnings {
            self.push(w);
        }
    }

    pub fn merge(&mut self, other: &Warnings) {
        for w in &other.items {
            self.push(w.clone());
        }
    }

    /// Unwrap a degradable result, recording the warning if it was degraded.
    pub fn absorb<T>(&mut self, result: Result<T, Degraded<T>>) -> T {
        match result {
            Ok(value) => value,
            Err(degraded) => {
                self.push(degraded.warning.message);
                degraded.estimate
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.items.iter()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.items.iter().any(|w| w.contains(needle))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.items
    }
}
