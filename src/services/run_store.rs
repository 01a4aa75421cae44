//! Run persistence
//!
//! The planner only needs get-or-create by (vehicle, date) and an atomic
//! commit that replaces stops and totals together. Commits carry the
//! revision the caller read, so a run changed in between is rejected.

use std::collections::HashMap;

use chrono::NaiveDate;
use parking_lot::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::types::{Run, RunTotals, Stop, Vehicle};

pub trait RunStore: Send + Sync {
    /// Run of `vehicle` on `date`, created empty when missing
    fn get_or_create(&self, vehicle: &Vehicle, date: NaiveDate) -> Run;

    fn get(&self, run_id: Uuid) -> Result<Run, DispatchError>;

    /// Replace stops, totals and revenue in one step.
    fn commit(
        &self,
        run_id: Uuid,
        expected_revision: u64,
        stops: Vec<Stop>,
        totals: RunTotals,
        shipment_revenue: HashMap<Uuid, f64>,
    ) -> Result<Run, DispatchError>;
}

#[derive(Default)]
struct Inner {
    runs: HashMap<Uuid, Run>,
    by_vehicle_day: HashMap<(Uuid, NaiveDate), Uuid>,
}

/// Process-local store for tests and the CLI
#[derive(Default)]
pub struct InMemoryRunStore {
    inner: Mutex<Inner>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Seed a run loaded from elsewhere (e.g. a JSON file).
    pub fn insert(&self, run: Run) {
        let mut inner = self.inner.lock();
        inner
            .by_vehicle_day
            .insert((run.vehicle.id, run.run_date), run.id);
        inner.runs.insert(run.id, run);
    }
}

impl RunStore for InMemoryRunStore {
    fn get_or_create(&self, vehicle: &Vehicle, date: NaiveDate) -> Run {
        let mut inner = self.inner.lock();
        if let Some(id) = inner.by_vehicle_day.get(&(vehicle.id, date)).copied() {
            if let Some(run) = inner.runs.get(&id) {
                return run.clone();
            }
        }
        let run = Run::new(vehicle.clone(), date);
        info!(run = %run.id, vehicle = %vehicle.name, %date, "created run");
        inner.by_vehicle_day.insert((vehicle.id, date), run.id);
        inner.runs.insert(run.id, run.clone());
        run
    }

    fn get(&self, run_id: Uuid) -> Result<Run, DispatchError> {
        self.inner
            .lock()
            .runs
            .get(&run_id)
            .cloned()
            .ok_or(DispatchError::RunNotFound(run_id))
    }

    fn commit(
        &self,
        run_id: Uuid,
        expected_revision: u64,
        stops: Vec<Stop>,
        totals: RunTotals,
        shipment_revenue: HashMap<Uuid, f64>,
    ) -> Result<Run, DispatchError> {
        let mut inner = self.inner.lock();
        let run = inner
            .runs
            .get_mut(&run_id)
            .ok_or(DispatchError::RunNotFound(run_id))?;
        if run.revision() != expected_revision {
            return Err(DispatchError::StaleRun {
                run_id,
                expected: expected_revision,
                actual: run.revision(),
            });
        }
        run.commit(stops, totals, shipment_revenue);
        info!(run = %run_id, revision = run.revision(), stops = run.stops().len(), "run committed");
        Ok(run.clone())
    }
}
