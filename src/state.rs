use crate::point::UnitCounterState;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// Process-lifetime counter memory, partitioned by unit id.
///
/// Cloning gives another handle to the same map. The lock only covers a single
/// get or set; callers must not reconcile the same unit twice at once.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    inner: Arc<Mutex<HashMap<String, UnitCounterState>>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// State for `unit`, or the cold state if it was never seen.
    pub fn get(&self, unit: &str) -> UnitCounterState {
        self.lock().get(unit).copied().unwrap_or_default()
    }

    pub fn set(&self, unit: &str, state: UnitCounterState) {
        self.lock().insert(unit.to_string(), state);
    }

    /// Drop a unit's memory; its next reading is a cold start.
    pub fn forget(&self, unit: &str) -> Option<UnitCounterState> {
        self.lock().remove(unit)
    }

    pub fn units(&self) -> Vec<String> {
        let mut units: Vec<String> = self.lock().keys().cloned().collect();
        units.sort();
        units
    }

    pub fn snapshot(&self) -> BTreeMap<String, UnitCounterState> {
        self.lock()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, UnitCounterState>> {
        // Every critical section is a single map operation, so a poisoned
        // lock still holds a consistent map.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
