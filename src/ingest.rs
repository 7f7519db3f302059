use crate::config::Config;
use crate::error::{AppError, DataQualityWarning};
use crate::normalize::normalize;
use crate::point::{IncrementalWh, IntervalDelta};
use crate::reconcile::Reconciler;
use crate::response::{select_raw_points, RawPoint};
use crate::state::StateStore;
use chrono::FixedOffset;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Result of one reconciliation pass for one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileOutcome {
    pub unit: String,
    pub deltas: Vec<IntervalDelta>,
    pub warnings: Vec<DataQualityWarning>,
    pub duplicates: usize,
    pub already_consumed: usize,
}

impl ReconcileOutcome {
    fn empty(unit: &str) -> Self {
        Self {
            unit: unit.to_string(),
            ..Default::default()
        }
    }

    pub fn total_energy(&self) -> IncrementalWh {
        self.deltas.iter().map(|d| d.energy_wh).sum()
    }
}

pub struct Ingestor {
    cfg: Config,
    offset: Option<FixedOffset>,
    store: StateStore,
    default_reconciler: Reconciler,
    unit_reconcilers: HashMap<String, Reconciler>,
}

impl Ingestor {
    pub fn new(cfg: Config) -> Result<Self, AppError> {
        Self::with_store(cfg, StateStore::new())
    }

    /// Build an ingestor on top of an existing store, e.g. one shared with a poller.
    pub fn with_store(cfg: Config, store: StateStore) -> Result<Self, AppError> {
        cfg.validate()?;
        let offset = cfg.timestamp.offset()?;
        let default_reconciler = Reconciler::new(ceiling(cfg.reconciler.max_interval_energy_wh)?);
        let unit_reconcilers = cfg
            .units
            .iter()
            .map(|u| ceiling(cfg.ceiling_for(&u.id)).map(|c| (u.id.clone(), Reconciler::new(c))))
            .collect::<Result<HashMap<_, _>, AppError>>()?;

        Ok(Self {
            cfg,
            offset,
            store,
            default_reconciler,
            unit_reconcilers,
        })
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn reconciler_for(&self, unit: &str) -> &Reconciler {
        self.unit_reconcilers
            .get(unit)
            .unwrap_or(&self.default_reconciler)
    }

    /// Decode a raw telemetry response body and reconcile it for `unit`.
    ///
    /// A body that cannot be decoded is reported as a warning; it never fails
    /// the call and never touches the unit's state.
    pub fn process_response(&self, unit: &str, payload: &[u8]) -> ReconcileOutcome {
        match serde_json::from_slice::<Value>(payload) {
            Ok(json) => self.process_value(unit, &json),
            Err(e) => malformed(unit, e.into()),
        }
    }

    /// Same as [`Ingestor::process_response`] for a body that is already parsed.
    pub fn process_value(&self, unit: &str, json: &Value) -> ReconcileOutcome {
        match select_raw_points(json, &self.cfg.response) {
            Ok(raw) => self.process_points(unit, raw),
            Err(e) => malformed(unit, e),
        }
    }

    /// Normalize, reconcile against the stored state and write the new state back.
    pub fn process_points(&self, unit: &str, raw: Vec<RawPoint>) -> ReconcileOutcome {
        if raw.is_empty() {
            debug!(unit = %unit, "empty batch; nothing to reconcile");
            return ReconcileOutcome::empty(unit);
        }

        let normalized = normalize(raw, &self.cfg.timestamp, self.offset);
        let prior = self.store.get(unit);
        let cold = prior.is_cold();
        let rec = self
            .reconciler_for(unit)
            .reconcile(unit, &normalized.points, prior);

        if rec.state != prior {
            self.store.set(unit, rec.state);
        }
        if cold && !rec.state.is_cold() {
            debug!(unit = %unit, ts = ?rec.state.last_timestamp, "cold start; seeded counter state");
        }

        let mut warnings = normalized.warnings;
        warnings.extend(rec.warnings);
        let out = ReconcileOutcome {
            unit: unit.to_string(),
            deltas: rec.deltas,
            warnings,
            duplicates: normalized.duplicates,
            already_consumed: rec.already_consumed,
        };

        log_warnings(&out);
        debug!(
            unit = %unit,
            points = normalized.points.len(),
            deltas = out.deltas.len(),
            duplicates = out.duplicates,
            already_consumed = out.already_consumed,
            energy_wh = out.total_energy().get(),
            "reconciled batch"
        );
        out
    }
}

fn ceiling(v: f64) -> Result<IncrementalWh, AppError> {
    IncrementalWh::new(v)
        .ok_or_else(|| AppError::Config(format!("invalid interval energy ceiling: {}", v)))
}

fn malformed(unit: &str, e: AppError) -> ReconcileOutcome {
    let mut out = ReconcileOutcome::empty(unit);
    out.warnings.push(DataQualityWarning::MalformedResponse {
        reason: e.to_string(),
    });
    log_warnings(&out);
    out
}

fn log_warnings(out: &ReconcileOutcome) {
    for w in &out.warnings {
        warn!(unit = %out.unit, warning = %w, "data quality");
    }
}
