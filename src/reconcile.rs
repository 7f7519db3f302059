use crate::error::DataQualityWarning;
use crate::point::{IncrementalWh, IntervalDelta, TelemetryPoint, UnitCounterState};

/// Turns cumulative counter readings into per-interval energy.
///
/// Any decrease between consecutive readings is taken as a full reset: the
/// counter restarted from zero somewhere inside the interval, so the new
/// reading itself is the interval's energy. Whether the upstream counter
/// resets hourly, daily or per upload cannot be told from the series, so no
/// finer rule is attempted. A reset reading above the ceiling is treated as
/// corrupt and skipped without touching state.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    ceiling: IncrementalWh,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    pub deltas: Vec<IntervalDelta>,
    pub state: UnitCounterState,
    pub warnings: Vec<DataQualityWarning>,
    /// Points at or before the last consumed timestamp.
    pub already_consumed: usize,
}

impl Reconciler {
    pub fn new(ceiling: IncrementalWh) -> Self {
        Self { ceiling }
    }

    pub fn ceiling(&self) -> IncrementalWh {
        self.ceiling
    }

    /// `points` must be ascending (see [`crate::normalize::normalize`]).
    pub fn reconcile(
        &self,
        unit: &str,
        points: &[TelemetryPoint],
        prior: UnitCounterState,
    ) -> Reconciliation {
        let mut out = Reconciliation {
            state: prior,
            ..Default::default()
        };

        for &current in points {
            let Some(previous) = out.state.last_point() else {
                out.state = UnitCounterState {
                    last_timestamp: Some(current.timestamp),
                    last_value: Some(current.value),
                    window_start: Some(current.timestamp),
                };
                continue;
            };

            if current.timestamp <= previous.timestamp {
                out.already_consumed += 1;
                continue;
            }

            let (energy, reset) = match current.value.increase_since(previous.value) {
                Some(energy) => (energy, false),
                None => {
                    let energy = current.value.since_zero();
                    if energy > self.ceiling {
                        out.warnings.push(DataQualityWarning::ImplausibleReset {
                            timestamp: current.timestamp.to_rfc3339(),
                            previous: previous.value.get(),
                            value: current.value.get(),
                            ceiling: self.ceiling.get(),
                        });
                        continue;
                    }
                    (energy, true)
                }
            };

            out.deltas.push(IntervalDelta {
                unit: unit.to_string(),
                interval_start: previous.timestamp,
                interval_end: current.timestamp,
                energy_wh: energy,
                reset,
            });
            out.state.last_timestamp = Some(current.timestamp);
            out.state.last_value = Some(current.value);
            if reset {
                out.state.window_start = Some(previous.timestamp);
            }
        }

        out
    }
}
