use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::iter::Sum;
use std::ops::Add;

/// A running counter reading in watt-hours.
///
/// There is deliberately no `Add` for this type: two cumulative readings never
/// sum to anything meaningful. The only way to get energy out of them is
/// [`CumulativeWh::increase_since`].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct CumulativeWh(f64);

impl CumulativeWh {
    /// Returns `None` unless `value` is finite and non-negative.
    pub fn new(value: f64) -> Option<Self> {
        non_negative(value).map(Self)
    }

    pub fn get(self) -> f64 {
        self.0
    }

    /// Energy accumulated between `earlier` and `self`, or `None` if the counter went down.
    pub fn increase_since(self, earlier: CumulativeWh) -> Option<IncrementalWh> {
        (self.0 >= earlier.0).then(|| IncrementalWh(self.0 - earlier.0))
    }

    /// Everything this counter accumulated since it last started from zero.
    pub fn since_zero(self) -> IncrementalWh {
        IncrementalWh(self.0)
    }
}

impl fmt::Display for CumulativeWh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Energy consumed within one interval, never negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct IncrementalWh(f64);

impl IncrementalWh {
    pub const ZERO: IncrementalWh = IncrementalWh(0.0);

    pub fn new(value: f64) -> Option<Self> {
        non_negative(value).map(Self)
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl Add for IncrementalWh {
    type Output = IncrementalWh;

    fn add(self, rhs: Self) -> Self::Output {
        IncrementalWh(self.0 + rhs.0)
    }
}

impl Sum for IncrementalWh {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(IncrementalWh::ZERO, Add::add)
    }
}

impl fmt::Display for IncrementalWh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Adding +0.0 folds -0.0 into +0.0, so the stored sign bit is always clear.
fn non_negative(value: f64) -> Option<f64> {
    (value.is_finite() && value >= 0.0).then_some(value + 0.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryPoint {
    pub timestamp: DateTime<Utc>,
    pub value: CumulativeWh,
}

impl TelemetryPoint {
    pub fn new(timestamp: DateTime<Utc>, value: CumulativeWh) -> Self {
        Self { timestamp, value }
    }
}

/// Bridging memory for one unit between polls. `Default` is the cold state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UnitCounterState {
    pub last_timestamp: Option<DateTime<Utc>>,
    pub last_value: Option<CumulativeWh>,
    /// Start of the counter epoch the last value belongs to.
    pub window_start: Option<DateTime<Utc>>,
}

impl UnitCounterState {
    pub fn is_cold(&self) -> bool {
        self.last_point().is_none()
    }

    pub fn last_point(&self) -> Option<TelemetryPoint> {
        match (self.last_timestamp, self.last_value) {
            (Some(timestamp), Some(value)) => Some(TelemetryPoint { timestamp, value }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntervalDelta {
    pub unit: String,
    pub interval_start: DateTime<Utc>,
    pub interval_end: DateTime<Utc>,
    pub energy_wh: IncrementalWh,
    /// Set when the delta was derived from a counter reset rather than a subtraction.
    pub reset: bool,
}
