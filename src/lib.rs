pub mod config;
pub mod error;
pub mod ingest;
pub mod normalize;
pub mod point;
pub mod reconcile;
pub mod response;
pub mod state;

pub use config::Config;
pub use error::{AppError, DataQualityWarning, Result};
pub use ingest::{Ingestor, ReconcileOutcome};
pub use point::{CumulativeWh, IncrementalWh, IntervalDelta, TelemetryPoint, UnitCounterState};
pub use reconcile::{Reconciler, Reconciliation};
pub use state::StateStore;
