//! KPI aggregation per company and period.
//!
//! Stateless: every snapshot is recomputed from the ledger and the assessment
//! records of the run.

pub mod aggregator;
pub mod snapshot;

pub use aggregator::{KpiAggregator, KpiInput};
pub use snapshot::{KpiSnapshot, MarginStats};
