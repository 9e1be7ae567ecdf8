//! Vehicle inventory: the per-chassis lifecycle aggregate and the ledger
//! builder that replays a company's invoices through it.
//!
//! Deterministic domain logic only (no IO).

pub mod ledger;
pub mod vehicle;

pub use ledger::{LedgerBuilder, LedgerEntry, MovementOutcome, VehicleLedger};
pub use vehicle::{
    Acquire, Acquired, DeclaredTaxes, Disposal, Dispose, Disposed, Holding, TaxTotals,
    TransitionAnomaly, Vehicle, VehicleCommand, VehicleEvent, VehicleState,
};
