//! Audit & reconciliation engine.
//!
//! Turns ledger anomalies, stock age and tax gaps into ordered, immutable
//! findings. Never mutates ledger state.

pub mod engine;
pub mod finding;

pub use engine::AuditEngine;
pub use finding::{AuditFinding, FindingKind, Severity};
