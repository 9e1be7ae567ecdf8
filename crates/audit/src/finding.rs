use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value as JsonValue;

use autofiscal_core::{AccessKey, Chassis};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FindingKind {
    OrphanSale,
    DuplicateSale,
    DuplicateAcquisition,
    InvalidTransition,
    MissingCounterpartInvoice,
    TaxValueMismatch,
    StuckInventory,
}

impl FindingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FindingKind::OrphanSale => "OrphanSale",
            FindingKind::DuplicateSale => "DuplicateSale",
            FindingKind::DuplicateAcquisition => "DuplicateAcquisition",
            FindingKind::InvalidTransition => "InvalidTransition",
            FindingKind::MissingCounterpartInvoice => "MissingCounterpartInvoice",
            FindingKind::TaxValueMismatch => "TaxValueMismatch",
            FindingKind::StuckInventory => "StuckInventory",
        }
    }
}

impl core::fmt::Display for FindingKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// An inconsistency detected in a company's dataset.
///
/// Findings are data, not errors: they never stop a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditFinding {
    pub kind: FindingKind,
    pub severity: Severity,
    pub chassis: Chassis,
    /// Offending documents, earliest first.
    pub access_keys: Vec<AccessKey>,
    /// Issue date of the offending document (`as_of` for stuck inventory).
    pub occurred_on: NaiveDate,
    pub message: String,
    /// Kind-specific figures (amounts, states, day counts).
    pub details: JsonValue,
    /// Position in the chassis' ledger log; orders findings within a chassis.
    #[serde(skip)]
    pub(crate) order: u32,
}
