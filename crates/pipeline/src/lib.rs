//! `autofiscal-pipeline`: batch runs over raw NFe documents.
//!
//! Ingestor → ledger builder → {audit engine, assessment} → KPI aggregator,
//! for every requested company, producing serializable report payloads.

pub mod diagnostics;
pub mod error;
pub mod report;
pub mod run;
pub mod tabular;

pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use error::{ExportError, RunError};
pub use report::{CompanyReport, InventoryRow, RunReport, inventory_rows};
pub use run::{RunOptions, SourceDocument, run};
pub use tabular::{TabularReport, TabularRow, to_csv_string, write_csv};
