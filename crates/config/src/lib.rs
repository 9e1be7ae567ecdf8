//! Company configuration: strongly-typed, validated tax-regime parameters.
//!
//! Loading the file itself belongs to the caller; this crate only turns the
//! JSON text into an immutable, validated record.

pub mod company;
pub mod regime;

pub use company::{CompanyConfig, CompanyDirectory, ConfigError, load_companies};
pub use regime::{CfopTable, OperationKind, PresumedProfitRates, TaxRegime, TaxRule};
