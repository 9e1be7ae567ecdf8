use thiserror::Error;

use autofiscal_core::TaxId;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("csv writer: {0}")]
    Io(#[from] std::io::Error),
}

/// Run-level failures. Raised before any ledger work, or when a worker dies.
/// Report export has its own [`ExportError`].
#[derive(Debug, Error)]
pub enum RunError {
    #[error("no companies requested")]
    NoCompanies,

    #[error("missing configuration for company {0}")]
    MissingCompanyConfig(TaxId),

    #[error("{stage} worker panicked")]
    WorkerPanicked { stage: &'static str },
}
