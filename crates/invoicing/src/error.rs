use thiserror::Error;

/// Why a document could not become an invoice.
///
/// Both variants are per-document failures: callers record them as diagnostics
/// and keep processing the remaining documents.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// Unparseable XML, or a required node is missing or invalid.
    #[error("malformed document {source_label}: {reason}")]
    MalformedDocument { source_label: String, reason: String },

    /// Well-formed XML that is not a model-55 NFe.
    #[error("unsupported document {source_label}: {reason}")]
    UnsupportedDocumentType { source_label: String, reason: String },
}

impl IngestError {
    pub fn malformed(source_label: &str, reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            source_label: source_label.to_string(),
            reason: reason.into(),
        }
    }

    pub fn unsupported(source_label: &str, reason: impl Into<String>) -> Self {
        Self::UnsupportedDocumentType {
            source_label: source_label.to_string(),
            reason: reason.into(),
        }
    }

    pub fn source_label(&self) -> &str {
        match self {
            IngestError::MalformedDocument { source_label, .. }
            | IngestError::UnsupportedDocumentType { source_label, .. } => source_label,
        }
    }
}
