//! Per-document and per-item problems attached to the run output.

use serde::Serialize;

use autofiscal_assessment::AssessmentError;
use autofiscal_core::{AccessKey, Chassis};
use autofiscal_invoicing::{DuplicateDocument, IngestError};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DiagnosticKind {
    MalformedDocument,
    UnsupportedDocumentType,
    DuplicateDocument,
    /// The document concerns none of the requested companies.
    UnrelatedDocument,
    /// Entry CFOP on a document the company issued itself.
    SelfIssuedInbound,
    UnknownTaxRule,
    /// Recomputed ICMS-ST left the decimal range; the item is not assessed.
    ArithmeticOverflow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub source_label: String,
    pub access_key: Option<AccessKey>,
    pub chassis: Option<Chassis>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, source_label: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            source_label: source_label.into(),
            access_key: None,
            chassis: None,
            message: message.into(),
        }
    }

    pub fn with_access_key(mut self, key: AccessKey) -> Self {
        self.access_key = Some(key);
        self
    }

    pub fn with_chassis(mut self, chassis: Chassis) -> Self {
        self.chassis = Some(chassis);
        self
    }
}

impl From<&IngestError> for Diagnostic {
    fn from(err: &IngestError) -> Self {
        let kind = match err {
            IngestError::MalformedDocument { .. } => DiagnosticKind::MalformedDocument,
            IngestError::UnsupportedDocumentType { .. } => DiagnosticKind::UnsupportedDocumentType,
        };
        Diagnostic::new(kind, err.source_label(), err.to_string())
    }
}

impl From<DuplicateDocument> for Diagnostic {
    fn from(dup: DuplicateDocument) -> Self {
        let message = format!(
            "access key {} already read from {}; copy discarded",
            dup.access_key, dup.kept_source_label
        );
        Diagnostic::new(DiagnosticKind::DuplicateDocument, dup.source_label, message)
            .with_access_key(dup.access_key)
    }
}

impl Diagnostic {
    pub(crate) fn from_assessment(err: &AssessmentError, source_label: &str) -> Self {
        let kind = match err {
            AssessmentError::UnknownTaxRule { .. } => DiagnosticKind::UnknownTaxRule,
            AssessmentError::ArithmeticOverflow { .. } => DiagnosticKind::ArithmeticOverflow,
        };
        Diagnostic::new(kind, source_label, err.to_string())
            .with_access_key(err.access_key().clone())
            .with_chassis(err.chassis().clone())
    }
}
