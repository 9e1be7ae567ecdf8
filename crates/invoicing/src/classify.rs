//! Direction of a document relative to one company.

use serde::Serialize;

use autofiscal_config::CompanyConfig;

use crate::document::NfeDocument;

/// Stock direction of an invoice from the company's point of view.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
    /// Between two establishments of the same company; stock does not move.
    Internal,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Classification {
    /// `self_issued` flags an entry CFOP on a document the company issued
    /// itself, which usually means an issuance mistake.
    Inbound { self_issued: bool },
    Outbound,
    /// Exit CFOP from one own establishment to another.
    Internal,
    /// Neither side of the document belongs to the company.
    Unrelated,
}

impl Classification {
    pub fn direction(self) -> Option<Direction> {
        match self {
            Classification::Inbound { .. } => Some(Direction::Inbound),
            Classification::Outbound => Some(Direction::Outbound),
            Classification::Internal => Some(Direction::Internal),
            Classification::Unrelated => None,
        }
    }
}

fn is_entry_cfop(cfop: &str) -> bool {
    matches!(cfop.as_bytes().first(), Some(b'1' | b'2' | b'3'))
}

fn is_exit_cfop(cfop: &str) -> bool {
    matches!(cfop.as_bytes().first(), Some(b'5' | b'6' | b'7'))
}

/// Classify by parties first, then by the leading item's CFOP.
pub fn classify(document: &NfeDocument, company: &CompanyConfig) -> Classification {
    let cfop = document.leading_cfop().unwrap_or_default();
    let issued_by_company = company.is_own(&document.issuer);
    let received_by_company = document
        .recipient
        .as_ref()
        .is_some_and(|r| company.is_own(r));

    if received_by_company && issued_by_company && is_exit_cfop(cfop) {
        Classification::Internal
    } else if received_by_company {
        Classification::Inbound {
            self_issued: issued_by_company && is_entry_cfop(cfop),
        }
    } else if issued_by_company && is_exit_cfop(cfop) {
        Classification::Outbound
    } else if issued_by_company && is_entry_cfop(cfop) {
        Classification::Inbound { self_issued: true }
    } else {
        Classification::Unrelated
    }
}
