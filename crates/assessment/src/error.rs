use serde::Serialize;
use thiserror::Error;

use autofiscal_core::{AccessKey, Chassis};

/// Per-item assessment failure. The remaining items are still assessed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum AssessmentError {
    #[error("no ICMS-ST rule for CFOP {cfop} (NCM {ncm:?}) on {access_key}, chassis {chassis}")]
    UnknownTaxRule {
        access_key: AccessKey,
        chassis: Chassis,
        cfop: String,
        ncm: Option<String>,
    },

    #[error("ICMS-ST for CFOP {cfop} on {access_key}, chassis {chassis} exceeds the decimal range")]
    ArithmeticOverflow {
        access_key: AccessKey,
        chassis: Chassis,
        cfop: String,
    },
}

impl AssessmentError {
    pub fn access_key(&self) -> &AccessKey {
        match self {
            Self::UnknownTaxRule { access_key, .. } | Self::ArithmeticOverflow { access_key, .. } => access_key,
        }
    }

    pub fn chassis(&self) -> &Chassis {
        match self {
            Self::UnknownTaxRule { chassis, .. } | Self::ArithmeticOverflow { chassis, .. } => chassis,
        }
    }
}
