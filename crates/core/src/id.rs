//! Strongly-typed identifiers used across the domain.
//!
//! All identifiers are normalized on construction, so two values that compare
//! equal always denote the same company, document or vehicle.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Brazilian tax registration number (CNPJ for companies, CPF for people).
///
/// Stored as digits only; formatting characters (`.`, `/`, `-`) are dropped.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaxId(String);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaxIdKind {
    Cnpj,
    Cpf,
}

impl TaxId {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        match digits.len() {
            11 | 14 => Ok(Self(digits)),
            n => Err(DomainError::invalid_id(format!(
                "TaxId: expected 11 (CPF) or 14 (CNPJ) digits, found {n} in {raw:?}"
            ))),
        }
    }

    /// Parse and require a company registration (CNPJ).
    pub fn parse_cnpj(raw: &str) -> Result<Self, DomainError> {
        let id = Self::parse(raw)?;
        if id.kind() != TaxIdKind::Cnpj {
            return Err(DomainError::invalid_id(format!("TaxId: {raw:?} is not a CNPJ")));
        }
        Ok(id)
    }

    pub fn kind(&self) -> TaxIdKind {
        if self.0.len() == 14 {
            TaxIdKind::Cnpj
        } else {
            TaxIdKind::Cpf
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// NFe access key ("chave de acesso"): 44 digits, the document's global identity.
///
/// Layout: cUF(2) AAMM(4) CNPJ(14) mod(2) serie(3) nNF(9) tpEmis(1) cNF(8) cDV(1).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessKey(String);

impl AccessKey {
    pub const LEN: usize = 44;

    /// Parse a key, accepting the `NFe` prefix used by the `infNFe@Id` attribute.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        let body = trimmed.strip_prefix("NFe").unwrap_or(trimmed);
        if body.len() != Self::LEN || !body.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::invalid_id(format!(
                "AccessKey: expected {} digits, found {raw:?}",
                Self::LEN
            )));
        }
        let expected = check_digit(&body[..Self::LEN - 1]);
        let found = body.as_bytes()[Self::LEN - 1] - b'0';
        if expected != found {
            return Err(DomainError::invalid_id(format!(
                "AccessKey: check digit mismatch in {body} (expected {expected})"
            )));
        }
        Ok(Self(body.to_string()))
    }

    /// Build a key from its first 43 digits, appending the modulo-11 check digit.
    pub fn with_check_digit(body: &str) -> Result<Self, DomainError> {
        if body.len() != Self::LEN - 1 || !body.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::invalid_id(format!(
                "AccessKey: expected {} digits before the check digit, found {body:?}",
                Self::LEN - 1
            )));
        }
        Ok(Self(format!("{body}{}", check_digit(body))))
    }

    /// Document model code (`55` for NF-e, `65` for NFC-e).
    pub fn model(&self) -> &str {
        &self.0[20..22]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn check_digit(body: &str) -> u8 {
    let sum: u32 = body
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| u32::from(b - b'0') * (2 + (i as u32 % 8)))
        .sum();
    match sum % 11 {
        0 | 1 => 0,
        r => (11 - r) as u8,
    }
}

/// Vehicle identification number (chassis), the ledger's primary key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Chassis(String);

impl Chassis {
    pub const LEN: usize = 17;

    /// Strip everything but ASCII alphanumerics and uppercase the rest.
    pub fn normalize(raw: &str) -> String {
        raw.chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_uppercase())
            .collect()
    }

    /// VIN alphabet: digits and latin letters except `I`, `O` and `Q`.
    pub fn is_vin_char(c: char) -> bool {
        c.is_ascii_digit() || (c.is_ascii_uppercase() && !matches!(c, 'I' | 'O' | 'Q'))
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let normalized = Self::normalize(raw);
        if normalized.len() != Self::LEN || !normalized.chars().all(Self::is_vin_char) {
            return Err(DomainError::invalid_id(format!(
                "Chassis: {raw:?} is not a 17-character VIN"
            )));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! impl_string_newtype {
    ($t:ty) => {
        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $t {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

impl_string_newtype!(TaxId);
impl_string_newtype!(AccessKey);
impl_string_newtype!(Chassis);
