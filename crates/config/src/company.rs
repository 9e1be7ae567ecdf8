//! Per-company analysis configuration.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use autofiscal_core::{TaxId, TaxIdKind};

use crate::regime::TaxRegime;

pub const DEFAULT_STALE_INVENTORY_DAYS: u32 = 180;

fn default_stale_inventory_days() -> u32 {
    DEFAULT_STALE_INVENTORY_DAYS
}

fn default_mismatch_tolerance() -> Decimal {
    Decimal::ONE
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse company configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration for company {company}: {reason}")]
    Invalid { company: String, reason: String },

    #[error("company {0} is configured more than once")]
    DuplicateCompany(TaxId),
}

impl ConfigError {
    fn invalid(company: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            company: company.to_string(),
            reason: reason.into(),
        }
    }
}

/// Immutable configuration of one dealership.
///
/// Validated once at load time; every stage receives it by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyConfig {
    pub cnpj: TaxId,
    pub name: String,
    /// Other establishments (branches) whose documents belong to this company.
    #[serde(default)]
    pub establishments: Vec<TaxId>,
    #[serde(default)]
    pub regime: TaxRegime,
    /// Days in stock after which a vehicle is reported as stuck inventory.
    #[serde(default = "default_stale_inventory_days")]
    pub stale_inventory_days: u32,
    /// Largest accepted absolute difference between declared and expected tax.
    #[serde(default = "default_mismatch_tolerance")]
    pub mismatch_tolerance: Decimal,
}

impl CompanyConfig {
    pub fn new(cnpj: TaxId, name: impl Into<String>, regime: TaxRegime) -> Self {
        Self {
            cnpj,
            name: name.into(),
            establishments: Vec::new(),
            regime,
            stale_inventory_days: DEFAULT_STALE_INVENTORY_DAYS,
            mismatch_tolerance: default_mismatch_tolerance(),
        }
    }

    pub fn with_establishment(mut self, cnpj: TaxId) -> Self {
        self.establishments.push(cnpj);
        self
    }

    pub fn with_stale_inventory_days(mut self, days: u32) -> Self {
        self.stale_inventory_days = days;
        self
    }

    pub fn with_mismatch_tolerance(mut self, tolerance: Decimal) -> Self {
        self.mismatch_tolerance = tolerance;
        self
    }

    /// Parse and validate a single company record.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: CompanyConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Whether `id` is one of this company's establishments.
    pub fn is_own(&self, id: &TaxId) -> bool {
        self.cnpj == *id || self.establishments.contains(id)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let company = self.cnpj.as_str();

        if self.cnpj.kind() != TaxIdKind::Cnpj {
            return Err(ConfigError::invalid(company, "company id must be a CNPJ"));
        }
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid(company, "name cannot be empty"));
        }
        if let Some(e) = self.establishments.iter().find(|e| e.kind() != TaxIdKind::Cnpj) {
            return Err(ConfigError::invalid(
                company,
                format!("establishment {e} is not a CNPJ"),
            ));
        }
        if self.mismatch_tolerance < Decimal::ZERO {
            return Err(ConfigError::invalid(company, "mismatch tolerance cannot be negative"));
        }

        let mut seen: BTreeMap<&str, _> = BTreeMap::new();
        for (kind, codes) in self.regime.cfops.classes() {
            for code in codes {
                if !is_cfop(code) || !matches!(code.as_bytes()[0], b'5' | b'6' | b'7') {
                    return Err(ConfigError::invalid(
                        company,
                        format!("{code:?} is not an outbound CFOP"),
                    ));
                }
                if let Some(previous) = seen.insert(code.as_str(), kind) {
                    return Err(ConfigError::invalid(
                        company,
                        format!("CFOP {code} is classified as both {previous:?} and {kind:?}"),
                    ));
                }
            }
        }

        let fraction = Decimal::ZERO..=Decimal::ONE;
        for rule in &self.regime.rules {
            let reason = if rule.cfops.is_empty() {
                Some("has no CFOPs".to_string())
            } else if let Some(code) = rule.cfops.iter().find(|c| !is_cfop(c)) {
                Some(format!("lists invalid CFOP {code:?}"))
            } else if rule.mva < Decimal::ZERO || rule.mva > max_mva() {
                Some(format!("has an MVA outside [0, {}]", max_mva()))
            } else if !fraction.contains(&rule.rate)
                || !rule.own_rate.is_none_or(|r| fraction.contains(&r))
            {
                Some("has a rate outside [0, 1]".to_string())
            } else if rule.base_reduction < Decimal::ZERO || rule.base_reduction >= Decimal::ONE {
                Some("has a base reduction outside [0, 1)".to_string())
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(ConfigError::invalid(
                    company,
                    format!("tax rule {:?} {reason}", rule.name),
                ));
            }
        }

        let rates = &self.regime.presumed_profit;
        let fractions = [
            ("icms", rates.icms),
            ("pis_cofins", rates.pis_cofins),
            ("irpj_csll_base", rates.irpj_csll_base),
            ("irpj", rates.irpj),
            ("csll", rates.csll),
            ("irpj_surcharge", rates.irpj_surcharge),
        ];
        if let Some((name, _)) = fractions.iter().find(|(_, r)| !fraction.contains(r)) {
            return Err(ConfigError::invalid(
                company,
                format!("presumed-profit rate {name} is outside [0, 1]"),
            ));
        }
        if rates.surcharge_threshold < Decimal::ZERO {
            return Err(ConfigError::invalid(company, "surcharge threshold cannot be negative"));
        }

        Ok(())
    }
}

/// Markup ceiling (1000%); keeps recomputed ST values far inside the decimal range.
fn max_mva() -> Decimal {
    Decimal::TEN
}

fn is_cfop(code: &str) -> bool {
    code.len() == 4 && code.bytes().all(|b| b.is_ascii_digit())
}

/// Validated set of company configurations, keyed by CNPJ.
#[derive(Debug, Clone, Default)]
pub struct CompanyDirectory {
    companies: BTreeMap<TaxId, CompanyConfig>,
}

impl CompanyDirectory {
    pub fn new(configs: impl IntoIterator<Item = CompanyConfig>) -> Result<Self, ConfigError> {
        let mut companies = BTreeMap::new();
        for config in configs {
            config.validate()?;
            if companies.contains_key(&config.cnpj) {
                return Err(ConfigError::DuplicateCompany(config.cnpj));
            }
            companies.insert(config.cnpj.clone(), config);
        }
        Ok(Self { companies })
    }

    pub fn get(&self, cnpj: &TaxId) -> Option<&CompanyConfig> {
        self.companies.get(cnpj)
    }

    pub fn cnpjs(&self) -> BTreeSet<TaxId> {
        self.companies.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.companies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.companies.is_empty()
    }
}

/// Parse a JSON array of company records (the `empresas_config.json` shape).
pub fn load_companies(json: &str) -> Result<CompanyDirectory, ConfigError> {
    let configs: Vec<CompanyConfig> = serde_json::from_str(json)?;
    let directory = CompanyDirectory::new(configs)?;
    tracing::info!(companies = directory.len(), "company configuration loaded");
    Ok(directory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::TaxRule;
    use rust_decimal_macros::dec;

    const ALPHA: &str = r#"{
        "cnpj": "11.111.111/0001-11",
        "name": "Alpha",
        "regime": {
            "rules": [
                { "name": "vehicles", "cfops": ["5102", "5405"], "mva": "0.30", "rate": "0.18" }
            ]
        }
    }"#;

    #[test]
    fn loads_defaults_for_omitted_fields() {
        let config = CompanyConfig::from_json(ALPHA).unwrap();
        assert_eq!(config.cnpj.as_str(), "11111111000111");
        assert_eq!(config.stale_inventory_days, DEFAULT_STALE_INVENTORY_DAYS);
        assert_eq!(config.mismatch_tolerance, dec!(1));
        assert_eq!(config.regime.rules.len(), 1);
        assert_eq!(config.regime.rules[0].mva, dec!(0.30));
        assert!(config.regime.cfops.sale.contains("5102"));
    }

    #[test]
    fn rejects_cpf_as_company_id() {
        let json = ALPHA.replace("11.111.111/0001-11", "123.456.789-09");
        let err = CompanyConfig::from_json(&json).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { reason, .. } if reason.contains("CNPJ")));
    }

    #[test]
    fn rejects_rate_above_one() {
        let cnpj = TaxId::parse("11111111000111").unwrap();
        let regime = TaxRegime::default().with_rule(TaxRule::new("bad", &["5102"], dec!(0.3), dec!(18)));
        let err = CompanyConfig::new(cnpj, "Alpha", regime).validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { reason, .. } if reason.contains("rate")));
    }

    #[test]
    fn rejects_unbounded_markup_and_presumed_rates() {
        let cnpj = TaxId::parse("11111111000111").unwrap();
        let regime = TaxRegime::default().with_rule(TaxRule::new("v", &["5405"], dec!(10.01), dec!(0.18)));
        let err = CompanyConfig::new(cnpj.clone(), "Alpha", regime).validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { reason, .. } if reason.contains("MVA")));

        let mut regime = TaxRegime::default();
        regime.presumed_profit.irpj = dec!(15);
        let err = CompanyConfig::new(cnpj, "Alpha", regime).validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { reason, .. } if reason.contains("irpj")));
    }

    #[test]
    fn rejects_cfop_in_two_classes() {
        let cnpj = TaxId::parse("11111111000111").unwrap();
        let mut regime = TaxRegime::default();
        regime.cfops.transfer.insert("5102".to_string());
        let err = CompanyConfig::new(cnpj, "Alpha", regime).validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { reason, .. } if reason.contains("5102")));
    }

    #[test]
    fn directory_rejects_duplicate_companies() {
        let json = format!("[{ALPHA}, {ALPHA}]");
        let err = load_companies(&json).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateCompany(_)));
    }

    #[test]
    fn establishments_count_as_own() {
        let cnpj = TaxId::parse("11111111000111").unwrap();
        let branch = TaxId::parse("11111111000200").unwrap();
        let config = CompanyConfig::new(cnpj.clone(), "Alpha", TaxRegime::default())
            .with_establishment(branch.clone());
        assert!(config.is_own(&cnpj));
        assert!(config.is_own(&branch));
        assert!(!config.is_own(&TaxId::parse("22222222000122").unwrap()));
    }
}
