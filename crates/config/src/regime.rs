//! Tax-regime parameters: CFOP operation classes, ICMS-ST rules and
//! presumed-profit rates.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use autofiscal_core::RoundingMode;

/// Lifecycle meaning of an outbound CFOP.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Sale,
    ReturnToSupplier,
    Transfer,
}

const DEFAULT_SALE_CFOPS: &[&str] = &[
    "5101", "5102", "5103", "5104", "5105", "5106", "5401", "5403", "5405", "6101", "6102", "6103",
    "6104", "6105", "6106", "6107", "6108", "6401", "6403", "6404", "7101", "7102",
];

const DEFAULT_RETURN_CFOPS: &[&str] = &[
    "5201", "5202", "5410", "5411", "6201", "6202", "6410", "6411", "7201", "7202",
];

const DEFAULT_TRANSFER_CFOPS: &[&str] = &[
    "5151", "5152", "5408", "5409", "6151", "6152", "6408", "6409",
];

/// Outbound CFOP classification table.
///
/// Inbound items are always acquisitions; only outbound CFOPs need a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfopTable {
    pub sale: BTreeSet<String>,
    pub return_to_supplier: BTreeSet<String>,
    pub transfer: BTreeSet<String>,
}

fn to_set(codes: &[&str]) -> BTreeSet<String> {
    codes.iter().map(|c| (*c).to_string()).collect()
}

impl Default for CfopTable {
    fn default() -> Self {
        Self {
            sale: to_set(DEFAULT_SALE_CFOPS),
            return_to_supplier: to_set(DEFAULT_RETURN_CFOPS),
            transfer: to_set(DEFAULT_TRANSFER_CFOPS),
        }
    }
}

impl CfopTable {
    pub fn classify(&self, cfop: &str) -> Option<OperationKind> {
        if self.sale.contains(cfop) {
            Some(OperationKind::Sale)
        } else if self.return_to_supplier.contains(cfop) {
            Some(OperationKind::ReturnToSupplier)
        } else if self.transfer.contains(cfop) {
            Some(OperationKind::Transfer)
        } else {
            None
        }
    }

    pub(crate) fn classes(&self) -> [(OperationKind, &BTreeSet<String>); 3] {
        [
            (OperationKind::Sale, &self.sale),
            (OperationKind::ReturnToSupplier, &self.return_to_supplier),
            (OperationKind::Transfer, &self.transfer),
        ]
    }
}

/// One ICMS-ST rule of the rate table.
///
/// A rule applies to sale items whose CFOP is listed and, when `ncm_prefix` is
/// set, whose NCM code starts with it (product category).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRule {
    pub name: String,
    pub cfops: BTreeSet<String>,
    #[serde(default)]
    pub ncm_prefix: Option<String>,
    /// Margin of value added, as a fraction (0.30 = 30%).
    pub mva: Decimal,
    /// Internal ICMS rate applied to the ST base, as a fraction.
    pub rate: Decimal,
    /// Rate of the own operation, used when the item carries no declared ICMS.
    /// Defaults to `rate`.
    #[serde(default)]
    pub own_rate: Option<Decimal>,
    /// Fraction of the ST base that is exempt (0 = no reduction).
    #[serde(default)]
    pub base_reduction: Decimal,
}

impl TaxRule {
    pub fn new(name: impl Into<String>, cfops: &[&str], mva: Decimal, rate: Decimal) -> Self {
        Self {
            name: name.into(),
            cfops: to_set(cfops),
            ncm_prefix: None,
            mva,
            rate,
            own_rate: None,
            base_reduction: Decimal::ZERO,
        }
    }

    pub fn with_ncm_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.ncm_prefix = Some(prefix.into());
        self
    }

    pub fn with_own_rate(mut self, own_rate: Decimal) -> Self {
        self.own_rate = Some(own_rate);
        self
    }

    pub fn with_base_reduction(mut self, reduction: Decimal) -> Self {
        self.base_reduction = reduction;
        self
    }

    pub fn effective_own_rate(&self) -> Decimal {
        self.own_rate.unwrap_or(self.rate)
    }

    fn matches(&self, cfop: &str, ncm: Option<&str>) -> bool {
        if !self.cfops.contains(cfop) {
            return false;
        }
        match (&self.ncm_prefix, ncm) {
            (None, _) => true,
            (Some(prefix), Some(ncm)) => ncm.starts_with(prefix.as_str()),
            (Some(_), None) => false,
        }
    }
}

/// Presumed-profit ("lucro presumido") rates applied to the quarterly margin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresumedProfitRates {
    pub icms: Decimal,
    pub pis_cofins: Decimal,
    pub irpj_csll_base: Decimal,
    pub irpj: Decimal,
    pub csll: Decimal,
    pub irpj_surcharge: Decimal,
    /// Quarterly IRPJ/CSLL base above which the surcharge applies.
    pub surcharge_threshold: Decimal,
}

impl Default for PresumedProfitRates {
    fn default() -> Self {
        Self {
            icms: Decimal::new(19, 2),
            pis_cofins: Decimal::new(365, 4),
            irpj_csll_base: Decimal::new(32, 2),
            irpj: Decimal::new(15, 2),
            csll: Decimal::new(9, 2),
            irpj_surcharge: Decimal::new(10, 2),
            surcharge_threshold: Decimal::new(60_000, 0),
        }
    }
}

/// Company-specific tax regime.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaxRegime {
    #[serde(default)]
    pub rules: Vec<TaxRule>,
    #[serde(default)]
    pub rounding: RoundingMode,
    #[serde(default)]
    pub cfops: CfopTable,
    #[serde(default)]
    pub presumed_profit: PresumedProfitRates,
}

impl TaxRegime {
    pub fn with_rule(mut self, rule: TaxRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_rounding(mut self, rounding: RoundingMode) -> Self {
        self.rounding = rounding;
        self
    }

    /// The rule for a sale item: longest matching NCM prefix wins, then rule order.
    pub fn rule_for(&self, cfop: &str, ncm: Option<&str>) -> Option<&TaxRule> {
        let mut best: Option<&TaxRule> = None;
        for rule in self.rules.iter().filter(|r| r.matches(cfop, ncm)) {
            let specificity = rule.ncm_prefix.as_ref().map_or(0, String::len);
            let current = best.map_or(-1, |b| b.ncm_prefix.as_ref().map_or(0, String::len) as i64);
            if specificity as i64 > current {
                best = Some(rule);
            }
        }
        best
    }
}
