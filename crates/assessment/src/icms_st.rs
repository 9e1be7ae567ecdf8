//! ICMS-ST (tax substitution) recomputation for sale items.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use autofiscal_config::{CompanyConfig, OperationKind, TaxRegime};
use autofiscal_core::{AccessKey, Chassis, round_currency};
use autofiscal_invoicing::{Direction, InvoiceItem, InvoiceSet};

use crate::error::AssessmentError;

/// Expected versus declared ICMS-ST for one sale item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxAssessmentRecord {
    pub chassis: Chassis,
    pub access_key: AccessKey,
    pub issued_on: NaiveDate,
    pub cfop: String,
    pub ncm: Option<String>,
    /// Name of the rule that matched.
    pub rule: String,
    pub sale_value: Decimal,
    pub st_base: Decimal,
    /// ST base times the internal rate, before the own-operation credit.
    pub gross_icms: Decimal,
    pub own_icms: Decimal,
    /// Whether `own_icms` was taken from the document or estimated.
    pub own_icms_declared: bool,
    pub expected_st: Decimal,
    /// `None` when the document carries no `vICMSST`.
    pub declared_st: Option<Decimal>,
    /// `expected_st - declared_st` (a missing declaration counts as zero).
    pub delta: Decimal,
}

/// Applies a company's rate table to sale items.
#[derive(Debug, Clone, Copy)]
pub struct IcmsStCalculator<'a> {
    regime: &'a TaxRegime,
}

impl<'a> IcmsStCalculator<'a> {
    pub fn new(regime: &'a TaxRegime) -> Self {
        Self { regime }
    }

    pub fn assess(
        &self,
        chassis: &Chassis,
        access_key: &AccessKey,
        issued_on: NaiveDate,
        item: &InvoiceItem,
    ) -> Result<TaxAssessmentRecord, AssessmentError> {
        let rule = self
            .regime
            .rule_for(&item.cfop, item.ncm.as_deref())
            .ok_or_else(|| AssessmentError::UnknownTaxRule {
                access_key: access_key.clone(),
                chassis: chassis.clone(),
                cfop: item.cfop.clone(),
                ncm: item.ncm.clone(),
            })?;
        let round = |v: Decimal| round_currency(v, self.regime.rounding);
        let overflow = || AssessmentError::ArithmeticOverflow {
            access_key: access_key.clone(),
            chassis: chassis.clone(),
            cfop: item.cfop.clone(),
        };

        let value = item.value;
        let st_base = Decimal::ONE
            .checked_add(rule.mva)
            .and_then(|markup| value.checked_mul(markup))
            .and_then(|v| Decimal::ONE.checked_sub(rule.base_reduction).and_then(|kept| v.checked_mul(kept)))
            .map(round)
            .ok_or_else(overflow)?;
        let gross_icms = st_base.checked_mul(rule.rate).map(round).ok_or_else(overflow)?;
        let (own_icms, own_icms_declared) = match item.taxes.icms_value {
            Some(declared) => (declared, true),
            None => (
                value
                    .checked_mul(rule.effective_own_rate())
                    .map(round)
                    .ok_or_else(overflow)?,
                false,
            ),
        };
        let expected_st = gross_icms
            .checked_sub(own_icms)
            .ok_or_else(overflow)?
            .max(Decimal::ZERO);
        let declared_st = item.taxes.st_value;
        let delta = expected_st
            .checked_sub(declared_st.unwrap_or_default())
            .ok_or_else(overflow)?;

        Ok(TaxAssessmentRecord {
            chassis: chassis.clone(),
            access_key: access_key.clone(),
            issued_on,
            cfop: item.cfop.clone(),
            ncm: item.ncm.clone(),
            rule: rule.name.clone(),
            sale_value: value,
            st_base,
            gross_icms,
            own_icms,
            own_icms_declared,
            expected_st,
            declared_st,
            delta,
        })
    }
}

/// Result of assessing every sale item of a company.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaleAssessment {
    /// Sorted by chassis, then issue date, then access key.
    pub records: Vec<TaxAssessmentRecord>,
    pub errors: Vec<AssessmentError>,
}

/// Assess every outbound vehicle item whose CFOP is a sale, whether or not the
/// ledger accepted the sale: the tax is due on the issued document.
pub fn assess_sales(company: &CompanyConfig, invoices: &InvoiceSet) -> SaleAssessment {
    let calculator = IcmsStCalculator::new(&company.regime);
    let mut out = SaleAssessment::default();

    for invoice in invoices.iter().filter(|i| i.direction == Direction::Outbound) {
        for (chassis, item) in invoice.vehicle_items() {
            if company.regime.cfops.classify(&item.cfop) != Some(OperationKind::Sale) {
                continue;
            }
            match calculator.assess(chassis, &invoice.access_key, invoice.issue_date(), item) {
                Ok(record) => out.records.push(record),
                Err(err) => {
                    tracing::warn!(company = %company.cnpj, error = %err, "sale item not assessed");
                    out.errors.push(err);
                }
            }
        }
    }

    out.records.sort_by(|a, b| {
        (&a.chassis, a.issued_on, &a.access_key).cmp(&(&b.chassis, b.issued_on, &b.access_key))
    });
    tracing::info!(
        company = %company.cnpj,
        records = out.records.len(),
        failed = out.errors.len(),
        "ICMS-ST assessment done"
    );
    out
}
