use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use autofiscal_core::{Granularity, Period};

use crate::icms_st::TaxAssessmentRecord;

/// Exact (unrounded) sums of the assessment records issued in one period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssessmentTotals {
    pub records: usize,
    pub st_base: Decimal,
    pub expected_st: Decimal,
    pub declared_st: Decimal,
    pub delta: Decimal,
}

impl AssessmentTotals {
    pub fn add(&mut self, record: &TaxAssessmentRecord) {
        self.records += 1;
        self.st_base += record.st_base;
        self.expected_st += record.expected_st;
        self.declared_st += record.declared_st.unwrap_or_default();
        self.delta += record.delta;
    }
}

/// Group records by the period of their issue date.
pub fn period_totals(
    records: &[TaxAssessmentRecord],
    granularity: Granularity,
) -> BTreeMap<Period, AssessmentTotals> {
    let mut totals: BTreeMap<Period, AssessmentTotals> = BTreeMap::new();
    for record in records {
        totals
            .entry(Period::containing(record.issued_on, granularity))
            .or_default()
            .add(record);
    }
    totals
}
