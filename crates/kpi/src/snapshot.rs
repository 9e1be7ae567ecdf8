use rust_decimal::Decimal;
use serde::Serialize;

use autofiscal_core::{Period, TaxId};

/// Gross margin statistics over the vehicles sold in a period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MarginStats {
    pub total: Decimal,
    pub average: Option<Decimal>,
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
}

impl MarginStats {
    pub(crate) fn from_margins(margins: &[Decimal]) -> Self {
        let total: Decimal = margins.iter().copied().sum();
        let average = (!margins.is_empty())
            .then(|| (total / Decimal::from(margins.len())).round_dp(2));
        Self {
            total,
            average,
            min: margins.iter().copied().min(),
            max: margins.iter().copied().max(),
        }
    }
}

/// Summary metrics of one company over one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KpiSnapshot {
    pub company: TaxId,
    pub period: Period,

    pub vehicles_acquired: usize,
    pub vehicles_sold: usize,
    pub vehicles_returned: usize,
    pub vehicles_transferred: usize,

    /// Vehicles in stock at the end of the day before the period starts.
    pub opening_stock: usize,
    /// Vehicles in stock at the end of the period's last day.
    pub ending_stock: usize,
    pub ending_stock_value: Decimal,
    pub average_stock: Decimal,
    /// Sold divided by average stock; `None` when the average is zero.
    pub inventory_turnover: Option<Decimal>,
    /// Over every holding that left stock in the period, whatever the reason.
    pub average_days_in_stock: Option<Decimal>,

    pub acquisitions_total: Decimal,
    pub sales_revenue: Decimal,
    pub gross_margin: MarginStats,

    /// Own ICMS declared on the period's sales.
    pub icms_debit: Decimal,
    /// Own ICMS declared on the acquisitions of the vehicles sold.
    pub icms_credit: Decimal,
    pub icms_balance: Decimal,
    /// Gross margin minus the ICMS balance.
    pub net_profit: Decimal,

    pub assessed_records: usize,
    /// Exact sum of the expected ICMS-ST of the period's assessment records.
    pub total_assessed_liability: Decimal,
}
