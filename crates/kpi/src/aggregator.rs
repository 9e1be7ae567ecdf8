use chrono::NaiveDate;
use rust_decimal::Decimal;

use autofiscal_assessment::TaxAssessmentRecord;
use autofiscal_config::{CompanyConfig, OperationKind};
use autofiscal_core::{Granularity, Period};
use autofiscal_inventory::{Holding, VehicleLedger};

use crate::snapshot::{KpiSnapshot, MarginStats};

/// Everything the aggregator needs about one company.
#[derive(Debug, Clone, Copy)]
pub struct KpiInput<'a> {
    pub company: &'a CompanyConfig,
    pub ledger: &'a VehicleLedger,
    pub assessments: &'a [TaxAssessmentRecord],
}

#[derive(Debug, Copy, Clone)]
pub struct KpiAggregator {
    granularity: Granularity,
}

impl KpiAggregator {
    pub fn new(granularity: Granularity) -> Self {
        Self { granularity }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Snapshots for several companies, ordered by company then period.
    pub fn aggregate_all(&self, inputs: &[KpiInput<'_>]) -> Vec<KpiSnapshot> {
        let mut out: Vec<KpiSnapshot> = inputs.iter().flat_map(|input| self.aggregate(*input)).collect();
        out.sort_by(|a, b| (&a.company, a.period).cmp(&(&b.company, b.period)));
        out
    }

    /// One snapshot per period from the first to the last dated activity,
    /// including quiet periods in between.
    pub fn aggregate(&self, input: KpiInput<'_>) -> Vec<KpiSnapshot> {
        let holdings: Vec<&Holding> = input.ledger.vehicles().flat_map(|v| v.holdings()).collect();

        let dates = holdings
            .iter()
            .flat_map(|h| [Some(h.acquired_on), h.left_on()])
            .flatten()
            .chain(input.assessments.iter().map(|r| r.issued_on));
        let (Some(first), Some(last)) = min_max(dates) else {
            return Vec::new();
        };

        let mut snapshots = Vec::new();
        let mut period = Period::containing(first, self.granularity);
        let last_period = Period::containing(last, self.granularity);
        while period <= last_period {
            snapshots.push(snapshot(input, &holdings, period));
            period = period.next();
        }

        tracing::debug!(
            company = %input.company.cnpj,
            periods = snapshots.len(),
            granularity = ?self.granularity,
            "KPI snapshots computed"
        );
        snapshots
    }
}

fn min_max(dates: impl Iterator<Item = NaiveDate>) -> (Option<NaiveDate>, Option<NaiveDate>) {
    dates.fold((None, None), |(lo, hi), d| {
        (
            Some(lo.map_or(d, |lo: NaiveDate| lo.min(d))),
            Some(hi.map_or(d, |hi: NaiveDate| hi.max(d))),
        )
    })
}

fn snapshot(input: KpiInput<'_>, holdings: &[&Holding], period: Period) -> KpiSnapshot {
    let opening_day = period.start().pred_opt().unwrap_or(NaiveDate::MIN);
    let closing_day = period.end();

    let acquired: Vec<&Holding> = holdings
        .iter()
        .copied()
        .filter(|h| period.contains(h.acquired_on))
        .collect();
    let left: Vec<&Holding> = holdings
        .iter()
        .copied()
        .filter(|h| h.left_on().is_some_and(|d| period.contains(d)))
        .collect();
    let count_left = |operation: OperationKind| {
        left.iter()
            .filter(|h| h.disposal.as_ref().is_some_and(|d| d.operation == operation))
            .count()
    };
    let sold: Vec<&Holding> = left
        .iter()
        .copied()
        .filter(|h| h.gross_margin().is_some())
        .collect();

    let opening_stock = holdings.iter().filter(|h| h.in_stock_on(opening_day)).count();
    let closing: Vec<&Holding> = holdings
        .iter()
        .copied()
        .filter(|h| h.in_stock_on(closing_day))
        .collect();
    let average_stock = Decimal::from(opening_stock + closing.len()) / Decimal::TWO;
    let inventory_turnover = (!average_stock.is_zero())
        .then(|| (Decimal::from(sold.len()) / average_stock).round_dp(4));

    let average_days_in_stock = (!left.is_empty()).then(|| {
        let days: i64 = left.iter().map(|h| h.days_in_stock(closing_day)).sum();
        (Decimal::from(days) / Decimal::from(left.len())).round_dp(2)
    });

    let margins: Vec<Decimal> = sold.iter().filter_map(|h| h.gross_margin()).collect();
    let gross_margin = MarginStats::from_margins(&margins);

    let sales_revenue: Decimal = sold
        .iter()
        .filter_map(|h| h.disposal.as_ref())
        .map(|d| d.value)
        .sum();
    let icms_debit: Decimal = sold
        .iter()
        .filter_map(|h| h.disposal.as_ref())
        .filter_map(|d| d.taxes.own_icms)
        .sum();
    let icms_credit: Decimal = sold.iter().filter_map(|h| h.taxes.own_icms).sum();
    let icms_balance = icms_debit - icms_credit;

    let period_records: Vec<&TaxAssessmentRecord> = input
        .assessments
        .iter()
        .filter(|r| period.contains(r.issued_on))
        .collect();

    KpiSnapshot {
        company: input.company.cnpj.clone(),
        period,
        vehicles_acquired: acquired.len(),
        vehicles_sold: sold.len(),
        vehicles_returned: count_left(OperationKind::ReturnToSupplier),
        vehicles_transferred: count_left(OperationKind::Transfer),
        opening_stock,
        ending_stock: closing.len(),
        ending_stock_value: closing.iter().map(|h| h.cost).sum(),
        average_stock,
        inventory_turnover,
        average_days_in_stock,
        acquisitions_total: acquired.iter().map(|h| h.cost).sum(),
        sales_revenue,
        net_profit: gross_margin.total - icms_balance,
        gross_margin,
        icms_debit,
        icms_credit,
        icms_balance,
        assessed_records: period_records.len(),
        total_assessed_liability: period_records.iter().map(|r| r.expected_st).sum(),
    }
}
