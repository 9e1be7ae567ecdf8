//! Tabular (header + rows) view of the report payloads, with CSV export.

use std::io::Write;

use rust_decimal::Decimal;

use autofiscal_assessment::{PresumedProfitAssessment, TaxAssessmentRecord};
use autofiscal_audit::AuditFinding;
use autofiscal_kpi::KpiSnapshot;

use crate::diagnostics::Diagnostic;
use crate::error::ExportError;
use crate::report::InventoryRow;

/// A record type that can be rendered as one table row.
pub trait TabularRow {
    const HEADERS: &'static [&'static str];

    fn fields(&self) -> Vec<String>;
}

/// A payload rendered as a table.
pub trait TabularReport {
    fn headers(&self) -> &'static [&'static str];
    fn rows(&self) -> Vec<Vec<String>>;
}

impl<R: TabularRow> TabularReport for [R] {
    fn headers(&self) -> &'static [&'static str] {
        R::HEADERS
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.iter().map(TabularRow::fields).collect()
    }
}

impl<R: TabularRow> TabularReport for Vec<R> {
    fn headers(&self) -> &'static [&'static str] {
        R::HEADERS
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.as_slice().rows()
    }
}

pub fn write_csv<T, W>(report: &T, writer: W) -> Result<(), ExportError>
where
    T: TabularReport + ?Sized,
    W: Write,
{
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(report.headers())?;
    for row in report.rows() {
        out.write_record(&row)?;
    }
    out.flush()?;
    Ok(())
}

pub fn to_csv_string<T: TabularReport + ?Sized>(report: &T) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    write_csv(report, &mut buf)?;
    Ok(String::from_utf8(buf)?)
}

fn opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

fn money(value: Decimal) -> String {
    value.to_string()
}

impl TabularRow for InventoryRow {
    const HEADERS: &'static [&'static str] = &[
        "chassis",
        "state",
        "description",
        "plate",
        "color",
        "model_year",
        "acquired_on",
        "acquisition_key",
        "cost",
        "disposed_on",
        "disposal_key",
        "disposal_value",
        "gross_margin",
        "days_in_stock",
        "holdings",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.chassis.to_string(),
            self.state.to_string(),
            self.description.clone(),
            opt(&self.plate),
            opt(&self.color),
            opt(&self.model_year),
            opt(&self.acquired_on),
            opt(&self.acquisition_key),
            opt(&self.cost),
            opt(&self.disposed_on),
            opt(&self.disposal_key),
            opt(&self.disposal_value),
            opt(&self.gross_margin),
            opt(&self.days_in_stock),
            self.holdings.to_string(),
        ]
    }
}

impl TabularRow for AuditFinding {
    const HEADERS: &'static [&'static str] =
        &["kind", "severity", "chassis", "access_keys", "occurred_on", "message"];

    fn fields(&self) -> Vec<String> {
        let keys: Vec<&str> = self.access_keys.iter().map(|k| k.as_str()).collect();
        vec![
            self.kind.to_string(),
            format!("{:?}", self.severity).to_lowercase(),
            self.chassis.to_string(),
            keys.join(" "),
            self.occurred_on.to_string(),
            self.message.clone(),
        ]
    }
}

impl TabularRow for TaxAssessmentRecord {
    const HEADERS: &'static [&'static str] = &[
        "chassis",
        "access_key",
        "issued_on",
        "cfop",
        "ncm",
        "rule",
        "sale_value",
        "st_base",
        "gross_icms",
        "own_icms",
        "expected_st",
        "declared_st",
        "delta",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.chassis.to_string(),
            self.access_key.to_string(),
            self.issued_on.to_string(),
            self.cfop.clone(),
            opt(&self.ncm),
            self.rule.clone(),
            money(self.sale_value),
            money(self.st_base),
            money(self.gross_icms),
            money(self.own_icms),
            money(self.expected_st),
            opt(&self.declared_st),
            money(self.delta),
        ]
    }
}

impl TabularRow for KpiSnapshot {
    const HEADERS: &'static [&'static str] = &[
        "company",
        "period",
        "acquired",
        "sold",
        "returned",
        "transferred",
        "opening_stock",
        "ending_stock",
        "ending_stock_value",
        "average_stock",
        "inventory_turnover",
        "average_days_in_stock",
        "acquisitions_total",
        "sales_revenue",
        "gross_margin",
        "gross_margin_average",
        "gross_margin_min",
        "gross_margin_max",
        "icms_debit",
        "icms_credit",
        "icms_balance",
        "net_profit",
        "assessed_records",
        "total_assessed_liability",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.company.to_string(),
            self.period.to_string(),
            self.vehicles_acquired.to_string(),
            self.vehicles_sold.to_string(),
            self.vehicles_returned.to_string(),
            self.vehicles_transferred.to_string(),
            self.opening_stock.to_string(),
            self.ending_stock.to_string(),
            money(self.ending_stock_value),
            self.average_stock.to_string(),
            opt(&self.inventory_turnover),
            opt(&self.average_days_in_stock),
            money(self.acquisitions_total),
            money(self.sales_revenue),
            money(self.gross_margin.total),
            opt(&self.gross_margin.average),
            opt(&self.gross_margin.min),
            opt(&self.gross_margin.max),
            money(self.icms_debit),
            money(self.icms_credit),
            money(self.icms_balance),
            money(self.net_profit),
            self.assessed_records.to_string(),
            money(self.total_assessed_liability),
        ]
    }
}

impl TabularRow for PresumedProfitAssessment {
    const HEADERS: &'static [&'static str] = &[
        "quarter",
        "vehicles_sold",
        "revenue",
        "cost",
        "margin",
        "icms",
        "pis_cofins",
        "irpj_csll_base",
        "irpj",
        "irpj_surcharge",
        "csll",
        "total_taxes",
        "net_profit",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.quarter.to_string(),
            self.vehicles_sold.to_string(),
            money(self.revenue),
            money(self.cost),
            money(self.margin),
            money(self.icms),
            money(self.pis_cofins),
            money(self.irpj_csll_base),
            money(self.irpj),
            money(self.irpj_surcharge),
            money(self.csll),
            money(self.total_taxes),
            money(self.net_profit),
        ]
    }
}

impl TabularRow for Diagnostic {
    const HEADERS: &'static [&'static str] = &["kind", "source_label", "access_key", "chassis", "message"];

    fn fields(&self) -> Vec<String> {
        vec![
            format!("{:?}", self.kind),
            self.source_label.clone(),
            opt(&self.access_key),
            opt(&self.chassis),
            self.message.clone(),
        ]
    }
}
