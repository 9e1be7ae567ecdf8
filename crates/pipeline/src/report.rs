//! Report payloads returned by a run.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use autofiscal_assessment::{AssessmentTotals, PresumedProfitAssessment, TaxAssessmentRecord};
use autofiscal_audit::AuditFinding;
use autofiscal_core::{AccessKey, Chassis, Granularity, Period, TaxId};
use autofiscal_inventory::{VehicleLedger, VehicleState};
use autofiscal_kpi::KpiSnapshot;

use crate::diagnostics::Diagnostic;
use crate::error::ExportError;

/// Current position of one vehicle, as of the run date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryRow {
    pub chassis: Chassis,
    pub state: VehicleState,
    pub description: String,
    pub plate: Option<String>,
    pub color: Option<String>,
    pub model_year: Option<u16>,
    pub acquired_on: Option<NaiveDate>,
    pub acquisition_key: Option<AccessKey>,
    pub cost: Option<Decimal>,
    pub disposed_on: Option<NaiveDate>,
    pub disposal_key: Option<AccessKey>,
    pub disposal_value: Option<Decimal>,
    pub gross_margin: Option<Decimal>,
    /// Days of the latest holding, up to `as_of` while still in stock.
    pub days_in_stock: Option<i64>,
    /// Number of times the vehicle entered stock.
    pub holdings: usize,
}

/// One row per vehicle of the ledger, in chassis order.
pub fn inventory_rows(ledger: &VehicleLedger, as_of: NaiveDate) -> Vec<InventoryRow> {
    ledger
        .vehicles()
        .map(|vehicle| {
            let holding = vehicle.last_holding();
            let disposal = holding.and_then(|h| h.disposal.as_ref());
            InventoryRow {
                chassis: vehicle.chassis().clone(),
                state: vehicle.state(),
                description: vehicle.description().to_string(),
                plate: vehicle.attributes().plate.clone(),
                color: vehicle.attributes().color.clone(),
                model_year: vehicle.attributes().model_year,
                acquired_on: holding.map(|h| h.acquired_on),
                acquisition_key: holding.map(|h| h.access_key.clone()),
                cost: holding.map(|h| h.cost),
                disposed_on: disposal.map(|d| d.date),
                disposal_key: disposal.map(|d| d.access_key.clone()),
                disposal_value: disposal.map(|d| d.value),
                gross_margin: holding.and_then(|h| h.gross_margin()),
                days_in_stock: holding.map(|h| h.days_in_stock(as_of)),
                holdings: vehicle.holdings().len(),
            }
        })
        .collect()
}

/// Everything computed for one company.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyReport {
    pub company: TaxId,
    pub name: String,
    pub invoices: usize,
    pub inventory: Vec<InventoryRow>,
    pub findings: Vec<AuditFinding>,
    pub assessments: Vec<TaxAssessmentRecord>,
    pub assessment_totals: BTreeMap<Period, AssessmentTotals>,
    pub kpis: Vec<KpiSnapshot>,
    pub presumed_profit: Vec<PresumedProfitAssessment>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompanyReport {
    pub fn in_stock(&self) -> impl Iterator<Item = &InventoryRow> {
        self.inventory
            .iter()
            .filter(|row| row.state == VehicleState::InStock)
    }

    pub fn vehicle(&self, chassis: &str) -> Option<&InventoryRow> {
        self.inventory.iter().find(|row| row.chassis.as_str() == chassis)
    }

    pub fn kpi(&self, period: Period) -> Option<&KpiSnapshot> {
        self.kpis.iter().find(|k| k.period == period)
    }
}

/// Output of one run over all requested companies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub as_of: NaiveDate,
    pub granularity: Granularity,
    pub documents_received: usize,
    pub documents_accepted: usize,
    /// Document-level diagnostics not tied to a single company, in input order.
    pub diagnostics: Vec<Diagnostic>,
    /// One entry per requested company, in CNPJ order.
    pub companies: Vec<CompanyReport>,
}

impl RunReport {
    pub fn company(&self, cnpj: &TaxId) -> Option<&CompanyReport> {
        self.companies.iter().find(|c| &c.company == cnpj)
    }

    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
