//! Audit & reconciliation over one company's ledger and assessments.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::json;

use autofiscal_assessment::TaxAssessmentRecord;
use autofiscal_config::{CompanyConfig, OperationKind};
use autofiscal_core::Chassis;
use autofiscal_inventory::{LedgerEntry, MovementOutcome, TransitionAnomaly, VehicleLedger, VehicleState};
use autofiscal_invoicing::InvoiceSet;

use crate::finding::{AuditFinding, FindingKind, Severity};

/// Multiple of the tolerance above which a tax mismatch is high severity.
const HIGH_MISMATCH_FACTOR: i64 = 10;

/// Deterministic audit job for one company.
///
/// Findings are ordered by chassis, then by the position of the offending
/// movement in the chassis log; stuck-inventory findings come last.
#[derive(Debug, Clone, Copy)]
pub struct AuditEngine<'a> {
    company: &'a CompanyConfig,
    as_of: NaiveDate,
}

impl<'a> AuditEngine<'a> {
    pub fn new(company: &'a CompanyConfig, as_of: NaiveDate) -> Self {
        Self { company, as_of }
    }

    pub fn run(
        &self,
        invoices: &InvoiceSet,
        ledger: &VehicleLedger,
        assessments: &[TaxAssessmentRecord],
    ) -> Vec<AuditFinding> {
        let mut findings = Vec::new();

        for (chassis, log) in ledger.logs() {
            self.lifecycle_findings(chassis, log, &mut findings);
            self.counterpart_findings(chassis, log, invoices, &mut findings);
        }
        self.stuck_inventory(ledger, &mut findings);
        self.tax_mismatches(ledger, assessments, &mut findings);

        findings.sort_by(|a, b| {
            (&a.chassis, a.order, a.kind, &a.access_keys).cmp(&(&b.chassis, b.order, b.kind, &b.access_keys))
        });

        tracing::info!(
            company = %self.company.cnpj,
            findings = findings.len(),
            high = findings.iter().filter(|f| f.severity == Severity::High).count(),
            "audit finished"
        );
        findings
    }

    fn lifecycle_findings(&self, chassis: &Chassis, log: &[LedgerEntry], out: &mut Vec<AuditFinding>) {
        let mut last_applied: Option<&LedgerEntry> = None;
        for entry in log {
            match entry.outcome {
                MovementOutcome::Applied { .. } => last_applied = Some(entry),
                MovementOutcome::Ignored => {}
                MovementOutcome::Rejected { anomaly } => {
                    let mut access_keys: Vec<_> = last_applied.map(|p| p.access_key.clone()).into_iter().collect();
                    access_keys.push(entry.access_key.clone());
                    let (kind, message, details) = describe(anomaly, entry);
                    out.push(AuditFinding {
                        kind,
                        severity: Severity::High,
                        chassis: chassis.clone(),
                        access_keys,
                        occurred_on: entry.issue_date(),
                        message,
                        details,
                        order: entry.seq,
                    });
                }
            }
        }
    }

    /// Applied returns and transfers must reference a document of this company
    /// that carries the same chassis.
    fn counterpart_findings(
        &self,
        chassis: &Chassis,
        log: &[LedgerEntry],
        invoices: &InvoiceSet,
        out: &mut Vec<AuditFinding>,
    ) {
        for entry in log {
            let needs_pair = matches!(entry.outcome, MovementOutcome::Applied { .. })
                && matches!(
                    entry.operation,
                    Some(OperationKind::Transfer | OperationKind::ReturnToSupplier)
                );
            if !needs_pair {
                continue;
            }
            let Some(invoice) = invoices.get(&entry.access_key) else {
                continue;
            };
            let paired = invoice.referenced_keys.iter().any(|key| {
                invoices
                    .get(key)
                    .is_some_and(|counterpart| counterpart.item_for(chassis).is_some())
            });
            if paired {
                continue;
            }
            out.push(AuditFinding {
                kind: FindingKind::MissingCounterpartInvoice,
                severity: Severity::Medium,
                chassis: chassis.clone(),
                access_keys: vec![entry.access_key.clone()],
                occurred_on: entry.issue_date(),
                message: format!(
                    "{:?} of {chassis} on {} has no referenced document for the same vehicle",
                    entry.operation.unwrap_or(OperationKind::Transfer),
                    entry.access_key
                ),
                details: json!({
                    "operation": entry.operation,
                    "referenced_keys": invoice.referenced_keys,
                }),
                order: entry.seq,
            });
        }
    }

    fn stuck_inventory(&self, ledger: &VehicleLedger, out: &mut Vec<AuditFinding>) {
        let threshold = i64::from(self.company.stale_inventory_days);
        for vehicle in ledger.vehicles() {
            if vehicle.state() != VehicleState::InStock {
                continue;
            }
            let Some(holding) = vehicle.current_holding() else {
                continue;
            };
            let days = (self.as_of - holding.acquired_on).num_days();
            if days <= threshold {
                continue;
            }
            out.push(AuditFinding {
                kind: FindingKind::StuckInventory,
                severity: Severity::Low,
                chassis: vehicle.chassis().clone(),
                access_keys: vec![holding.access_key.clone()],
                occurred_on: self.as_of,
                message: format!(
                    "{} in stock for {days} days (threshold {threshold})",
                    vehicle.chassis()
                ),
                details: json!({
                    "acquired_on": holding.acquired_on,
                    "days_in_stock": days,
                    "threshold_days": threshold,
                    "cost": holding.cost,
                }),
                order: u32::MAX,
            });
        }
    }

    fn tax_mismatches(
        &self,
        ledger: &VehicleLedger,
        assessments: &[TaxAssessmentRecord],
        out: &mut Vec<AuditFinding>,
    ) {
        let tolerance = self.company.mismatch_tolerance;
        let high = tolerance * Decimal::from(HIGH_MISMATCH_FACTOR);
        for record in assessments {
            let gap = record.delta.abs();
            if gap <= tolerance {
                continue;
            }
            let order = ledger
                .log(&record.chassis)
                .iter()
                .find(|e| e.access_key == record.access_key)
                .map_or(u32::MAX - 1, |e| e.seq);
            out.push(AuditFinding {
                kind: FindingKind::TaxValueMismatch,
                severity: if gap > high { Severity::High } else { Severity::Medium },
                chassis: record.chassis.clone(),
                access_keys: vec![record.access_key.clone()],
                occurred_on: record.issued_on,
                message: format!(
                    "declared ICMS-ST {} differs from expected {} by {}",
                    record.declared_st.unwrap_or_default(),
                    record.expected_st,
                    record.delta
                ),
                details: json!({
                    "rule": record.rule,
                    "st_base": record.st_base,
                    "expected_st": record.expected_st,
                    "declared_st": record.declared_st,
                    "delta": record.delta,
                    "tolerance": tolerance,
                }),
                order,
            });
        }
    }
}

fn describe(anomaly: TransitionAnomaly, entry: &LedgerEntry) -> (FindingKind, String, serde_json::Value) {
    let kind = match anomaly {
        TransitionAnomaly::OrphanSale { .. } => FindingKind::OrphanSale,
        TransitionAnomaly::DuplicateSale => FindingKind::DuplicateSale,
        TransitionAnomaly::DuplicateAcquisition => FindingKind::DuplicateAcquisition,
        TransitionAnomaly::InvalidTransition { .. } => FindingKind::InvalidTransition,
    };
    let message = format!("{anomaly} (document {}, CFOP {})", entry.access_key, entry.cfop);
    let details = json!({
        "anomaly": anomaly,
        "cfop": entry.cfop,
        "value": entry.value,
    });
    (kind, message, details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use autofiscal_assessment::assess_sales;
    use autofiscal_config::{TaxRegime, TaxRule};
    use autofiscal_core::{AccessKey, TaxId};
    use autofiscal_inventory::LedgerBuilder;
    use autofiscal_invoicing::{Direction, Invoice, InvoiceItem, ItemTaxes, VehicleAttributes};
    use chrono::DateTime;
    use rust_decimal_macros::dec;

    const VIN_A: &str = "9BWAA05U6CP000001";
    const VIN_B: &str = "98M50AA00L4A92818";

    fn key(seq: u32) -> AccessKey {
        AccessKey::with_check_digit(&format!("3524011111111100011155001{seq:09}1{seq:08}")).unwrap()
    }

    fn invoice(seq: u32, date: &str, direction: Direction, vin: &str, cfop: &str, value: Decimal) -> Invoice {
        Invoice {
            access_key: key(seq),
            source_label: format!("{seq}.xml"),
            number: None,
            issued_at: DateTime::parse_from_rfc3339(&format!("{date}T10:00:00-03:00")).unwrap(),
            direction,
            issuer: TaxId::parse("11111111000111").unwrap(),
            recipient: None,
            referenced_keys: vec![],
            items: vec![InvoiceItem {
                number: 1,
                description: String::new(),
                ncm: None,
                cfop: cfop.into(),
                value,
                chassis: Some(Chassis::parse(vin).unwrap()),
                vehicle: VehicleAttributes::default(),
                taxes: ItemTaxes::default(),
            }],
        }
    }

    fn company() -> CompanyConfig {
        let regime = TaxRegime::default().with_rule(TaxRule::new("vehicles", &["5102"], dec!(0.30), dec!(0.18)));
        CompanyConfig::new(TaxId::parse("11111111000111").unwrap(), "Alpha", regime)
    }

    fn audit(invoices: Vec<Invoice>, as_of: &str) -> Vec<AuditFinding> {
        let company = company();
        let set: InvoiceSet = invoices.into_iter().collect();
        let ledger = LedgerBuilder::new(&company).build(&set);
        let assessed = assess_sales(&company, &set);
        AuditEngine::new(&company, NaiveDate::parse_from_str(as_of, "%Y-%m-%d").unwrap())
            .run(&set, &ledger, &assessed.records)
    }

    fn kinds(findings: &[AuditFinding]) -> Vec<FindingKind> {
        findings.iter().map(|f| f.kind).collect()
    }

    #[test]
    fn orphan_sale_is_reported_once() {
        let mut sale = invoice(1, "2024-03-01", Direction::Outbound, VIN_B, "5102", dec!(1000));
        sale.items[0].taxes.icms_value = Some(dec!(180));
        sale.items[0].taxes.st_value = Some(dec!(54));
        let findings = audit(vec![sale], "2024-03-31");

        assert_eq!(kinds(&findings), [FindingKind::OrphanSale]);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].access_keys, [key(1)]);
    }

    #[test]
    fn duplicate_sale_names_both_documents() {
        let mut invoices = vec![
            invoice(1, "2024-01-10", Direction::Inbound, VIN_A, "1102", dec!(500)),
            invoice(2, "2024-02-01", Direction::Outbound, VIN_A, "5102", dec!(600)),
            invoice(3, "2024-02-02", Direction::Outbound, VIN_A, "5102", dec!(600)),
        ];
        for inv in &mut invoices[1..] {
            inv.items[0].taxes.icms_value = Some(dec!(108));
            inv.items[0].taxes.st_value = Some(dec!(32.40));
        }
        let findings = audit(invoices, "2024-02-28");

        assert_eq!(kinds(&findings), [FindingKind::DuplicateSale]);
        assert_eq!(findings[0].access_keys, [key(2), key(3)]);
    }

    #[test]
    fn stuck_threshold_is_exclusive() {
        let inbound = || vec![invoice(1, "2024-01-01", Direction::Inbound, VIN_A, "1102", dec!(500))];
        // 2024 is a leap year: 2024-06-29 is day 180.
        assert!(audit(inbound(), "2024-06-29").is_empty());
        let findings = audit(inbound(), "2024-06-30");
        assert_eq!(kinds(&findings), [FindingKind::StuckInventory]);
        assert_eq!(findings[0].severity, Severity::Low);
        assert_eq!(findings[0].details["days_in_stock"], 181);
    }

    #[test]
    fn mismatch_severity_scales_with_tolerance() {
        let mut invoices = vec![
            invoice(1, "2024-01-10", Direction::Inbound, VIN_A, "1102", dec!(50000)),
            invoice(2, "2024-02-15", Direction::Outbound, VIN_A, "5102", dec!(60000)),
        ];
        invoices[1].items[0].taxes.icms_value = Some(dec!(9720));
        invoices[1].items[0].taxes.st_value = Some(dec!(4000));
        let findings = audit(invoices.clone(), "2024-02-28");
        assert_eq!(kinds(&findings), [FindingKind::TaxValueMismatch]);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].details["delta"], json!(dec!(320.00)));

        invoices[1].items[0].taxes.st_value = Some(dec!(4315));
        let findings = audit(invoices.clone(), "2024-02-28");
        assert_eq!(findings[0].severity, Severity::Medium);

        invoices[1].items[0].taxes.st_value = Some(dec!(4319.50));
        assert!(audit(invoices, "2024-02-28").is_empty());
    }

    #[test]
    fn transfer_needs_a_referenced_counterpart() {
        let mut transfer = invoice(2, "2024-01-20", Direction::Outbound, VIN_A, "5152", dec!(500));
        let invoices = vec![
            invoice(1, "2024-01-10", Direction::Inbound, VIN_A, "1102", dec!(500)),
            transfer.clone(),
        ];
        let findings = audit(invoices.clone(), "2024-01-31");
        assert_eq!(kinds(&findings), [FindingKind::MissingCounterpartInvoice]);
        assert_eq!(findings[0].severity, Severity::Medium);

        transfer.referenced_keys = vec![key(1)];
        let findings = audit(vec![invoices[0].clone(), transfer], "2024-01-31");
        assert!(findings.is_empty());
    }

    #[test]
    fn findings_follow_chassis_then_log_order() {
        let invoices = vec![
            invoice(1, "2024-01-01", Direction::Outbound, VIN_A, "5202", dec!(1)),
            invoice(2, "2024-01-02", Direction::Inbound, VIN_A, "1102", dec!(1)),
            invoice(3, "2024-01-03", Direction::Inbound, VIN_A, "1102", dec!(1)),
            invoice(4, "2024-01-01", Direction::Inbound, VIN_B, "1102", dec!(1)),
            invoice(5, "2024-01-02", Direction::Inbound, VIN_B, "1102", dec!(1)),
        ];
        let findings = audit(invoices, "2024-01-31");
        let summary: Vec<(&str, FindingKind)> = findings.iter().map(|f| (f.chassis.as_str(), f.kind)).collect();
        assert_eq!(
            summary,
            [
                (VIN_B, FindingKind::DuplicateAcquisition),
                (VIN_A, FindingKind::OrphanSale),
                (VIN_A, FindingKind::DuplicateAcquisition),
            ]
        );
    }

    proptest::proptest! {
        #[test]
        fn mismatch_is_reported_only_above_tolerance(cents in -500_000i64..500_000) {
            let gap = Decimal::new(cents, 2);
            let mut invoices = vec![
                invoice(1, "2024-01-10", Direction::Inbound, VIN_A, "1102", dec!(50000)),
                invoice(2, "2024-02-15", Direction::Outbound, VIN_A, "5102", dec!(60000)),
            ];
            invoices[1].items[0].taxes.icms_value = Some(dec!(9720));
            invoices[1].items[0].taxes.st_value = Some(dec!(4320) - gap);
            let findings = audit(invoices, "2024-02-28");

            let tolerance = company().mismatch_tolerance;
            if gap.abs() <= tolerance {
                proptest::prop_assert!(findings.is_empty());
            } else {
                proptest::prop_assert_eq!(kinds(&findings), vec![FindingKind::TaxValueMismatch]);
                let expected = if gap.abs() > tolerance * dec!(10) { Severity::High } else { Severity::Medium };
                proptest::prop_assert_eq!(findings[0].severity, expected);
            }
        }
    }
}
