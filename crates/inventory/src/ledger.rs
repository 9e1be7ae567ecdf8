//! Vehicle ledger: chronological replay of one company's invoices.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

use autofiscal_config::{CompanyConfig, OperationKind};
use autofiscal_core::{AccessKey, Chassis};
use autofiscal_invoicing::{Direction, Invoice, InvoiceItem, InvoiceSet};

use crate::vehicle::{
    Acquire, DeclaredTaxes, Dispose, TransitionAnomaly, Vehicle, VehicleCommand, VehicleState,
};

/// What a movement did to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MovementOutcome {
    Applied { from: VehicleState, to: VehicleState },
    /// Refused transition, kept as an audit candidate.
    Rejected { anomaly: TransitionAnomaly },
    /// Outbound CFOP outside every operation class (remittances, demos...), or
    /// a movement between the company's own establishments.
    Ignored,
}

/// One invoice item touching a chassis, in replay order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    /// Position in this chassis' log, starting at 0.
    pub seq: u32,
    pub access_key: AccessKey,
    pub issued_at: DateTime<FixedOffset>,
    pub direction: Direction,
    /// Operation class of an outbound item; `None` for inbound, internal or
    /// unclassified.
    pub operation: Option<OperationKind>,
    pub cfop: String,
    pub value: Decimal,
    pub outcome: MovementOutcome,
}

impl LedgerEntry {
    pub fn issue_date(&self) -> NaiveDate {
        self.issued_at.date_naive()
    }

    pub fn anomaly(&self) -> Option<TransitionAnomaly> {
        match self.outcome {
            MovementOutcome::Rejected { anomaly } => Some(anomaly),
            _ => None,
        }
    }

    pub fn is_sale(&self) -> bool {
        self.direction == Direction::Outbound && self.operation == Some(OperationKind::Sale)
    }
}

/// Derived per-company ledger: current vehicles plus their movement logs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VehicleLedger {
    vehicles: BTreeMap<Chassis, Vehicle>,
    logs: BTreeMap<Chassis, Vec<LedgerEntry>>,
}

impl VehicleLedger {
    pub fn vehicle(&self, chassis: &Chassis) -> Option<&Vehicle> {
        self.vehicles.get(chassis)
    }

    /// Vehicles in chassis order.
    pub fn vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    pub fn log(&self, chassis: &Chassis) -> &[LedgerEntry] {
        self.logs.get(chassis).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every log in chassis order.
    pub fn logs(&self) -> impl Iterator<Item = (&Chassis, &[LedgerEntry])> {
        self.logs.iter().map(|(c, entries)| (c, entries.as_slice()))
    }

    pub fn in_stock(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles
            .values()
            .filter(|v| v.state() == VehicleState::InStock)
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }
}

/// Replays a company's invoices through the vehicle state machine.
#[derive(Debug, Clone, Copy)]
pub struct LedgerBuilder<'a> {
    company: &'a CompanyConfig,
}

impl<'a> LedgerBuilder<'a> {
    pub fn new(company: &'a CompanyConfig) -> Self {
        Self { company }
    }

    /// Sequential per company; each chassis is isolated from the others.
    pub fn build(&self, invoices: &InvoiceSet) -> VehicleLedger {
        let mut ledger = VehicleLedger::default();
        let mut rejected = 0usize;

        for invoice in invoices.chronological() {
            for (chassis, item) in invoice.vehicle_items() {
                let vehicle = ledger
                    .vehicles
                    .entry(chassis.clone())
                    .or_insert_with(|| Vehicle::new(chassis.clone()));
                let log = ledger.logs.entry(chassis.clone()).or_default();

                let operation = match invoice.direction {
                    Direction::Inbound | Direction::Internal => None,
                    Direction::Outbound => self.company.regime.cfops.classify(&item.cfop),
                };
                let outcome = match command_for(invoice, item, operation) {
                    None => MovementOutcome::Ignored,
                    Some(command) => match vehicle.execute(&command) {
                        Ok((from, to)) => MovementOutcome::Applied { from, to },
                        Err(anomaly) => {
                            rejected += 1;
                            tracing::debug!(
                                company = %self.company.cnpj,
                                chassis = %chassis,
                                access_key = %invoice.access_key,
                                %anomaly,
                                "transition rejected"
                            );
                            MovementOutcome::Rejected { anomaly }
                        }
                    },
                };

                log.push(LedgerEntry {
                    seq: log.len() as u32,
                    access_key: invoice.access_key.clone(),
                    issued_at: invoice.issued_at,
                    direction: invoice.direction,
                    operation,
                    cfop: item.cfop.clone(),
                    value: item.value,
                    outcome,
                });
            }
        }

        tracing::info!(
            company = %self.company.cnpj,
            invoices = invoices.len(),
            vehicles = ledger.vehicles.len(),
            in_stock = ledger.in_stock().count(),
            rejected,
            "vehicle ledger built"
        );
        ledger
    }
}

fn declared_taxes(item: &InvoiceItem) -> DeclaredTaxes {
    DeclaredTaxes {
        own_icms: item.taxes.icms_value,
        icms_st: item.taxes.st_value,
        ipi: item.taxes.ipi_value,
    }
}

fn command_for(
    invoice: &Invoice,
    item: &InvoiceItem,
    operation: Option<OperationKind>,
) -> Option<VehicleCommand> {
    match (invoice.direction, operation) {
        (Direction::Inbound, _) => Some(VehicleCommand::Acquire(Acquire {
            access_key: invoice.access_key.clone(),
            occurred_on: invoice.issue_date(),
            cost: item.value,
            taxes: declared_taxes(item),
            description: item.description.clone(),
            attributes: item.vehicle.clone(),
        })),
        (Direction::Outbound, Some(operation)) => Some(VehicleCommand::Dispose(Dispose {
            access_key: invoice.access_key.clone(),
            occurred_on: invoice.issue_date(),
            operation,
            value: item.value,
            taxes: declared_taxes(item),
        })),
        (Direction::Outbound, None) | (Direction::Internal, _) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autofiscal_config::TaxRegime;
    use autofiscal_core::TaxId;
    use autofiscal_invoicing::{ItemTaxes, VehicleAttributes};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    const VIN: &str = "9BWAA05U6CP000001";

    fn company() -> CompanyConfig {
        CompanyConfig::new(TaxId::parse("11111111000111").unwrap(), "Alpha", TaxRegime::default())
    }

    fn invoice(seq: u32, date: &str, direction: Direction, cfop: &str, value: Decimal) -> Invoice {
        Invoice {
            access_key: AccessKey::with_check_digit(&format!("3524011111111100011155001{seq:09}1{seq:08}")).unwrap(),
            source_label: format!("{seq}.xml"),
            number: None,
            issued_at: DateTime::parse_from_rfc3339(&format!("{date}T10:00:00-03:00")).unwrap(),
            direction,
            issuer: TaxId::parse("11111111000111").unwrap(),
            recipient: None,
            referenced_keys: vec![],
            items: vec![InvoiceItem {
                number: 1,
                description: "GOL".into(),
                ncm: None,
                cfop: cfop.into(),
                value,
                chassis: Some(Chassis::parse(VIN).unwrap()),
                vehicle: VehicleAttributes::default(),
                taxes: ItemTaxes::default(),
            }],
        }
    }

    fn chassis() -> Chassis {
        Chassis::parse(VIN).unwrap()
    }

    #[test]
    fn replay_is_chronological_regardless_of_insertion_order() {
        let set: InvoiceSet = [
            invoice(2, "2024-02-15", Direction::Outbound, "5102", dec!(60000)),
            invoice(1, "2024-01-10", Direction::Inbound, "1102", dec!(50000)),
        ]
        .into_iter()
        .collect();
        let company = company();
        let ledger = LedgerBuilder::new(&company).build(&set);

        let vehicle = ledger.vehicle(&chassis()).unwrap();
        assert_eq!(vehicle.state(), VehicleState::Sold);
        let log = ledger.log(&chassis());
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].seq, 0);
        assert_eq!(log[1].operation, Some(OperationKind::Sale));
        assert!(log.iter().all(|e| e.anomaly().is_none()));
        assert_eq!(ledger.in_stock().count(), 0);
    }

    #[test]
    fn unclassified_outbound_is_logged_but_ignored() {
        // 5949: other remittance (e.g. test drive), not a disposal.
        let set: InvoiceSet = [
            invoice(1, "2024-01-10", Direction::Inbound, "1102", dec!(50000)),
            invoice(2, "2024-01-20", Direction::Outbound, "5949", dec!(0)),
        ]
        .into_iter()
        .collect();
        let company = company();
        let ledger = LedgerBuilder::new(&company).build(&set);

        assert_eq!(ledger.vehicle(&chassis()).unwrap().state(), VehicleState::InStock);
        assert_eq!(ledger.log(&chassis())[1].outcome, MovementOutcome::Ignored);
    }

    #[test]
    fn internal_movement_keeps_the_vehicle_in_stock() {
        let set: InvoiceSet = [
            invoice(1, "2024-01-10", Direction::Inbound, "1102", dec!(50000)),
            invoice(2, "2024-01-20", Direction::Internal, "5152", dec!(50000)),
        ]
        .into_iter()
        .collect();
        let company = company();
        let ledger = LedgerBuilder::new(&company).build(&set);

        assert_eq!(ledger.vehicle(&chassis()).unwrap().state(), VehicleState::InStock);
        let entry = &ledger.log(&chassis())[1];
        assert_eq!(entry.operation, None);
        assert_eq!(entry.outcome, MovementOutcome::Ignored);
    }

    #[test]
    fn orphan_sale_stays_unknown() {
        let set: InvoiceSet = [invoice(1, "2024-01-10", Direction::Outbound, "5102", dec!(1))]
            .into_iter()
            .collect();
        let company = company();
        let ledger = LedgerBuilder::new(&company).build(&set);

        assert_eq!(ledger.vehicle(&chassis()).unwrap().state(), VehicleState::Unknown);
        assert_eq!(
            ledger.log(&chassis())[0].anomaly(),
            Some(TransitionAnomaly::OrphanSale { operation: OperationKind::Sale })
        );
    }

    proptest! {
        #[test]
        fn consecutive_sales_yield_one_duplicate_and_stay_sold(extra_sales in 1u32..6) {
            let mut invoices = vec![
                invoice(1, "2024-01-10", Direction::Inbound, "1102", dec!(50000)),
                invoice(2, "2024-02-01", Direction::Outbound, "5102", dec!(60000)),
            ];
            for n in 0..extra_sales {
                invoices.push(invoice(10 + n, &format!("2024-03-{:02}", n + 1), Direction::Outbound, "5102", dec!(60000)));
            }
            let set: InvoiceSet = invoices.into_iter().collect();
            let company = company();
            let ledger = LedgerBuilder::new(&company).build(&set);

            let duplicates = ledger
                .log(&chassis())
                .iter()
                .filter(|e| e.anomaly() == Some(TransitionAnomaly::DuplicateSale))
                .count();
            prop_assert_eq!(duplicates as u32, extra_sales);
            prop_assert_eq!(ledger.vehicle(&chassis()).unwrap().state(), VehicleState::Sold);
        }
    }
}
