//! Quarterly presumed-profit ("lucro presumido") assessment over vehicle margins.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use autofiscal_config::{OperationKind, TaxRegime};
use autofiscal_core::{Granularity, Period, round_currency};
use autofiscal_inventory::VehicleLedger;

/// Taxes due for one calendar quarter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresumedProfitAssessment {
    pub quarter: Period,
    pub vehicles_sold: usize,
    pub revenue: Decimal,
    pub cost: Decimal,
    /// Sum of sale value minus acquisition cost of the vehicles sold.
    pub margin: Decimal,
    pub icms: Decimal,
    pub pis_cofins: Decimal,
    pub irpj_csll_base: Decimal,
    pub irpj: Decimal,
    pub irpj_surcharge: Decimal,
    pub csll: Decimal,
    pub total_taxes: Decimal,
    pub net_profit: Decimal,
}

#[derive(Default)]
struct QuarterSales {
    vehicles_sold: usize,
    revenue: Decimal,
    cost: Decimal,
}

/// One row per quarter with at least one sale, in chronological order.
///
/// The surcharge threshold applies to the quarterly base, not per vehicle.
pub fn presumed_profit(regime: &TaxRegime, ledger: &VehicleLedger) -> Vec<PresumedProfitAssessment> {
    let mut quarters: BTreeMap<Period, QuarterSales> = BTreeMap::new();
    for holding in ledger.vehicles().flat_map(|v| v.holdings()) {
        let Some(sale) = holding
            .disposal
            .as_ref()
            .filter(|d| d.operation == OperationKind::Sale)
        else {
            continue;
        };
        let q = quarters
            .entry(Period::containing(sale.date, Granularity::Quarter))
            .or_default();
        q.vehicles_sold += 1;
        q.revenue += sale.value;
        q.cost += holding.cost;
    }

    let rates = &regime.presumed_profit;
    let round = |v: Decimal| round_currency(v, regime.rounding);
    quarters
        .into_iter()
        .map(|(quarter, sales)| {
            let margin = sales.revenue - sales.cost;
            let icms = round(margin * rates.icms);
            let pis_cofins = round(margin * rates.pis_cofins);
            let irpj_csll_base = round(margin * rates.irpj_csll_base);
            let irpj = round(irpj_csll_base * rates.irpj);
            let csll = round(irpj_csll_base * rates.csll);
            let irpj_surcharge = if irpj_csll_base > rates.surcharge_threshold {
                round((irpj_csll_base - rates.surcharge_threshold) * rates.irpj_surcharge)
            } else {
                Decimal::ZERO
            };
            let total_taxes = icms + pis_cofins + irpj + csll + irpj_surcharge;
            PresumedProfitAssessment {
                quarter,
                vehicles_sold: sales.vehicles_sold,
                revenue: sales.revenue,
                cost: sales.cost,
                margin,
                icms,
                pis_cofins,
                irpj_csll_base,
                irpj,
                irpj_surcharge,
                csll,
                total_taxes,
                net_profit: margin - total_taxes,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use autofiscal_config::{CompanyConfig, TaxRegime};
    use autofiscal_core::{AccessKey, Chassis, TaxId};
    use autofiscal_invoicing::{Direction, Invoice, InvoiceItem, InvoiceSet, ItemTaxes, VehicleAttributes};
    use autofiscal_inventory::LedgerBuilder;
    use chrono::DateTime;
    use rust_decimal_macros::dec;

    fn invoice(seq: u32, date: &str, direction: Direction, vin: &str, cfop: &str, value: Decimal) -> Invoice {
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

    fn ledger(invoices: Vec<Invoice>) -> VehicleLedger {
        let company = CompanyConfig::new(TaxId::parse("11111111000111").unwrap(), "Alpha", TaxRegime::default());
        let set: InvoiceSet = invoices.into_iter().collect();
        LedgerBuilder::new(&company).build(&set)
    }

    #[test]
    fn alpha_quarter_without_surcharge() {
        let ledger = ledger(vec![
            invoice(1, "2024-01-10", Direction::Inbound, "9BWAA05U6CP000001", "1102", dec!(50000)),
            invoice(2, "2024-02-15", Direction::Outbound, "9BWAA05U6CP000001", "5102", dec!(60000)),
        ]);
        let rows = presumed_profit(&TaxRegime::default(), &ledger);

        assert_eq!(rows.len(), 1);
        let q = &rows[0];
        assert_eq!(q.quarter, Period::Quarter { year: 2024, quarter: 1 });
        assert_eq!(q.margin, dec!(10000));
        assert_eq!(q.icms, dec!(1900.00));
        assert_eq!(q.pis_cofins, dec!(365.00));
        assert_eq!(q.irpj_csll_base, dec!(3200.00));
        assert_eq!(q.irpj, dec!(480.00));
        assert_eq!(q.csll, dec!(288.00));
        assert_eq!(q.irpj_surcharge, Decimal::ZERO);
        assert_eq!(q.total_taxes, dec!(3033.00));
        assert_eq!(q.net_profit, dec!(6967.00));
    }

    #[test]
    fn surcharge_applies_above_the_quarterly_threshold() {
        // Margin 250,000 -> base 80,000 -> surcharge (80,000 - 60,000) * 10%.
        let ledger = ledger(vec![
            invoice(1, "2024-04-01", Direction::Inbound, "9BWAA05U6CP000001", "1102", dec!(100000)),
            invoice(2, "2024-05-01", Direction::Outbound, "9BWAA05U6CP000001", "5102", dec!(350000)),
            invoice(3, "2024-07-01", Direction::Inbound, "98M50AA00L4A92818", "1102", dec!(10)),
        ]);
        let rows = presumed_profit(&TaxRegime::default(), &ledger);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].quarter, Period::Quarter { year: 2024, quarter: 2 });
        assert_eq!(rows[0].irpj_csll_base, dec!(80000.00));
        assert_eq!(rows[0].irpj_surcharge, dec!(2000.00));
    }

    #[test]
    fn returns_and_transfers_are_not_sales() {
        let ledger = ledger(vec![
            invoice(1, "2024-01-10", Direction::Inbound, "9BWAA05U6CP000001", "1102", dec!(50000)),
            invoice(2, "2024-01-20", Direction::Outbound, "9BWAA05U6CP000001", "5202", dec!(50000)),
        ]);
        assert!(presumed_profit(&TaxRegime::default(), &ledger).is_empty());
    }
}
