//! Parsed NFe documents (company-independent view).

use chrono::{DateTime, FixedOffset, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

use autofiscal_core::{AccessKey, Chassis, TaxId};

/// `ide/tpNF`: the operation type as declared by the issuer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Entry,
    Exit,
}

/// Tax fields printed on an item.
///
/// Every field is `None` when the tag is absent from the XML. An absent field is
/// not the same as a declared zero: absence means the issuer did not report the
/// tax at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ItemTaxes {
    pub icms_base: Option<Decimal>,
    /// ICMS rate as printed (percentage, e.g. `18.00`).
    pub icms_rate: Option<Decimal>,
    pub icms_value: Option<Decimal>,
    pub st_base: Option<Decimal>,
    pub st_value: Option<Decimal>,
    pub ipi_value: Option<Decimal>,
}

/// Descriptive vehicle data found on the item (`veicProd` group or description).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VehicleAttributes {
    pub plate: Option<String>,
    pub renavam: Option<String>,
    pub color: Option<String>,
    pub model_year: Option<u16>,
    pub manufacture_year: Option<u16>,
    pub engine_number: Option<String>,
}

/// One `det` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceItem {
    /// `det@nItem`, 1-based.
    pub number: u32,
    pub description: String,
    pub ncm: Option<String>,
    pub cfop: String,
    /// `prod/vProd`: the item's total value.
    pub value: Decimal,
    /// `None` for non-vehicle items (accessories, services, parts).
    pub chassis: Option<Chassis>,
    pub vehicle: VehicleAttributes,
    pub taxes: ItemTaxes,
}

/// A structurally valid NFe (model 55), before it is related to any company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NfeDocument {
    pub access_key: AccessKey,
    pub source_label: String,
    pub number: Option<String>,
    pub issued_at: DateTime<FixedOffset>,
    pub document_type: Option<DocumentType>,
    pub nature: Option<String>,
    pub issuer: TaxId,
    pub recipient: Option<TaxId>,
    /// `NFref/refNFe`: documents this one refers to (returns, complements).
    pub referenced_keys: Vec<AccessKey>,
    pub items: Vec<InvoiceItem>,
}

impl NfeDocument {
    pub fn issue_date(&self) -> NaiveDate {
        self.issued_at.date_naive()
    }

    /// CFOP of the first item, used to classify the whole document.
    pub fn leading_cfop(&self) -> Option<&str> {
        self.items.first().map(|i| i.cfop.as_str())
    }

    pub fn vehicle_items(&self) -> impl Iterator<Item = (&Chassis, &InvoiceItem)> {
        self.items
            .iter()
            .filter_map(|item| item.chassis.as_ref().map(|c| (c, item)))
    }
}
