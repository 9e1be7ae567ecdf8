//! Canonical invoices and the deduplicating maps keyed by access key.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;

use autofiscal_config::CompanyConfig;
use autofiscal_core::{AccessKey, Chassis, TaxId};

use crate::classify::{Classification, Direction, classify};
use crate::document::{InvoiceItem, NfeDocument};

/// A later document carrying an access key that was already accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateDocument {
    pub access_key: AccessKey,
    /// Label of the discarded copy.
    pub source_label: String,
    /// Label of the copy that was kept.
    pub kept_source_label: String,
}

/// Every structurally valid document of a run, first-seen wins.
#[derive(Debug, Clone, Default)]
pub struct DocumentSet {
    documents: BTreeMap<AccessKey, NfeDocument>,
}

impl DocumentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, document: NfeDocument) -> Result<(), DuplicateDocument> {
        if let Some(kept) = self.documents.get(&document.access_key) {
            return Err(DuplicateDocument {
                access_key: document.access_key,
                source_label: document.source_label,
                kept_source_label: kept.source_label.clone(),
            });
        }
        self.documents.insert(document.access_key.clone(), document);
        Ok(())
    }

    pub fn get(&self, key: &AccessKey) -> Option<&NfeDocument> {
        self.documents.get(key)
    }

    /// Documents in access-key order.
    pub fn iter(&self) -> impl Iterator<Item = &NfeDocument> {
        self.documents.values()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// A document as seen by one company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invoice {
    pub access_key: AccessKey,
    pub source_label: String,
    pub number: Option<String>,
    pub issued_at: DateTime<FixedOffset>,
    pub direction: Direction,
    pub issuer: TaxId,
    pub recipient: Option<TaxId>,
    pub referenced_keys: Vec<AccessKey>,
    pub items: Vec<InvoiceItem>,
}

impl Invoice {
    pub fn from_document(document: &NfeDocument, direction: Direction) -> Self {
        Self {
            access_key: document.access_key.clone(),
            source_label: document.source_label.clone(),
            number: document.number.clone(),
            issued_at: document.issued_at,
            direction,
            issuer: document.issuer.clone(),
            recipient: document.recipient.clone(),
            referenced_keys: document.referenced_keys.clone(),
            items: document.items.clone(),
        }
    }

    pub fn issue_date(&self) -> NaiveDate {
        self.issued_at.date_naive()
    }

    pub fn item_for(&self, chassis: &Chassis) -> Option<&InvoiceItem> {
        self.items.iter().find(|i| i.chassis.as_ref() == Some(chassis))
    }

    pub fn vehicle_items(&self) -> impl Iterator<Item = (&Chassis, &InvoiceItem)> {
        self.items
            .iter()
            .filter_map(|item| item.chassis.as_ref().map(|c| (c, item)))
    }

    /// Ledger replay order: issue timestamp, then access key.
    pub fn chronological_key(&self) -> (DateTime<FixedOffset>, &AccessKey) {
        (self.issued_at, &self.access_key)
    }
}

/// Outcome of offering a document to a company's invoice set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted { self_issued: bool },
    Unrelated,
    Duplicate(DuplicateDocument),
}

/// The invoices of one company, keyed by access key.
#[derive(Debug, Clone, Default)]
pub struct InvoiceSet {
    invoices: BTreeMap<AccessKey, Invoice>,
}

impl InvoiceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `document` against `company` and keep it when it concerns it.
    pub fn admit(&mut self, document: &NfeDocument, company: &CompanyConfig) -> Admission {
        let classification = classify(document, company);
        let Some(direction) = classification.direction() else {
            return Admission::Unrelated;
        };
        match self.insert(Invoice::from_document(document, direction)) {
            Ok(()) => Admission::Admitted {
                self_issued: matches!(classification, Classification::Inbound { self_issued: true }),
            },
            Err(duplicate) => Admission::Duplicate(duplicate),
        }
    }

    pub fn insert(&mut self, invoice: Invoice) -> Result<(), DuplicateDocument> {
        if let Some(kept) = self.invoices.get(&invoice.access_key) {
            return Err(DuplicateDocument {
                access_key: invoice.access_key,
                source_label: invoice.source_label,
                kept_source_label: kept.source_label.clone(),
            });
        }
        self.invoices.insert(invoice.access_key.clone(), invoice);
        Ok(())
    }

    pub fn get(&self, key: &AccessKey) -> Option<&Invoice> {
        self.invoices.get(key)
    }

    pub fn contains(&self, key: &AccessKey) -> bool {
        self.invoices.contains_key(key)
    }

    /// Invoices sorted by issue timestamp, ties broken by access key.
    pub fn chronological(&self) -> Vec<&Invoice> {
        let mut invoices: Vec<&Invoice> = self.invoices.values().collect();
        invoices.sort_by(|a, b| a.chronological_key().cmp(&b.chronological_key()));
        invoices
    }

    pub fn iter(&self) -> impl Iterator<Item = &Invoice> {
        self.invoices.values()
    }

    pub fn len(&self) -> usize {
        self.invoices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invoices.is_empty()
    }
}

/// First occurrence of each key wins; later copies are dropped without a
/// [`DuplicateDocument`]. Use [`InvoiceSet::insert`] or [`InvoiceSet::admit`]
/// when the duplicates must be reported.
impl FromIterator<Invoice> for InvoiceSet {
    fn from_iter<T: IntoIterator<Item = Invoice>>(iter: T) -> Self {
        let mut set = InvoiceSet::new();
        for invoice in iter {
            let _ = set.insert(invoice);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nfe::parse_document;
    use autofiscal_config::TaxRegime;
    use proptest::prelude::*;

    const ALPHA: &str = "11111111000111";

    fn key(seq: u32) -> AccessKey {
        AccessKey::with_check_digit(&format!("3524011111111100011155001{seq:09}1{seq:08}")).unwrap()
    }

    fn xml(key: &AccessKey, issued: &str) -> String {
        format!(
            r#"<NFe><infNFe Id="NFe{key}"><ide><mod>55</mod><dhEmi>{issued}</dhEmi></ide>
<emit><CNPJ>{ALPHA}</CNPJ></emit><dest><CPF>12345678909</CPF></dest>
<det nItem="1"><prod><xProd>GOL CHASSI 9BWAA05U6CP000001</xProd><CFOP>5102</CFOP><vProd>1000.00</vProd></prod></det>
</infNFe></NFe>"#
        )
    }

    fn alpha() -> CompanyConfig {
        CompanyConfig::new(TaxId::parse(ALPHA).unwrap(), "Alpha", TaxRegime::default())
    }

    #[test]
    fn first_seen_document_wins() {
        let k = key(1);
        let bytes = xml(&k, "2024-01-10T10:00:00-03:00");
        let mut docs = DocumentSet::new();
        docs.insert(parse_document("a.xml", bytes.as_bytes()).unwrap()).unwrap();
        let dup = docs
            .insert(parse_document("b.xml", bytes.as_bytes()).unwrap())
            .unwrap_err();

        assert_eq!(dup.source_label, "b.xml");
        assert_eq!(dup.kept_source_label, "a.xml");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs.get(&k).unwrap().source_label, "a.xml");
    }

    #[test]
    fn admission_classifies_against_the_company() {
        let doc = parse_document("a.xml", xml(&key(1), "2024-01-10T10:00:00-03:00").as_bytes()).unwrap();
        let mut set = InvoiceSet::new();
        assert_eq!(set.admit(&doc, &alpha()), Admission::Admitted { self_issued: false });
        assert_eq!(set.get(&doc.access_key).unwrap().direction, Direction::Outbound);
        assert!(matches!(set.admit(&doc, &alpha()), Admission::Duplicate(_)));

        let other = CompanyConfig::new(TaxId::parse("99999999000199").unwrap(), "Other", TaxRegime::default());
        assert_eq!(InvoiceSet::new().admit(&doc, &other), Admission::Unrelated);
    }

    #[test]
    fn chronological_order_breaks_ties_by_key() {
        let same = "2024-01-10T10:00:00-03:00";
        let docs = [
            parse_document("c", xml(&key(3), same).as_bytes()).unwrap(),
            parse_document("a", xml(&key(1), "2024-01-11T08:00:00-03:00").as_bytes()).unwrap(),
            parse_document("b", xml(&key(2), same).as_bytes()).unwrap(),
        ];
        let set: InvoiceSet = docs
            .iter()
            .map(|d| Invoice::from_document(d, Direction::Outbound))
            .collect();
        let order: Vec<&str> = set.chronological().iter().map(|i| i.source_label.as_str()).collect();
        assert_eq!(order, ["b", "c", "a"]);
    }

    #[test]
    fn collecting_keeps_the_first_copy_and_insert_reports_the_rest() {
        let bytes = xml(&key(4), "2024-01-10T10:00:00-03:00");
        let copies: Vec<Invoice> = ["a.xml", "b.xml"]
            .iter()
            .map(|label| Invoice::from_document(&parse_document(label, bytes.as_bytes()).unwrap(), Direction::Outbound))
            .collect();

        let mut set: InvoiceSet = copies.iter().cloned().collect();
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(&key(4)).unwrap().source_label, "a.xml");

        let dup = set.insert(copies[1].clone()).unwrap_err();
        assert_eq!(dup.source_label, "b.xml");
        assert_eq!(dup.kept_source_label, "a.xml");
    }

    proptest! {
        #[test]
        fn reingesting_the_same_bytes_yields_one_invoice(copies in 1usize..8) {
            let bytes = xml(&key(7), "2024-03-01T12:00:00-03:00");
            let mut set = InvoiceSet::new();
            for i in 0..copies {
                let doc = parse_document(&format!("copy-{i}.xml"), bytes.as_bytes()).unwrap();
                set.admit(&doc, &alpha());
            }
            prop_assert_eq!(set.len(), 1);
            prop_assert_eq!(&set.iter().next().unwrap().source_label, "copy-0.xml");
        }
    }
}
