#![allow(dead_code)]

use autofiscal_config::{CompanyConfig, CompanyDirectory, TaxRegime, TaxRule};
use autofiscal_core::{AccessKey, TaxId};
use autofiscal_pipeline::SourceDocument;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const ALPHA: &str = "11111111000111";
pub const BETA: &str = "44444444000144";
pub const SUPPLIER: &str = "22222222000122";
pub const CUSTOMER_CPF: &str = "12345678909";

pub const VIN123: &str = "9BWAA05U6CP000123";
pub const VIN999: &str = "9BWAA05U6CP000999";
pub const VIN_OLD: &str = "98M50AA00L4A92818";

pub fn tax_id(raw: &str) -> TaxId {
    TaxId::parse(raw).unwrap()
}

pub fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
}

/// MVA 30%, internal rate 18% on every default sale CFOP.
pub fn vehicle_regime() -> TaxRegime {
    TaxRegime::default().with_rule(TaxRule::new(
        "vehicles",
        &["5101", "5102", "5403", "5405", "6102", "6403", "6404"],
        dec!(0.30),
        dec!(0.18),
    ))
}

pub fn directory() -> CompanyDirectory {
    CompanyDirectory::new([
        CompanyConfig::new(tax_id(ALPHA), "Alpha Veiculos", vehicle_regime()),
        CompanyConfig::new(tax_id(BETA), "Beta Motors", vehicle_regime()),
    ])
    .unwrap()
}

#[derive(Debug, Clone)]
pub struct Item {
    pub chassis: Option<String>,
    pub description: String,
    pub cfop: String,
    pub value: Decimal,
    pub icms: Option<Decimal>,
    pub icms_st: Option<Decimal>,
}

impl Item {
    pub fn vehicle(chassis: &str, cfop: &str, value: Decimal) -> Self {
        Self {
            chassis: Some(chassis.to_string()),
            description: "AUTOMOVEL GOL 1.0".to_string(),
            cfop: cfop.to_string(),
            value,
            icms: None,
            icms_st: None,
        }
    }

    pub fn icms(mut self, value: Decimal) -> Self {
        self.icms = Some(value);
        self
    }

    pub fn icms_st(mut self, value: Decimal) -> Self {
        self.icms_st = Some(value);
        self
    }
}

/// Minimal NFe writer for scenario inputs.
#[derive(Debug, Clone)]
pub struct Nfe {
    pub seq: u32,
    pub issuer: String,
    pub recipient: String,
    pub issued_at: String,
    pub references: Vec<AccessKey>,
    pub items: Vec<Item>,
}

impl Nfe {
    pub fn new(seq: u32, issuer: &str, recipient: &str, day: &str) -> Self {
        Self {
            seq,
            issuer: issuer.to_string(),
            recipient: recipient.to_string(),
            issued_at: format!("{day}T10:00:00-03:00"),
            references: Vec::new(),
            items: Vec::new(),
        }
    }

    pub fn item(mut self, item: Item) -> Self {
        self.items.push(item);
        self
    }

    pub fn referencing(mut self, key: AccessKey) -> Self {
        self.references.push(key);
        self
    }

    pub fn key(&self) -> AccessKey {
        let yymm = format!("{}{}", &self.issued_at[2..4], &self.issued_at[5..7]);
        let issuer = format!("{:0>14}", self.issuer);
        let seq = self.seq;
        AccessKey::with_check_digit(&format!("35{yymm}{issuer}55001{seq:09}1{seq:08}")).unwrap()
    }

    pub fn xml(&self) -> String {
        let party = |tag: &str, id: &str| {
            if id.len() == 14 {
                format!("<{tag}><CNPJ>{id}</CNPJ></{tag}>")
            } else {
                format!("<{tag}><CPF>{id}</CPF></{tag}>")
            }
        };
        let refs: String = self
            .references
            .iter()
            .map(|k| format!("<NFref><refNFe>{k}</refNFe></NFref>"))
            .collect();
        let items: String = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let veic = item
                    .chassis
                    .as_ref()
                    .map(|c| format!("<veicProd><chassi>{c}</chassi></veicProd>"))
                    .unwrap_or_default();
                let icms: String = [
                    item.icms.map(|v| format!("<vICMS>{v}</vICMS>")),
                    item.icms_st.map(|v| format!("<vICMSST>{v}</vICMSST>")),
                ]
                .into_iter()
                .flatten()
                .collect();
                format!(
                    "<det nItem=\"{n}\"><prod><xProd>{desc}</xProd><NCM>87032100</NCM><CFOP>{cfop}</CFOP>\
                     <vProd>{value}</vProd>{veic}</prod><imposto><ICMS><ICMS10>{icms}</ICMS10></ICMS></imposto></det>",
                    n = i + 1,
                    desc = item.description,
                    cfop = item.cfop,
                    value = item.value,
                )
            })
            .collect();
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <nfeProc xmlns=\"http://www.portalfiscal.inf.br/nfe\"><NFe><infNFe Id=\"NFe{key}\" versao=\"4.00\">\
             <ide><mod>55</mod><nNF>{seq}</nNF><dhEmi>{issued}</dhEmi>{refs}</ide>{emit}{dest}{items}\
             </infNFe></NFe></nfeProc>",
            key = self.key(),
            seq = self.seq,
            issued = self.issued_at,
            emit = party("emit", &self.issuer),
            dest = party("dest", &self.recipient),
        )
    }

    pub fn source(&self) -> SourceDocument {
        SourceDocument::new(format!("nfe-{}.xml", self.seq), self.xml())
    }
}

/// Scenario "Alpha": bought at 50,000 on 2024-01-10, sold at 60,000 on
/// 2024-02-15 with declared ICMS-ST 4,000 against an expected 4,320.
pub fn alpha_documents() -> Vec<Nfe> {
    vec![
        Nfe::new(1, SUPPLIER, ALPHA, "2024-01-10")
            .item(Item::vehicle(VIN123, "5102", dec!(50000.00)).icms(dec!(6000.00))),
        Nfe::new(2, ALPHA, CUSTOMER_CPF, "2024-02-15").item(
            Item::vehicle(VIN123, "5405", dec!(60000.00))
                .icms(dec!(9720.00))
                .icms_st(dec!(4000.00)),
        ),
    ]
}
