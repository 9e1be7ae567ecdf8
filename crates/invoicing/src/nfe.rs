//! NFe XML parsing.
//!
//! Accepts both a bare `NFe` and the authorized `nfeProc` envelope. Namespace
//! prefixes are ignored (elements are matched by local name).

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use rust_decimal::Decimal;

use autofiscal_core::{AccessKey, Chassis, TaxId};

use crate::document::{DocumentType, InvoiceItem, ItemTaxes, NfeDocument, VehicleAttributes};
use crate::error::IngestError;
use crate::vehicle_id;

/// Model code of the vehicle invoice profile (NF-e).
pub const NFE_MODEL: &str = "55";

const ROOT_ELEMENTS: &[&str] = &["NFe", "nfeProc"];

/// Parse one XML document into an [`NfeDocument`].
///
/// Pure function of its input: no filesystem or network access.
pub fn parse_document(source_label: &str, bytes: &[u8]) -> Result<NfeDocument, IngestError> {
    let text = decode(bytes);
    let mut reader = Reader::from_str(&text);
    reader.config_mut().trim_text(true);

    let mut raw = RawNfe::default();
    let mut path: Vec<String> = Vec::new();
    let mut saw_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = local_name(e);
                if !saw_root {
                    check_root(source_label, &name)?;
                    saw_root = true;
                }
                raw.open(source_label, &name, e)?;
                path.push(name);
            }
            Ok(Event::Empty(ref e)) => {
                if !saw_root {
                    check_root(source_label, &local_name(e))?;
                    saw_root = true;
                }
            }
            Ok(Event::Text(ref e)) => {
                let value = e
                    .unescape()
                    .map_err(|err| IngestError::malformed(source_label, format!("bad text node: {err}")))?;
                let value = value.trim();
                if !value.is_empty() {
                    raw.text(&path, value);
                }
            }
            Ok(Event::End(_)) => {
                if path.pop().as_deref() == Some("det") {
                    raw.close_item();
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(IngestError::malformed(
                    source_label,
                    format!("XML parse error: {e}"),
                ));
            }
            _ => {}
        }
    }

    if !saw_root {
        return Err(IngestError::malformed(source_label, "document has no root element"));
    }
    if !path.is_empty() {
        return Err(IngestError::malformed(source_label, "unexpected end of document"));
    }

    raw.into_document(source_label)
}

/// UTF-8 first (with or without BOM), then Latin-1, which older emitters still use.
fn decode(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => Cow::Owned(bytes.iter().map(|&b| b as char).collect()),
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn check_root(source_label: &str, name: &str) -> Result<(), IngestError> {
    if ROOT_ELEMENTS.contains(&name) {
        Ok(())
    } else {
        Err(IngestError::unsupported(
            source_label,
            format!("root element <{name}> is not an NFe"),
        ))
    }
}

fn ends_with(path: &[String], suffix: &[&str]) -> bool {
    path.len() >= suffix.len()
        && path[path.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(a, b)| a == b)
}

#[derive(Debug, Default)]
struct RawItem {
    number: Option<String>,
    description: Option<String>,
    ncm: Option<String>,
    cfop: Option<String>,
    value: Option<String>,
    chassis: Option<String>,
    color: Option<String>,
    model_year: Option<String>,
    manufacture_year: Option<String>,
    engine_number: Option<String>,
    icms_base: Option<String>,
    icms_rate: Option<String>,
    icms_value: Option<String>,
    st_base: Option<String>,
    st_value: Option<String>,
    ipi_value: Option<String>,
}

impl RawItem {
    fn text(&mut self, path: &[String], value: &str) {
        let slot = if ends_with(path, &["prod", "xProd"]) {
            &mut self.description
        } else if ends_with(path, &["prod", "NCM"]) {
            &mut self.ncm
        } else if ends_with(path, &["prod", "CFOP"]) {
            &mut self.cfop
        } else if ends_with(path, &["prod", "vProd"]) {
            &mut self.value
        } else if ends_with(path, &["veicProd", "chassi"]) {
            &mut self.chassis
        } else if ends_with(path, &["veicProd", "xCor"]) {
            &mut self.color
        } else if ends_with(path, &["veicProd", "anoMod"]) {
            &mut self.model_year
        } else if ends_with(path, &["veicProd", "anoFab"]) {
            &mut self.manufacture_year
        } else if ends_with(path, &["veicProd", "nMotor"]) {
            &mut self.engine_number
        } else if ends_with(path, &["IPITrib", "vIPI"]) {
            &mut self.ipi_value
        } else if path.len() >= 3 && path[path.len() - 3] == "ICMS" {
            match path[path.len() - 1].as_str() {
                "vBC" => &mut self.icms_base,
                "pICMS" => &mut self.icms_rate,
                "vICMS" => &mut self.icms_value,
                "vBCST" => &mut self.st_base,
                "vICMSST" => &mut self.st_value,
                _ => return,
            }
        } else {
            return;
        };
        *slot = Some(value.to_string());
    }
}

#[derive(Debug, Default)]
struct RawNfe {
    access_key: Option<String>,
    model: Option<String>,
    number: Option<String>,
    issued_at: Option<String>,
    issue_date: Option<String>,
    document_type: Option<String>,
    nature: Option<String>,
    issuer_cnpj: Option<String>,
    issuer_cpf: Option<String>,
    recipient_cnpj: Option<String>,
    recipient_cpf: Option<String>,
    references: Vec<String>,
    items: Vec<RawItem>,
    current: Option<RawItem>,
}

impl RawNfe {
    fn open(&mut self, source_label: &str, name: &str, e: &BytesStart<'_>) -> Result<(), IngestError> {
        let attribute = |key: &str| -> Result<Option<String>, IngestError> {
            let attr = e.try_get_attribute(key).map_err(|err| {
                IngestError::malformed(source_label, format!("bad attribute on <{name}>: {err}"))
            })?;
            attr.map(|a| {
                a.unescape_value().map(Cow::into_owned).map_err(|err| {
                    IngestError::malformed(source_label, format!("bad attribute on <{name}>: {err}"))
                })
            })
            .transpose()
        };

        match name {
            "infNFe" => self.access_key = attribute("Id")?,
            "det" => {
                self.current = Some(RawItem {
                    number: attribute("nItem")?,
                    ..RawItem::default()
                });
            }
            _ => {}
        }
        Ok(())
    }

    fn close_item(&mut self) {
        if let Some(item) = self.current.take() {
            self.items.push(item);
        }
    }

    fn text(&mut self, path: &[String], value: &str) {
        if let Some(item) = self.current.as_mut() {
            item.text(path, value);
            return;
        }

        let slot = if ends_with(path, &["ide", "mod"]) {
            &mut self.model
        } else if ends_with(path, &["ide", "nNF"]) {
            &mut self.number
        } else if ends_with(path, &["ide", "dhEmi"]) {
            &mut self.issued_at
        } else if ends_with(path, &["ide", "dEmi"]) {
            &mut self.issue_date
        } else if ends_with(path, &["ide", "tpNF"]) {
            &mut self.document_type
        } else if ends_with(path, &["ide", "natOp"]) {
            &mut self.nature
        } else if ends_with(path, &["emit", "CNPJ"]) {
            &mut self.issuer_cnpj
        } else if ends_with(path, &["emit", "CPF"]) {
            &mut self.issuer_cpf
        } else if ends_with(path, &["dest", "CNPJ"]) {
            &mut self.recipient_cnpj
        } else if ends_with(path, &["dest", "CPF"]) {
            &mut self.recipient_cpf
        } else {
            if ends_with(path, &["NFref", "refNFe"]) {
                self.references.push(value.to_string());
            }
            return;
        };
        *slot = Some(value.to_string());
    }

    fn into_document(self, source_label: &str) -> Result<NfeDocument, IngestError> {
        let malformed = |reason: String| IngestError::malformed(source_label, reason);

        if let Some(model) = self.model.as_deref() {
            if model != NFE_MODEL {
                return Err(IngestError::unsupported(
                    source_label,
                    format!("document model {model} is not NF-e ({NFE_MODEL})"),
                ));
            }
        }

        let raw_key = self
            .access_key
            .ok_or_else(|| malformed("infNFe@Id is missing".to_string()))?;
        let access_key = AccessKey::parse(&raw_key).map_err(|e| malformed(e.to_string()))?;
        if access_key.model() != NFE_MODEL {
            return Err(IngestError::unsupported(
                source_label,
                format!("access key model {} is not NF-e ({NFE_MODEL})", access_key.model()),
            ));
        }

        let issued_at = self
            .issued_at
            .as_deref()
            .or(self.issue_date.as_deref())
            .ok_or_else(|| malformed("ide/dhEmi is missing".to_string()))
            .and_then(|raw| {
                parse_timestamp(raw).ok_or_else(|| malformed(format!("invalid issue date {raw:?}")))
            })?;

        let issuer_raw = self
            .issuer_cnpj
            .or(self.issuer_cpf)
            .ok_or_else(|| malformed("emit/CNPJ is missing".to_string()))?;
        let issuer = TaxId::parse(&issuer_raw).map_err(|e| malformed(e.to_string()))?;

        let recipient = self
            .recipient_cnpj
            .or(self.recipient_cpf)
            .map(|raw| TaxId::parse(&raw))
            .transpose()
            .map_err(|e| malformed(e.to_string()))?;

        let document_type = match self.document_type.as_deref() {
            Some("0") => Some(DocumentType::Entry),
            Some("1") => Some(DocumentType::Exit),
            _ => None,
        };

        let mut referenced_keys = Vec::new();
        for raw in &self.references {
            match AccessKey::parse(raw) {
                Ok(key) => referenced_keys.push(key),
                Err(e) => {
                    tracing::warn!(source = source_label, reference = %raw, error = %e, "ignoring invalid refNFe");
                }
            }
        }

        if self.items.is_empty() {
            return Err(malformed("document has no det items".to_string()));
        }

        let mut items = Vec::with_capacity(self.items.len());
        let mut seen = BTreeSet::new();
        for (index, raw) in self.items.into_iter().enumerate() {
            let item = build_item(index, raw).map_err(&malformed)?;
            if let Some(chassis) = &item.chassis {
                if !seen.insert(chassis.clone()) {
                    return Err(malformed(format!(
                        "chassis {chassis} appears on more than one item"
                    )));
                }
            }
            items.push(item);
        }

        Ok(NfeDocument {
            access_key,
            source_label: source_label.to_string(),
            number: self.number,
            issued_at,
            document_type,
            nature: self.nature,
            issuer,
            recipient,
            referenced_keys,
            items,
        })
    }
}

/// NFe amounts (`TDec_1302` and narrower) carry at most 13 integer digits.
const MAX_INTEGER_DIGITS: u32 = 13;

fn amount_limit() -> Decimal {
    Decimal::from(10_i64.pow(MAX_INTEGER_DIGITS))
}

fn build_item(index: usize, raw: RawItem) -> Result<InvoiceItem, String> {
    let number = raw
        .number
        .as_deref()
        .and_then(|n| n.parse().ok())
        .unwrap_or(index as u32 + 1);
    let field = |name: &str, value: Option<&str>| -> Result<Option<Decimal>, String> {
        value
            .map(|v| {
                let amount = Decimal::from_str(v)
                    .map_err(|_| format!("item {number}: invalid {name} {v:?}"))?;
                if amount.abs() >= amount_limit() {
                    return Err(format!(
                        "item {number}: {name} {v:?} has more than {MAX_INTEGER_DIGITS} integer digits"
                    ));
                }
                Ok(amount)
            })
            .transpose()
    };

    let cfop = raw
        .cfop
        .clone()
        .ok_or_else(|| format!("item {number}: prod/CFOP is missing"))?;
    let value = field("vProd", raw.value.as_deref())?
        .ok_or_else(|| format!("item {number}: prod/vProd is missing"))?;
    let taxes = ItemTaxes {
        icms_base: field("vBC", raw.icms_base.as_deref())?,
        icms_rate: field("pICMS", raw.icms_rate.as_deref())?,
        icms_value: field("vICMS", raw.icms_value.as_deref())?,
        st_base: field("vBCST", raw.st_base.as_deref())?,
        st_value: field("vICMSST", raw.st_value.as_deref())?,
        ipi_value: field("vIPI", raw.ipi_value.as_deref())?,
    };

    let description = raw.description.unwrap_or_default();
    let chassis = raw
        .chassis
        .as_deref()
        .and_then(|c| Chassis::parse(c).ok())
        .or_else(|| vehicle_id::find_chassis(&description));

    let vehicle = VehicleAttributes {
        plate: vehicle_id::find_plate(&description),
        renavam: vehicle_id::find_renavam(&description),
        color: raw.color,
        model_year: raw.model_year.and_then(|y| y.parse().ok()),
        manufacture_year: raw.manufacture_year.and_then(|y| y.parse().ok()),
        engine_number: raw.engine_number,
    };

    Ok(InvoiceItem {
        number,
        description,
        ncm: raw.ncm,
        cfop,
        value,
        chassis,
        vehicle,
        taxes,
    })
}

fn brasilia() -> Option<FixedOffset> {
    FixedOffset::west_opt(3 * 3600)
}

/// `dhEmi` is RFC 3339; legacy `dEmi` is a bare date. Offsets default to Brasília.
fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .or_else(|| {
            let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?.and_hms_opt(0, 0, 0))?;
            brasilia()?.from_local_datetime(&naive).single()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn key(seq: u32, model: &str) -> AccessKey {
        let body = format!("35240111111111000111{model}001{seq:09}1{seq:08}");
        AccessKey::with_check_digit(&body).unwrap()
    }

    fn sample(key: &AccessKey) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<nfeProc xmlns="http://www.portalfiscal.inf.br/nfe" versao="4.00">
  <NFe>
    <infNFe Id="NFe{key}" versao="4.00">
      <ide><mod>55</mod><nNF>7</nNF><natOp>VENDA</natOp><tpNF>1</tpNF>
        <dhEmi>2024-02-15T10:30:00-03:00</dhEmi>
        <NFref><refNFe>{key}</refNFe></NFref>
      </ide>
      <emit><CNPJ>11111111000111</CNPJ><xNome>Alpha</xNome></emit>
      <dest><CPF>12345678909</CPF></dest>
      <det nItem="1">
        <prod>
          <xProd>ONIX 1.0 PLACA ABC1D23</xProd><NCM>87032100</NCM><CFOP>5405</CFOP><vProd>60000.00</vProd>
          <veicProd><chassi>9BGKS48U0LG000001</chassi><xCor>BRANCO</xCor><anoMod>2020</anoMod><anoFab>2019</anoFab></veicProd>
        </prod>
        <imposto>
          <ICMS><ICMS10><vBC>54000.00</vBC><pICMS>18.00</pICMS><vICMS>9720.00</vICMS><vBCST>78000.00</vBCST><vICMSST>4000.00</vICMSST></ICMS10></ICMS>
          <IPI><IPITrib><vIPI>0.00</vIPI></IPITrib></IPI>
        </imposto>
      </det>
      <det nItem="2">
        <prod><xProd>TAPETE</xProd><CFOP>5102</CFOP><vProd>150.00</vProd></prod>
      </det>
    </infNFe>
  </NFe>
  <protNFe><infProt><chNFe>{key}</chNFe></infProt></protNFe>
</nfeProc>"#
        )
    }

    #[test]
    fn parses_header_items_and_taxes() {
        let k = key(1, "55");
        let doc = parse_document("a.xml", sample(&k).as_bytes()).unwrap();

        assert_eq!(doc.access_key, k);
        assert_eq!(doc.number.as_deref(), Some("7"));
        assert_eq!(doc.document_type, Some(DocumentType::Exit));
        assert_eq!(doc.issuer.as_str(), "11111111000111");
        assert_eq!(doc.recipient.as_ref().unwrap().as_str(), "12345678909");
        assert_eq!(doc.issue_date(), NaiveDate::from_ymd_opt(2024, 2, 15).unwrap());
        assert_eq!(doc.referenced_keys, vec![k.clone()]);
        assert_eq!(doc.items.len(), 2);

        let car = &doc.items[0];
        assert_eq!(car.chassis.as_ref().unwrap().as_str(), "9BGKS48U0LG000001");
        assert_eq!(car.cfop, "5405");
        assert_eq!(car.value, dec!(60000.00));
        assert_eq!(car.taxes.icms_value, Some(dec!(9720.00)));
        assert_eq!(car.taxes.st_value, Some(dec!(4000.00)));
        assert_eq!(car.taxes.ipi_value, Some(dec!(0.00)));
        assert_eq!(car.vehicle.plate.as_deref(), Some("ABC1D23"));
        assert_eq!(car.vehicle.model_year, Some(2020));

        let mat = &doc.items[1];
        assert!(mat.chassis.is_none());
        // Absent tax tags stay absent rather than becoming zero.
        assert_eq!(mat.taxes.st_value, None);
        assert_eq!(mat.taxes.icms_value, None);
    }

    #[test]
    fn latin1_bytes_are_accepted() {
        let k = key(2, "55");
        let xml = sample(&k).replace("UTF-8", "ISO-8859-1").replace("TAPETE", "TAPETE\u{e7}");
        let bytes: Vec<u8> = xml.chars().map(|c| c as u32 as u8).collect();
        let doc = parse_document("latin1.xml", &bytes).unwrap();
        assert_eq!(doc.items[1].description, "TAPETE\u{e7}");
    }

    #[test]
    fn non_nfe_root_is_unsupported() {
        let err = parse_document("ev.xml", b"<procEventoNFe><evento/></procEventoNFe>").unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedDocumentType { .. }));
    }

    #[test]
    fn nfce_model_is_unsupported() {
        let k = key(3, "65");
        let xml = sample(&k).replace("<mod>55</mod>", "<mod>65</mod>");
        let err = parse_document("nfce.xml", xml.as_bytes()).unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedDocumentType { .. }));
    }

    #[test]
    fn broken_xml_is_malformed() {
        let err = parse_document("bad.xml", b"<NFe><infNFe Id=\"x\">").unwrap_err();
        assert!(matches!(err, IngestError::MalformedDocument { .. }));

        let err = parse_document("empty.xml", b"").unwrap_err();
        assert!(matches!(err, IngestError::MalformedDocument { .. }));
    }

    #[test]
    fn missing_required_nodes_are_malformed() {
        let k = key(4, "55");
        let cases = [
            sample(&k).replace(&format!("Id=\"NFe{k}\""), ""),
            sample(&k).replace("<dhEmi>2024-02-15T10:30:00-03:00</dhEmi>", ""),
            sample(&k).replace("<emit><CNPJ>11111111000111</CNPJ>", "<emit>"),
            sample(&k).replace("<vProd>60000.00</vProd>", ""),
            sample(&k).replace("<vProd>60000.00</vProd>", "<vProd>sessenta</vProd>"),
        ];
        for xml in cases {
            let err = parse_document("x.xml", xml.as_bytes()).unwrap_err();
            assert!(matches!(err, IngestError::MalformedDocument { .. }), "{err}");
        }
    }

    #[test]
    fn amounts_past_thirteen_integer_digits_are_malformed() {
        let k = key(6, "55");
        let largest = sample(&k).replace("<vProd>60000.00</vProd>", "<vProd>9999999999999.99</vProd>");
        let doc = parse_document("max.xml", largest.as_bytes()).unwrap();
        assert_eq!(doc.items[0].value, dec!(9999999999999.99));

        for (tag, huge) in [
            ("vProd", "<vProd>70000000000000000000000000000</vProd>"),
            ("vICMSST", "<vICMSST>10000000000000.00</vICMSST>"),
        ] {
            let xml = sample(&k)
                .replace("<vProd>60000.00</vProd>", if tag == "vProd" { huge } else { "<vProd>60000.00</vProd>" })
                .replace("<vICMSST>4000.00</vICMSST>", if tag == "vICMSST" { huge } else { "<vICMSST>4000.00</vICMSST>" });
            let err = parse_document("huge.xml", xml.as_bytes()).unwrap_err();
            assert!(matches!(err, IngestError::MalformedDocument { ref reason, .. } if reason.contains(tag)), "{err}");
        }
    }

    #[test]
    fn repeated_chassis_in_one_document_is_malformed() {
        let k = key(5, "55");
        let xml = sample(&k).replace("<xProd>TAPETE</xProd>", "<xProd>CHASSI 9BGKS48U0LG000001</xProd>");
        let err = parse_document("dup.xml", xml.as_bytes()).unwrap_err();
        assert!(matches!(err, IngestError::MalformedDocument { reason, .. } if reason.contains("more than one item")));
    }

    #[test]
    fn legacy_issue_date_defaults_to_brasilia_offset() {
        let ts = parse_timestamp("2010-05-03").unwrap();
        assert_eq!(ts.offset().local_minus_utc(), -3 * 3600);
        assert_eq!(ts.date_naive(), NaiveDate::from_ymd_opt(2010, 5, 3).unwrap());
    }
}
