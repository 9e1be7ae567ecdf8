//! Vehicle identification from free-text product descriptions.
//!
//! Dealers frequently omit the `veicProd` group (used cars bought from
//! individuals, manual issuance) and write the chassis, plate and RENAVAM in
//! `xProd` instead, e.g. `GOL 1.0 CHASSI: 9BWAA05U6CP000001 PLACA ABC-1D23`.

use autofiscal_core::Chassis;

const CHASSIS_LABELS: &[&str] = &["CHASSI", "CHAS", "CH"];
const PLATE_LABELS: &[&str] = &["PLACA", "PL"];
const RENAVAM_LABELS: &[&str] = &["RENAVAM", "RENAV", "REN"];

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_ascii_uppercase)
        .collect()
}

/// Tokens that immediately follow any of the given labels.
fn after_labels<'a>(tokens: &'a [String], labels: &'a [&str]) -> impl Iterator<Item = usize> + 'a {
    tokens
        .iter()
        .enumerate()
        .filter(move |(_, t)| labels.contains(&t.as_str()))
        .map(|(i, _)| i + 1)
        .filter(move |&i| i < tokens.len())
}

fn is_standalone_vin(token: &str) -> bool {
    token.len() == Chassis::LEN
        && token.chars().all(Chassis::is_vin_char)
        && token.chars().any(|c| c.is_ascii_digit())
        && token.chars().any(|c| c.is_ascii_alphabetic())
}

/// Chassis written in the description: labelled first, then any VIN-shaped token.
pub fn find_chassis(description: &str) -> Option<Chassis> {
    let tokens = tokens(description);
    after_labels(&tokens, CHASSIS_LABELS)
        .find_map(|i| Chassis::parse(&tokens[i]).ok())
        .or_else(|| {
            tokens
                .iter()
                .find(|t| is_standalone_vin(t))
                .and_then(|t| Chassis::parse(t).ok())
        })
}

/// Mercosul (`AAA9A99`) or legacy (`AAA9999`) plate.
pub fn is_plate(candidate: &str) -> bool {
    let b = candidate.as_bytes();
    b.len() == 7
        && b[..3].iter().all(u8::is_ascii_uppercase)
        && b[3].is_ascii_digit()
        && (b[4].is_ascii_uppercase() || b[4].is_ascii_digit())
        && b[5..].iter().all(u8::is_ascii_digit)
}

/// Plate after a `PLACA`/`PL` label, allowing the legacy `ABC-1234` spelling.
pub fn find_plate(description: &str) -> Option<String> {
    let tokens = tokens(description);
    after_labels(&tokens, PLATE_LABELS).find_map(|i| {
        if is_plate(&tokens[i]) {
            return Some(tokens[i].clone());
        }
        let joined = format!("{}{}", tokens[i], tokens.get(i + 1)?);
        is_plate(&joined).then_some(joined)
    })
}

/// RENAVAM (9 to 11 digits) after its label.
pub fn find_renavam(description: &str) -> Option<String> {
    let tokens = tokens(description);
    after_labels(&tokens, RENAVAM_LABELS)
        .map(|i| &tokens[i])
        .find(|t| (9..=11).contains(&t.len()) && t.bytes().all(|b| b.is_ascii_digit()))
        .cloned()
}
