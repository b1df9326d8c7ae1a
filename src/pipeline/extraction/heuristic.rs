//! Rule-based extraction provider. No model calls.
//!
//! Reads labelled header lines for identity facts and table-like rows for
//! line items, and returns the same JSON layout a model-backed provider does.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Map, Value};

use super::{ExtractionError, ExtractionProvider, ProviderOutput};
use crate::models::enums::{DocumentType, SourceShape};
use crate::models::facts::FactKey;

/// Labelled header facts: `(fact, pattern capturing the value)`.
static LABELS: LazyLock<Vec<(FactKey, Regex)>> = LazyLock::new(|| {
    vec![
        (
            FactKey::PatientName,
            Regex::new(r"(?im)^\s*(?:patient(?:\s+name)?|member(?:\s+name)?)\s*:\s*(.+?)\s*$").unwrap(),
        ),
        (
            FactKey::DateOfBirth,
            Regex::new(r"(?im)^\s*(?:DOB|date\s+of\s+birth)\s*:\s*(.+?)\s*$").unwrap(),
        ),
        (
            FactKey::DateOfService,
            Regex::new(r"(?im)^\s*(?:date\s+of\s+service|service\s+date|DOS)\s*:\s*(.+?)\s*$").unwrap(),
        ),
        (
            FactKey::ProviderName,
            Regex::new(r"(?im)^\s*(?:rendering\s+provider|provider|physician|prescriber|dentist)\s*:\s*(.+?)\s*$")
                .unwrap(),
        ),
        (
            FactKey::FacilityName,
            Regex::new(r"(?im)^\s*(?:facility|pharmacy|practice)\s*:\s*(.+?)\s*$").unwrap(),
        ),
    ]
});

/// An unlabelled first line naming a facility.
static FACILITY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:hospital|medical\s+center|clinic|health|pharmacy|dental|dentistry|urgent\s+care|imaging|laboratory|labs?)\b")
        .unwrap()
});

/// One charge row: optional date, optional code, description, 1-4 money columns.
static ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^\s*(?:(?P<date>\d{1,2}/\d{1,2}/\d{2,4}|\d{4}-\d{2}-\d{2})\s+)?",
        r"(?:(?:CPT|CDT|NDC)?[:#]?\s*(?P<code>D\d{4}|\d{5}-\d{3,4}-\d{1,2}|\d{5})\s+)?",
        r"(?P<desc>[A-Za-z].*?)",
        r"\s+(?P<amounts>\$?\d[\d,]*\.\d{2}(?:\s+\$?\d[\d,]*\.\d{2}){0,3})\s*$",
    ))
    .unwrap()
});

static AMOUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$?\d[\d,]*\.\d{2}").unwrap());

static CLAIM_STATUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(processed|paid|denied|pending|adjusted)\b").unwrap());

static QUANTITY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bqty:?\s*(\d+)").unwrap());

static TOOTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\btooth\s*#?\s*(\d{1,2})\b").unwrap());

static FSA_STATEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:FSA|HSA|flexible\s+spending|health\s+savings|reimburse(?:d|ment)?)\b").unwrap()
});

/// Totals and balances look like rows but are not charges.
static SUMMARY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:total|subtotal|balance|amount\s+due|payments?|adjustments?)\b").unwrap()
});

#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicExtractor;

impl HeuristicExtractor {
    pub fn new() -> Self {
        Self
    }

    fn shape_for(text: &str, document_type: DocumentType) -> SourceShape {
        if document_type == DocumentType::Generic && FSA_STATEMENT.is_match(text) {
            SourceShape::Fsa
        } else {
            SourceShape::for_document(document_type)
        }
    }
}

impl ExtractionProvider for HeuristicExtractor {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn extract(
        &self,
        text: &str,
        document_type: DocumentType,
    ) -> Result<ProviderOutput, ExtractionError> {
        let shape = Self::shape_for(text, document_type);
        let mut facts = extract_facts(text);

        let (rows, codes): (Vec<Value>, Vec<Option<String>>) = text
            .lines()
            .filter(|line| !SUMMARY_LINE.is_match(line))
            .filter_map(|line| extract_row(line, shape, &facts))
            .unzip();

        if let Some(code) = codes.into_iter().flatten().next() {
            facts.entry(FactKey::ProcedureCode.as_str()).or_insert(code);
        }
        if document_type != DocumentType::Generic {
            facts.insert(FactKey::DocumentType.as_str(), document_type.as_str().to_string());
        }

        tracing::debug!(
            document_type = %document_type,
            shape = %shape,
            facts = facts.len(),
            rows = rows.len(),
            "Heuristic extraction complete"
        );

        let facts: Map<String, Value> = facts
            .into_iter()
            .map(|(k, v)| (k.to_string(), Value::String(v)))
            .collect();

        Ok(ProviderOutput(json!({
            "facts": facts,
            "line_items": rows,
        })))
    }
}

fn extract_facts(text: &str) -> BTreeMap<&'static str, String> {
    let mut facts = BTreeMap::new();

    for (key, pattern) in LABELS.iter() {
        if let Some(caps) = pattern.captures(text) {
            facts.insert(key.as_str(), caps[1].to_string());
        }
    }

    if !facts.contains_key(FactKey::FacilityName.as_str()) {
        let first = text.lines().map(str::trim).find(|l| !l.is_empty());
        if let Some(line) = first.filter(|l| FACILITY_LINE.is_match(l) && !l.contains(':')) {
            facts.insert(FactKey::FacilityName.as_str(), line.to_string());
        }
    }

    facts
}

/// Build one row object in provider layout plus its procedure code, or
/// `None` if the line is not a charge.
fn extract_row(
    line: &str,
    shape: SourceShape,
    facts: &BTreeMap<&'static str, String>,
) -> Option<(Value, Option<String>)> {
    let caps = ROW.captures(line)?;
    let date = caps.name("date").map(|m| m.as_str().to_string());
    let code = caps.name("code").map(|m| m.as_str().to_string());
    if date.is_none() && code.is_none() {
        return None;
    }

    let mut description = caps["desc"].trim().to_string();
    let amounts: Vec<&str> = AMOUNT
        .find_iter(&caps["amounts"])
        .map(|m| m.as_str())
        .collect();

    let mut row = Map::new();
    row.insert("shape".into(), json!(shape.as_str()));

    let date = date.or_else(|| facts.get(FactKey::DateOfService.as_str()).cloned());
    if let Some(d) = date {
        row.insert("date_of_service".into(), json!(d));
    }

    match shape {
        SourceShape::Medical | SourceShape::Dental => {
            let code_key = if shape == SourceShape::Dental { "cdt_code" } else { "cpt_code" };
            if let Some(c) = &code {
                row.insert(code_key.into(), json!(c));
            }
            if shape == SourceShape::Dental {
                if let Some(t) = TOOTH.captures(&description) {
                    row.insert("tooth_number".into(), json!(&t[1]));
                }
            }
            let (billed, allowed, owed) = match amounts.as_slice() {
                [b] => (Some(*b), None, None),
                [b, o] => (Some(*b), None, Some(*o)),
                [b, a, .., o] => (Some(*b), Some(*a), Some(*o)),
                [] => (None, None, None),
            };
            insert_opt(&mut row, "billed", billed);
            insert_opt(&mut row, "allowed", allowed);
            insert_opt(&mut row, "patient_responsibility", owed);
        }
        SourceShape::Pharmacy => {
            if let Some(c) = &code {
                row.insert("ndc".into(), json!(c));
            }
            if let Some(q) = QUANTITY.captures(&description) {
                row.insert("quantity".into(), json!(&q[1]));
            }
            let (price, paid) = match amounts.as_slice() {
                [p] => (Some(*p), None),
                [p, .., c] => (Some(*p), Some(*c)),
                [] => (None, None),
            };
            insert_opt(&mut row, "billed", price);
            insert_opt(&mut row, "patient_responsibility", paid);
        }
        SourceShape::Insurance => {
            if let Some(status) = CLAIM_STATUS.find(&description) {
                row.insert("status".into(), json!(capitalize(status.as_str())));
                let cleaned = CLAIM_STATUS.replace(&description, "").trim().to_string();
                description = cleaned;
            }
            if let Some(p) = facts.get(FactKey::ProviderName.as_str()) {
                row.insert("provider".into(), json!(p));
            }
            let (billed, allowed, paid, owed) = match amounts.as_slice() {
                [p] => (None, None, Some(*p), None),
                [b, p] => (Some(*b), None, Some(*p), None),
                [b, a, p] => (Some(*b), Some(*a), Some(*p), None),
                [b, a, p, o, ..] => (Some(*b), Some(*a), Some(*p), Some(*o)),
                [] => (None, None, None, None),
            };
            insert_opt(&mut row, "billed", billed);
            insert_opt(&mut row, "allowed", allowed);
            insert_opt(&mut row, "insurance_paid", paid);
            insert_opt(&mut row, "patient_responsibility", owed);
        }
        SourceShape::Fsa => {
            if let Some(status) = CLAIM_STATUS.find(&description) {
                row.insert("status".into(), json!(capitalize(status.as_str())));
                let cleaned = CLAIM_STATUS.replace(&description, "").trim().to_string();
                description = cleaned;
            }
            if let Some(p) = facts.get(FactKey::ProviderName.as_str()) {
                row.insert("provider".into(), json!(p));
            }
            insert_opt(&mut row, "amount", amounts.last().copied());
        }
    }

    row.insert("description".into(), json!(description));
    Some((Value::Object(row), code))
}

fn insert_opt(row: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(v) = value {
        row.insert(key.to_string(), json!(v));
    }
}

fn capitalize(word: &str) -> String {
    let lower = word.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::facts::FactKey;
    use crate::models::value::{Field, Money};
    use crate::pipeline::extraction::parse_provider_output;
    use crate::pipeline::normalize::normalize;
    use uuid::Uuid;

    const MEDICAL: &str = "Mercy General Hospital\n\
        Patient: Jane Roe\n\
        DOB: 04/02/1985\n\
        Provider: Dr. Alvarez\n\
        Statement Date: 03/20/2024\n\
        03/14/2024 99213 Office visit, established $180.00 $95.40 $45.00\n\
        03/14/2024 36415 Venipuncture $25.00 $25.00\n\
        Total $205.00\n\
        Amount Due: $70.00\n";

    fn run(text: &str, doc: DocumentType) -> Value {
        HeuristicExtractor::new().extract(text, doc).unwrap().0
    }

    #[test]
    fn medical_bill_facts() {
        let out = run(MEDICAL, DocumentType::MedicalBill);
        let facts = &out["facts"];
        assert_eq!(facts["facility_name"], "Mercy General Hospital");
        assert_eq!(facts["patient_name"], "Jane Roe");
        assert_eq!(facts["date_of_birth"], "04/02/1985");
        assert_eq!(facts["provider_name"], "Dr. Alvarez");
        assert_eq!(facts["procedure_code"], "99213");
        assert_eq!(facts["document_type"], "medical_bill");
    }

    #[test]
    fn medical_bill_rows_skip_totals() {
        let out = run(MEDICAL, DocumentType::MedicalBill);
        let rows = out["line_items"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["cpt_code"], "99213");
        assert_eq!(rows[0]["description"], "Office visit, established");
        assert_eq!(rows[0]["billed"], "$180.00");
        assert_eq!(rows[0]["allowed"], "$95.40");
        assert_eq!(rows[0]["patient_responsibility"], "$45.00");
        assert_eq!(rows[1]["patient_responsibility"], "$25.00");
    }

    #[test]
    fn output_feeds_parser_and_normalizer() {
        let out = run(MEDICAL, DocumentType::MedicalBill);
        let extraction = parse_provider_output(&out, DocumentType::MedicalBill);
        assert_eq!(extraction.facts.get(FactKey::PatientName), Some("Jane Roe"));
        let items = normalize(Uuid::new_v4(), &extraction.line_items);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].billed, Field::Known(Money::from_cents(18000)));
        assert_eq!(items[0].date_of_service.to_string(), "2024-03-14");
        assert!(items.iter().all(|i| i.diagnostics.is_empty()));
    }

    #[test]
    fn eob_rows_carry_status_and_provider() {
        let text = "EXPLANATION OF BENEFITS - THIS IS NOT A BILL\n\
            Member: Jane Roe\n\
            Provider: Mercy General Hospital\n\
            2024-03-14 Office visit Processed $180.00 $95.40 $76.32 $19.08\n\
            2024-03-14 Venipuncture Denied $25.00 $0.00 $0.00 $25.00\n";
        let out = run(text, DocumentType::InsuranceEob);
        let rows = out["line_items"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["shape"], "insurance");
        assert_eq!(rows[0]["status"], "Processed");
        assert_eq!(rows[0]["description"], "Office visit");
        assert_eq!(rows[0]["insurance_paid"], "$76.32");
        assert_eq!(rows[0]["provider"], "Mercy General Hospital");
        assert_eq!(rows[1]["status"], "Denied");
        assert_eq!(out["facts"]["patient_name"], "Jane Roe");
    }

    #[test]
    fn dental_rows_carry_tooth() {
        let text = "Bright Smiles Dental\nPatient: Jane Roe\n\
            03/02/2024 D2740 Crown porcelain tooth #14 $1,250.00 $400.00\n";
        let out = run(text, DocumentType::DentalBill);
        let row = &out["line_items"][0];
        assert_eq!(row["cdt_code"], "D2740");
        assert_eq!(row["tooth_number"], "14");
        assert_eq!(row["billed"], "$1,250.00");
        assert_eq!(out["facts"]["facility_name"], "Bright Smiles Dental");
    }

    #[test]
    fn pharmacy_rows_use_header_date() {
        let text = "CVS Pharmacy\nDate of Service: 03/02/2024\n\
            NDC 00093-7339-01 Lisinopril 10 mg QTY 30 $14.99 $10.00\n";
        let out = run(text, DocumentType::PharmacyReceipt);
        let row = &out["line_items"][0];
        assert_eq!(row["ndc"], "00093-7339-01");
        assert_eq!(row["quantity"], "30");
        assert_eq!(row["date_of_service"], "03/02/2024");
        assert_eq!(row["patient_responsibility"], "$10.00");
    }

    #[test]
    fn fsa_statement_detected_for_generic_documents() {
        let text = "Flexible Spending Account - Reimbursement Summary\n\
            03/20/2024 Office visit Paid $45.00\n";
        let out = run(text, DocumentType::Generic);
        let row = &out["line_items"][0];
        assert_eq!(row["shape"], "fsa");
        assert_eq!(row["amount"], "$45.00");
        assert_eq!(row["status"], "Paid");
        assert!(out["facts"].get("document_type").is_none());
    }

    #[test]
    fn prose_yields_no_rows() {
        let out = run("Thank you for your visit. Call us at 555-0100.", DocumentType::Generic);
        assert_eq!(out["line_items"].as_array().unwrap().len(), 0);
        assert_eq!(out["facts"].as_object().unwrap().len(), 0);
    }
}
