//! Lenient conversion of provider JSON into facts and raw line items.

use std::str::FromStr;

use serde_json::{Map, Value};

use crate::models::diagnostic::Diagnostic;
use crate::models::enums::{DocumentType, SourceShape};
use crate::models::facts::{ExtractedFacts, FactKey};
use crate::pipeline::normalize::{
    RawDentalItem, RawFsaItem, RawInsuranceItem, RawLineItem, RawMedicalItem, RawPharmacyItem,
};

/// Keys that may hold the line-item array.
const ROW_KEYS: &[&str] = &["line_items", "items", "charges", "claims"];

/// Parsed provider output, before normalization.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub facts: ExtractedFacts,
    pub line_items: Vec<RawLineItem>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Read facts and line-item records from provider JSON.
///
/// Accepts `{"facts": {...}, "line_items": [...]}`, fact keys at the top
/// level, `items`/`charges`/`claims` instead of `line_items`, or a bare array
/// of rows. Rows that are not objects are skipped with a diagnostic; every
/// object row is kept, whatever its fields hold. A row's shape comes from its
/// `shape` key, then from telltale keys, then from the document type.
pub fn parse_provider_output(value: &Value, document_type: DocumentType) -> Extraction {
    let mut extraction = Extraction::default();

    let rows: &[Value] = match value {
        Value::Array(rows) => rows,
        Value::Object(root) => {
            extraction.facts = parse_facts(root);
            ROW_KEYS
                .iter()
                .find_map(|k| root.get(*k).and_then(Value::as_array))
                .map(Vec::as_slice)
                .unwrap_or(&[])
        }
        _ => {
            extraction.diagnostics.push(Diagnostic::skipped_record(
                0,
                "provider output is neither an object nor an array",
            ));
            &[]
        }
    };

    let fallback = SourceShape::for_document(document_type);
    for (index, row) in rows.iter().enumerate() {
        let Value::Object(fields) = row else {
            extraction
                .diagnostics
                .push(Diagnostic::skipped_record(index, "row is not an object"));
            continue;
        };

        extraction.line_items.push(parse_row(fields, fallback));
    }

    tracing::debug!(
        facts = extraction.facts.known_count(),
        rows = extraction.line_items.len(),
        skipped = extraction.diagnostics.len(),
        "Provider output parsed"
    );

    extraction
}

fn parse_facts(root: &Map<String, Value>) -> ExtractedFacts {
    let nested = root.get("facts").and_then(Value::as_object);

    FactKey::ALL.iter().fold(ExtractedFacts::new(), |facts, key| {
        let value = nested
            .and_then(|n| n.get(key.as_str()))
            .or_else(|| root.get(key.as_str()))
            .and_then(scalar_text);
        match value {
            Some(v) => facts.with(*key, v),
            None => facts,
        }
    })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_row(fields: &Map<String, Value>, fallback: SourceShape) -> RawLineItem {
    let shape = explicit_shape(fields)
        .or_else(|| infer_shape(fields))
        .unwrap_or(fallback);

    match shape {
        SourceShape::Medical => RawLineItem::Medical(RawMedicalItem::from_fields(fields)),
        SourceShape::Dental => RawLineItem::Dental(RawDentalItem::from_fields(fields)),
        SourceShape::Pharmacy => RawLineItem::Pharmacy(RawPharmacyItem::from_fields(fields)),
        SourceShape::Insurance => RawLineItem::Insurance(RawInsuranceItem::from_fields(fields)),
        SourceShape::Fsa => RawLineItem::Fsa(RawFsaItem::from_fields(fields)),
    }
}

fn explicit_shape(fields: &Map<String, Value>) -> Option<SourceShape> {
    fields
        .get("shape")
        .and_then(Value::as_str)
        .and_then(|s| SourceShape::from_str(&s.trim().to_lowercase()).ok())
}

/// Guess the shape from keys only one shape carries.
fn infer_shape(fields: &Map<String, Value>) -> Option<SourceShape> {
    let has = |keys: &[&str]| keys.iter().any(|k| fields.contains_key(*k));

    if has(&["cdt_code", "cdt", "tooth_number", "tooth"]) {
        Some(SourceShape::Dental)
    } else if has(&["ndc", "ndc_code", "drug_name", "medication", "qty"]) {
        Some(SourceShape::Pharmacy)
    } else if has(&["insurance_paid", "plan_paid"]) {
        Some(SourceShape::Insurance)
    } else if has(&["reimbursed", "amount_reimbursed"]) {
        Some(SourceShape::Fsa)
    } else if has(&["cpt_code", "cpt"]) {
        Some(SourceShape::Medical)
    } else {
        None
    }
}
