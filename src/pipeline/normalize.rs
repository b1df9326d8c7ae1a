//! Line-item normalization.
//!
//! Raw rows arrive in one of several provider shapes with loosely typed
//! values. Every row becomes exactly one `NormalizedLineItem`; values that
//! cannot be read are marked unknown and explained by a diagnostic.
//! Identical rows are kept: telling a repeated charge from a duplicate needs
//! cross-referencing this stage does not do.

use serde_json::{Map, Value};
use uuid::Uuid;

use super::dates::normalize_date;
use crate::models::diagnostic::Diagnostic;
use crate::models::enums::SourceShape;
use crate::models::line_item::NormalizedLineItem;
use crate::models::service_date::ServiceDate;
use crate::models::value::{parse_amount, Field, Money};

// ═══════════════════════════════════════════════════════════
// Raw input shapes
// ═══════════════════════════════════════════════════════════

/// Medical bill row (CPT coded).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMedicalItem {
    pub date_of_service: Option<Value>,
    pub description: Option<Value>,
    pub cpt_code: Option<Value>,
    pub units: Option<Value>,
    pub billed: Option<Value>,
    pub allowed: Option<Value>,
    pub patient_responsibility: Option<Value>,
    /// Fields given different values under more than one name.
    pub conflicts: Vec<String>,
}

impl RawMedicalItem {
    pub fn from_fields(fields: &Map<String, Value>) -> Self {
        let mut r = FieldReader::new(fields);
        Self {
            date_of_service: r.take(&["date_of_service", "date", "service_date"]),
            description: r.take(&["description"]),
            cpt_code: r.take(&["cpt_code", "cpt", "code"]),
            units: r.take(&["units"]),
            billed: r.take(&["billed", "charge", "amount_billed", "billed_amount"]),
            allowed: r.take(&["allowed", "allowed_amount"]),
            patient_responsibility: r.take(&["patient_responsibility", "patient_owes", "you_owe"]),
            conflicts: r.finish(),
        }
    }
}

/// Dental bill row (CDT coded).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDentalItem {
    pub date_of_service: Option<Value>,
    pub description: Option<Value>,
    pub cdt_code: Option<Value>,
    pub tooth_number: Option<Value>,
    pub billed: Option<Value>,
    pub allowed: Option<Value>,
    pub patient_responsibility: Option<Value>,
    pub conflicts: Vec<String>,
}

impl RawDentalItem {
    pub fn from_fields(fields: &Map<String, Value>) -> Self {
        let mut r = FieldReader::new(fields);
        Self {
            date_of_service: r.take(&["date_of_service", "date", "service_date"]),
            description: r.take(&["description"]),
            cdt_code: r.take(&["cdt_code", "cdt", "code"]),
            tooth_number: r.take(&["tooth_number", "tooth"]),
            billed: r.take(&["billed", "charge", "amount_billed", "fee"]),
            allowed: r.take(&["allowed", "allowed_amount"]),
            patient_responsibility: r.take(&["patient_responsibility", "patient_owes", "you_owe"]),
            conflicts: r.finish(),
        }
    }
}

/// Pharmacy receipt row (NDC coded).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPharmacyItem {
    pub date_of_service: Option<Value>,
    pub description: Option<Value>,
    pub ndc: Option<Value>,
    pub quantity: Option<Value>,
    pub billed: Option<Value>,
    pub patient_responsibility: Option<Value>,
    pub conflicts: Vec<String>,
}

impl RawPharmacyItem {
    pub fn from_fields(fields: &Map<String, Value>) -> Self {
        let mut r = FieldReader::new(fields);
        Self {
            date_of_service: r.take(&["date_of_service", "date", "fill_date"]),
            description: r.take(&["description", "drug_name", "medication"]),
            ndc: r.take(&["ndc", "ndc_code", "code"]),
            quantity: r.take(&["quantity", "qty"]),
            billed: r.take(&["billed", "retail_price", "price"]),
            patient_responsibility: r.take(&["patient_responsibility", "copay", "you_paid"]),
            conflicts: r.finish(),
        }
    }
}

/// Insurance claim row from an EOB. No procedure code, but provider and status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawInsuranceItem {
    pub date_of_service: Option<Value>,
    pub description: Option<Value>,
    pub provider: Option<Value>,
    pub status: Option<Value>,
    pub billed: Option<Value>,
    pub allowed: Option<Value>,
    pub insurance_paid: Option<Value>,
    pub patient_responsibility: Option<Value>,
    pub conflicts: Vec<String>,
}

impl RawInsuranceItem {
    pub fn from_fields(fields: &Map<String, Value>) -> Self {
        let mut r = FieldReader::new(fields);
        Self {
            date_of_service: r.take(&["date_of_service", "date", "service_date"]),
            description: r.take(&["description"]),
            provider: r.take(&["provider", "provider_name"]),
            status: r.take(&["status", "claim_status"]),
            billed: r.take(&["billed", "amount_billed", "billed_amount"]),
            allowed: r.take(&["allowed", "allowed_amount"]),
            insurance_paid: r.take(&["insurance_paid", "plan_paid"]),
            patient_responsibility: r.take(&["patient_responsibility", "patient_owes", "you_owe"]),
            conflicts: r.finish(),
        }
    }
}

/// FSA/HSA reimbursement row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFsaItem {
    pub date_of_service: Option<Value>,
    pub description: Option<Value>,
    pub provider: Option<Value>,
    pub status: Option<Value>,
    pub amount: Option<Value>,
    pub conflicts: Vec<String>,
}

impl RawFsaItem {
    pub fn from_fields(fields: &Map<String, Value>) -> Self {
        let mut r = FieldReader::new(fields);
        Self {
            date_of_service: r.take(&["date_of_service", "date", "service_date"]),
            description: r.take(&["description"]),
            provider: r.take(&["provider", "provider_name", "merchant"]),
            status: r.take(&["status", "claim_status"]),
            amount: r.take(&["amount", "reimbursed", "amount_reimbursed"]),
            conflicts: r.finish(),
        }
    }
}

/// Reads a row's fields, each accepted under several names.
struct FieldReader<'a> {
    fields: &'a Map<String, Value>,
    conflicts: Vec<String>,
}

impl<'a> FieldReader<'a> {
    fn new(fields: &'a Map<String, Value>) -> Self {
        Self {
            fields,
            conflicts: Vec::new(),
        }
    }

    /// First non-null value among `names`. When another name carries a
    /// different value the field reads as absent and `names[0]` is recorded
    /// as conflicting.
    fn take(&mut self, names: &[&str]) -> Option<Value> {
        let mut present = names
            .iter()
            .filter_map(|name| self.fields.get(*name))
            .filter(|v| !v.is_null());
        let first = present.next()?;
        if present.any(|other| !same_value(first, other)) {
            self.conflicts.push(names[0].to_string());
            return None;
        }
        Some(first.clone())
    }

    fn finish(self) -> Vec<String> {
        self.conflicts
    }
}

/// Equal JSON, equal text ignoring case and padding, or the same amount.
fn same_value(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    let (Some(x), Some(y)) = (scalar_text(a), scalar_text(b)) else {
        return false;
    };
    x.eq_ignore_ascii_case(&y)
        || matches!((parse_amount(&x), parse_amount(&y)), (Some(m), Some(n)) if m == n)
}

/// A raw extracted row, tagged by the shape it was read as.
#[derive(Debug, Clone, PartialEq)]
pub enum RawLineItem {
    Medical(RawMedicalItem),
    Dental(RawDentalItem),
    Pharmacy(RawPharmacyItem),
    Insurance(RawInsuranceItem),
    Fsa(RawFsaItem),
}

impl RawLineItem {
    /// Fields dropped because their names disagreed.
    pub fn conflicts(&self) -> &[String] {
        match self {
            RawLineItem::Medical(r) => &r.conflicts,
            RawLineItem::Dental(r) => &r.conflicts,
            RawLineItem::Pharmacy(r) => &r.conflicts,
            RawLineItem::Insurance(r) => &r.conflicts,
            RawLineItem::Fsa(r) => &r.conflicts,
        }
    }

    pub fn shape(&self) -> SourceShape {
        match self {
            RawLineItem::Medical(_) => SourceShape::Medical,
            RawLineItem::Dental(_) => SourceShape::Dental,
            RawLineItem::Pharmacy(_) => SourceShape::Pharmacy,
            RawLineItem::Insurance(_) => SourceShape::Insurance,
            RawLineItem::Fsa(_) => SourceShape::Fsa,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Normalization
// ═══════════════════════════════════════════════════════════

/// Normalize every row of one document, preserving row order.
pub fn normalize(document_id: Uuid, rows: &[RawLineItem]) -> Vec<NormalizedLineItem> {
    let items: Vec<NormalizedLineItem> = rows
        .iter()
        .enumerate()
        .map(|(index, row)| normalize_row(document_id, index, row))
        .collect();

    let flagged = items.iter().filter(|i| i.has_diagnostics()).count();
    if flagged > 0 {
        tracing::debug!(
            document_id = %document_id,
            rows = items.len(),
            flagged,
            "Normalization degraded some fields to unknown"
        );
    }

    items
}

/// Normalize one raw row. Never fails.
pub fn normalize_row(document_id: Uuid, row_index: usize, row: &RawLineItem) -> NormalizedLineItem {
    let shape = row.shape();
    let mut b = RowBuilder::new(row.conflicts());

    let mut item = NormalizedLineItem {
        source_document_id: document_id,
        row_index,
        source_shape: shape,
        amount_kind: shape.amount_kind(),
        date_of_service: ServiceDate::Unknown,
        description: Field::Unknown,
        code: Field::Unknown,
        billed: Field::Unknown,
        allowed: Field::Unknown,
        patient_responsibility: Field::Unknown,
        insurance_paid: Field::Unknown,
        units: Field::Unknown,
        tooth_number: Field::Unknown,
        provider: Field::Unknown,
        claim_status: Field::Unknown,
        diagnostics: Vec::new(),
    };

    match row {
        RawLineItem::Medical(r) => {
            item.date_of_service = b.date("date_of_service", &r.date_of_service);
            item.description = b.required_text("description", &r.description);
            item.code = b.code("cpt_code", &r.cpt_code);
            item.units = b.count("units", &r.units);
            item.billed = b.money("billed", &r.billed);
            item.allowed = b.money("allowed", &r.allowed);
            item.patient_responsibility =
                b.money("patient_responsibility", &r.patient_responsibility);
        }
        RawLineItem::Dental(r) => {
            item.date_of_service = b.date("date_of_service", &r.date_of_service);
            item.description = b.required_text("description", &r.description);
            item.code = b.code("cdt_code", &r.cdt_code);
            item.tooth_number = b.text("tooth_number", &r.tooth_number);
            item.billed = b.money("billed", &r.billed);
            item.allowed = b.money("allowed", &r.allowed);
            item.patient_responsibility =
                b.money("patient_responsibility", &r.patient_responsibility);
        }
        RawLineItem::Pharmacy(r) => {
            item.date_of_service = b.date("date_of_service", &r.date_of_service);
            item.description = b.required_text("description", &r.description);
            item.code = b.code("ndc", &r.ndc);
            item.units = b.count("quantity", &r.quantity);
            item.billed = b.money("billed", &r.billed);
            item.patient_responsibility =
                b.money("patient_responsibility", &r.patient_responsibility);
        }
        RawLineItem::Insurance(r) => {
            item.date_of_service = b.date("date_of_service", &r.date_of_service);
            item.description = b.required_text("description", &r.description);
            item.provider = b.required_text("provider", &r.provider);
            item.claim_status = b.required_text("status", &r.status);
            item.billed = b.money("billed", &r.billed);
            item.allowed = b.money("allowed", &r.allowed);
            item.insurance_paid = b.money("insurance_paid", &r.insurance_paid);
            item.patient_responsibility =
                b.money("patient_responsibility", &r.patient_responsibility);
        }
        RawLineItem::Fsa(r) => {
            item.date_of_service = b.date("date_of_service", &r.date_of_service);
            item.description = b.required_text("description", &r.description);
            item.provider = b.text("provider", &r.provider);
            item.claim_status = b.text("status", &r.status);
            item.billed = b.money("amount", &r.amount);
        }
    }

    item.diagnostics = b.diagnostics;
    item
}

/// Collects diagnostics while reading one row's fields.
struct RowBuilder<'a> {
    conflicts: &'a [String],
    diagnostics: Vec<Diagnostic>,
}

impl<'a> RowBuilder<'a> {
    fn new(conflicts: &'a [String]) -> Self {
        Self {
            conflicts,
            diagnostics: Vec::new(),
        }
    }

    /// Flags a field whose names disagreed. It then reads as unknown.
    fn conflicted(&mut self, field: &str) -> bool {
        let hit = self.conflicts.iter().any(|c| c == field);
        if hit {
            self.diagnostics.push(Diagnostic::conflicting_values(field));
        }
        hit
    }

    fn money(&mut self, field: &str, raw: &Option<Value>) -> Field<Money> {
        if self.conflicted(field) {
            return Field::Unknown;
        }
        let parsed = match raw {
            None | Some(Value::Null) => return Field::Unknown,
            Some(Value::String(s)) if is_blank(s) => return Field::Unknown,
            Some(Value::Number(n)) => n
                .as_f64()
                .filter(|v| *v >= 0.0)
                .and_then(Money::from_f64),
            Some(Value::String(s)) => parse_amount(s),
            Some(_) => None,
        };

        match parsed {
            Some(m) => Field::Known(m),
            None => {
                self.diagnostics
                    .push(Diagnostic::unparseable_amount(field, &render(raw)));
                Field::Unknown
            }
        }
    }

    fn count(&mut self, field: &str, raw: &Option<Value>) -> Field<u32> {
        if self.conflicted(field) {
            return Field::Unknown;
        }
        let parsed = match raw {
            None | Some(Value::Null) => return Field::Unknown,
            Some(Value::String(s)) if is_blank(s) => return Field::Unknown,
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
                .and_then(|v| u32::try_from(v).ok()),
            Some(Value::String(s)) => s.trim().parse::<u32>().ok(),
            Some(_) => None,
        };

        match parsed {
            Some(v) => Field::Known(v),
            None => {
                self.diagnostics
                    .push(Diagnostic::unparseable_amount(field, &render(raw)));
                Field::Unknown
            }
        }
    }

    fn date(&mut self, field: &str, raw: &Option<Value>) -> ServiceDate {
        if self.conflicted(field) {
            return ServiceDate::Unknown;
        }
        let text = match raw {
            None | Some(Value::Null) => return ServiceDate::Unknown,
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                self.diagnostics
                    .push(Diagnostic::unrecognized_date(field, &other.to_string()));
                return ServiceDate::Unknown;
            }
        };
        let date = normalize_date(&text);
        if let ServiceDate::Unparsed(ref kept) = date {
            self.diagnostics.push(Diagnostic::unrecognized_date(field, kept));
        }
        date
    }

    /// Scalars become trimmed text. Objects, arrays and booleans are flagged.
    fn text(&mut self, field: &str, raw: &Option<Value>) -> Field<String> {
        if self.conflicted(field) {
            return Field::Unknown;
        }
        match raw {
            None | Some(Value::Null) => Field::Unknown,
            Some(Value::String(s)) if is_blank(s) => Field::Unknown,
            Some(Value::String(s)) => Field::Known(s.trim().to_string()),
            Some(Value::Number(n)) => Field::Known(n.to_string()),
            Some(other) => {
                self.diagnostics
                    .push(Diagnostic::unreadable_value(field, &other.to_string()));
                Field::Unknown
            }
        }
    }

    /// Like `text`, and an absent value is reported as missing.
    fn required_text(&mut self, field: &str, raw: &Option<Value>) -> Field<String> {
        let flagged = self.diagnostics.len();
        let value = self.text(field, raw);
        if !value.is_known() && self.diagnostics.len() == flagged {
            self.diagnostics.push(Diagnostic::missing_field(field));
        }
        value
    }

    fn code(&mut self, field: &str, raw: &Option<Value>) -> Field<String> {
        self.text(field, raw).map(|c| c.to_uppercase())
    }
}

/// A string or number as trimmed text.
fn scalar_text(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_blank(s: &str) -> bool {
    let t = s.trim();
    t.is_empty() || t.eq_ignore_ascii_case("null") || t.eq_ignore_ascii_case("n/a")
}

fn render(raw: &Option<Value>) -> String {
    match raw {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
