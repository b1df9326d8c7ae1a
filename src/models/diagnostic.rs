use serde::{Deserialize, Serialize};

/// What went wrong while turning extracted input into a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    UnparseableAmount,
    UnrecognizedDate,
    MissingField,
    UnreadableValue,
    ConflictingValues,
    SkippedRecord,
    RepeatedRow,
    ProviderFailed,
}

/// A note attached to a record whose input was degraded to "unknown".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn unparseable_amount(field: &str, raw: &str) -> Self {
        Self {
            kind: DiagnosticKind::UnparseableAmount,
            field: Some(field.to_string()),
            message: format!("cannot parse '{raw}' as a non-negative amount"),
        }
    }

    pub fn unrecognized_date(field: &str, raw: &str) -> Self {
        Self {
            kind: DiagnosticKind::UnrecognizedDate,
            field: Some(field.to_string()),
            message: format!("unrecognized date format '{raw}', kept as-is"),
        }
    }

    pub fn missing_field(field: &str) -> Self {
        Self {
            kind: DiagnosticKind::MissingField,
            field: Some(field.to_string()),
            message: format!("required field '{field}' is missing"),
        }
    }

    pub fn unreadable_value(field: &str, raw: &str) -> Self {
        Self {
            kind: DiagnosticKind::UnreadableValue,
            field: Some(field.to_string()),
            message: format!("cannot read '{raw}' as text"),
        }
    }

    pub fn conflicting_values(field: &str) -> Self {
        Self {
            kind: DiagnosticKind::ConflictingValues,
            field: Some(field.to_string()),
            message: format!("'{field}' has different values under different names"),
        }
    }

    /// A row of a further part that the document already carries.
    pub fn repeated_row(row_index: usize, existing_row: usize) -> Self {
        Self {
            kind: DiagnosticKind::RepeatedRow,
            field: None,
            message: format!("row {row_index} of this part repeats existing row {existing_row}, not added"),
        }
    }

    pub fn skipped_record(index: usize, reason: &str) -> Self {
        Self {
            kind: DiagnosticKind::SkippedRecord,
            field: None,
            message: format!("record {index} skipped: {reason}"),
        }
    }

    pub fn provider_failed(reason: &str) -> Self {
        Self {
            kind: DiagnosticKind::ProviderFailed,
            field: None,
            message: format!("extraction provider failed: {reason}"),
        }
    }
}
