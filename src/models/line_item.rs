use serde::Serialize;
use uuid::Uuid;

use super::diagnostic::Diagnostic;
use super::enums::{AmountKind, SourceShape};
use super::service_date::ServiceDate;
use super::value::{Field, Money};

/// One billed charge in the shared schema, whatever document it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedLineItem {
    pub source_document_id: Uuid,
    /// Position of the raw row inside its document.
    pub row_index: usize,
    pub source_shape: SourceShape,
    pub amount_kind: AmountKind,
    pub date_of_service: ServiceDate,
    pub description: Field<String>,
    /// CPT, CDT or NDC depending on `source_shape`. Insurance and FSA rows carry none.
    pub code: Field<String>,
    pub billed: Field<Money>,
    pub allowed: Field<Money>,
    pub patient_responsibility: Field<Money>,
    pub insurance_paid: Field<Money>,
    pub units: Field<u32>,
    pub tooth_number: Field<String>,
    pub provider: Field<String>,
    pub claim_status: Field<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl NormalizedLineItem {
    /// The amount this row reports for its coverage lens.
    ///
    /// Receipts report what the patient paid (responsibility, else billed),
    /// FSA rows their reimbursed amount, insurance rows what the plan paid
    /// (else the allowed amount).
    pub fn lens_amount(&self) -> Field<Money> {
        match self.amount_kind {
            AmountKind::Receipt => self.patient_responsibility.clone().or(self.billed.clone()),
            AmountKind::Fsa => self.billed.clone(),
            AmountKind::Insurance => self.insurance_paid.clone().or(self.allowed.clone()),
        }
    }

    pub fn has_diagnostics(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}
