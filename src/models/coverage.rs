use serde::Serialize;
use uuid::Uuid;

use super::enums::CoverageStatus;
use super::service_date::ServiceDate;
use super::value::{Field, Money};

/// Points back at one line item joined into a coverage row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineItemRef {
    pub document_id: Uuid,
    pub row_index: usize,
}

/// One real-world charge seen through the receipt, FSA and insurance lenses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageRow {
    pub description: Field<String>,
    pub date: ServiceDate,
    pub receipt_amount: Field<Money>,
    pub fsa_amount: Field<Money>,
    pub insurance_amount: Field<Money>,
    pub status: CoverageStatus,
    /// Lowest pairwise similarity that admitted an item into this row (1.0 for single items).
    pub similarity: f64,
    /// Receipt minus FSA reimbursement, when both are known.
    pub out_of_pocket_gap: Field<Money>,
    pub line_items: Vec<LineItemRef>,
    pub source_documents: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoverageSummary {
    pub total_rows: usize,
    pub reconciled: usize,
    pub partially_reconciled: usize,
    pub orphaned: usize,
    pub receipt_total: Money,
    pub fsa_total: Money,
    pub insurance_total: Money,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoverageMatrix {
    pub rows: Vec<CoverageRow>,
    pub summary: CoverageSummary,
}
