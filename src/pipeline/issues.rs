//! Rule-based billing-issue detection.
//!
//! Each rule flags line items or coverage rows that suggest money the patient
//! may not owe. Issues serialize into the analysis layout the savings
//! aggregator reads.

use serde::Serialize;
use serde_json::Value;

use super::coverage::normalize_description;
use crate::models::coverage::{CoverageMatrix, LineItemRef};
use crate::models::enums::{AmountKind, IssueKind};
use crate::models::line_item::NormalizedLineItem;
use crate::models::value::{Field, Money};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillingIssue {
    pub kind: IssueKind,
    pub title: String,
    pub detail: String,
    pub potential_savings: Money,
    pub line_items: Vec<LineItemRef>,
}

/// Counts only. The savings total lives on the issues themselves so the
/// aggregator does not count it twice.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisSummary {
    pub issue_count: usize,
    pub flagged_total: Money,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Analysis {
    pub issues: Vec<BillingIssue>,
    pub summary: AnalysisSummary,
}

impl Analysis {
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

fn item_ref(item: &NormalizedLineItem) -> LineItemRef {
    LineItemRef {
        document_id: item.source_document_id,
        row_index: item.row_index,
    }
}

fn label(item: &NormalizedLineItem) -> String {
    item.description
        .known()
        .cloned()
        .unwrap_or_else(|| format!("row {}", item.row_index))
}

/// Run every rule over a session's line items and its coverage matrix.
pub fn detect_issues(items: &[NormalizedLineItem], coverage: &CoverageMatrix) -> Analysis {
    let mut issues = Vec::new();
    issues.extend(duplicate_charges(items));
    issues.extend(responsibility_over_allowed(items));
    issues.extend(denied_claims(items));
    issues.extend(fsa_shortfalls(coverage));

    let flagged_total = issues.iter().map(|i| i.potential_savings).sum();
    tracing::info!(
        issues = issues.len(),
        flagged_total = %flagged_total,
        "Billing issue detection complete"
    );

    Analysis {
        summary: AnalysisSummary {
            issue_count: issues.len(),
            flagged_total,
        },
        issues,
    }
}

/// Same document, same known date, same code (or description) and same
/// amount. Every copy after the first is flagged.
fn duplicate_charges(items: &[NormalizedLineItem]) -> Vec<BillingIssue> {
    let mut issues = Vec::new();

    for (i, later) in items.iter().enumerate() {
        if later.amount_kind != AmountKind::Receipt || !later.date_of_service.is_known() {
            continue;
        }
        let Field::Known(amount) = later.lens_amount() else {
            continue;
        };

        let original = items[..i].iter().find(|earlier| {
            earlier.amount_kind == AmountKind::Receipt
                && earlier.source_document_id == later.source_document_id
                && earlier.date_of_service == later.date_of_service
                && earlier.lens_amount() == Field::Known(amount)
                && same_charge(earlier, later)
        });

        if let Some(original) = original {
            issues.push(BillingIssue {
                kind: IssueKind::DuplicateCharge,
                title: format!("Possible duplicate charge: {}", label(later)),
                detail: format!(
                    "Row {} repeats row {} on {} for {}",
                    later.row_index, original.row_index, later.date_of_service, amount
                ),
                potential_savings: amount,
                line_items: vec![item_ref(original), item_ref(later)],
            });
        }
    }

    issues
}

fn same_charge(a: &NormalizedLineItem, b: &NormalizedLineItem) -> bool {
    match (&a.code, &b.code) {
        (Field::Known(x), Field::Known(y)) => x.eq_ignore_ascii_case(y),
        _ => match (&a.description, &b.description) {
            (Field::Known(x), Field::Known(y)) => normalize_description(x) == normalize_description(y),
            _ => false,
        },
    }
}

/// Patient asked to pay more than the plan allowed for the whole service.
fn responsibility_over_allowed(items: &[NormalizedLineItem]) -> Vec<BillingIssue> {
    items
        .iter()
        .filter_map(|item| {
            let owed = item.patient_responsibility.get()?;
            let allowed = item.allowed.get()?;
            (owed > allowed).then(|| BillingIssue {
                kind: IssueKind::ResponsibilityExceedsAllowed,
                title: format!("Charged above allowed amount: {}", label(item)),
                detail: format!("Patient responsibility {owed} exceeds allowed amount {allowed}"),
                potential_savings: owed - allowed,
                line_items: vec![item_ref(item)],
            })
        })
        .collect()
}

/// Denied insurance claims are often reversible on appeal.
fn denied_claims(items: &[NormalizedLineItem]) -> Vec<BillingIssue> {
    items
        .iter()
        .filter(|item| item.amount_kind == AmountKind::Insurance)
        .filter(|item| {
            item.claim_status
                .known()
                .is_some_and(|s| s.to_lowercase().contains("denied"))
        })
        .map(|item| {
            let at_stake = item
                .patient_responsibility
                .clone()
                .or(item.billed.clone())
                .get()
                .unwrap_or(Money::ZERO);
            BillingIssue {
                kind: IssueKind::DeniedClaim,
                title: format!("Denied claim: {}", label(item)),
                detail: format!("Claim denied; {at_stake} shifted to the patient"),
                potential_savings: at_stake,
                line_items: vec![item_ref(item)],
            }
        })
        .collect()
}

/// Paid out of pocket, reimbursed less by the FSA.
fn fsa_shortfalls(coverage: &CoverageMatrix) -> Vec<BillingIssue> {
    coverage
        .rows
        .iter()
        .filter_map(|row| {
            let gap = row.out_of_pocket_gap.get()?;
            (gap > Money::ZERO).then(|| BillingIssue {
                kind: IssueKind::FsaShortfall,
                title: format!(
                    "FSA reimbursed less than paid: {}",
                    row.description.known().map(String::as_str).unwrap_or("charge")
                ),
                detail: format!("{gap} paid on {} was not reimbursed", row.date),
                potential_savings: gap,
                line_items: row.line_items.clone(),
            })
        })
        .collect()
}
