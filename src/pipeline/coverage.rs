//! Coverage matrix: joins line items across documents so each real charge
//! shows what was paid out of pocket, reimbursed by FSA and paid by insurance.
//!
//! Matching is greedy in input order. An item joins the best-scoring earlier
//! row that still has an empty slot for its lens and holds nothing from the
//! item's own document. Repeated charges on one bill therefore stay apart.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::models::coverage::{CoverageMatrix, CoverageRow, CoverageSummary, LineItemRef};
use crate::models::enums::{AmountKind, CoverageStatus};
use crate::models::line_item::NormalizedLineItem;
use crate::models::service_date::ServiceDate;
use crate::models::value::{Field, Money};

/// Join tolerances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    /// Minimum token-set Jaccard similarity between normalized descriptions.
    pub description_threshold: f64,
    /// Maximum distance between two day-level dates of service.
    pub date_window_days: u32,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            description_threshold: 0.5,
            date_window_days: 0,
        }
    }
}

/// Lower-case, strip punctuation, collapse whitespace.
pub fn normalize_description(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Token-set Jaccard similarity of two descriptions, 0.0 to 1.0.
pub fn description_similarity(a: &str, b: &str) -> f64 {
    let a_norm = normalize_description(a);
    let b_norm = normalize_description(b);
    let left: BTreeSet<&str> = a_norm.split(' ').filter(|t| !t.is_empty()).collect();
    let right: BTreeSet<&str> = b_norm.split(' ').filter(|t| !t.is_empty()).collect();

    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let shared = left.intersection(&right).count();
    let union = left.union(&right).count();
    shared as f64 / union as f64
}

/// Score for joining two items, or `None` when they describe different charges.
///
/// Dates must be compatible. A shared procedure code scores 1.0; otherwise the
/// descriptions must reach the configured similarity.
fn pair_score(a: &NormalizedLineItem, b: &NormalizedLineItem, config: &CoverageConfig) -> Option<f64> {
    if !a.date_of_service.compatible_with(&b.date_of_service, config.date_window_days) {
        return None;
    }

    if let (Field::Known(ca), Field::Known(cb)) = (&a.code, &b.code) {
        if ca.eq_ignore_ascii_case(cb) {
            return Some(1.0);
        }
    }

    match (&a.description, &b.description) {
        (Field::Known(da), Field::Known(db)) => {
            let similarity = description_similarity(da, db);
            (similarity >= config.description_threshold).then_some(similarity)
        }
        _ => None,
    }
}

fn slot(kind: AmountKind) -> usize {
    match kind {
        AmountKind::Receipt => 0,
        AmountKind::Fsa => 1,
        AmountKind::Insurance => 2,
    }
}

/// Items joined so far into one row.
struct Cluster {
    members: Vec<usize>,
    slots: [Option<usize>; 3],
    similarity: f64,
}

impl Cluster {
    fn open(index: usize, kind: AmountKind) -> Self {
        let mut slots = [None; 3];
        slots[slot(kind)] = Some(index);
        Self {
            members: vec![index],
            slots,
            similarity: 1.0,
        }
    }

    /// Lowest pair score against every member, if the item may join at all.
    fn admit_score(
        &self,
        candidate: &NormalizedLineItem,
        items: &[NormalizedLineItem],
        config: &CoverageConfig,
    ) -> Option<f64> {
        if self.slots[slot(candidate.amount_kind)].is_some() {
            return None;
        }

        let mut worst = 1.0_f64;
        for &m in &self.members {
            let member = &items[m];
            if member.source_document_id == candidate.source_document_id {
                return None;
            }
            worst = worst.min(pair_score(member, candidate, config)?);
        }
        Some(worst)
    }
}

/// Build the coverage matrix for a set of normalized line items.
pub fn build_coverage(items: &[NormalizedLineItem], config: &CoverageConfig) -> CoverageMatrix {
    let mut clusters: Vec<Cluster> = Vec::new();

    for (index, item) in items.iter().enumerate() {
        let mut best: Option<(usize, f64)> = None;
        for (ci, cluster) in clusters.iter().enumerate() {
            if let Some(score) = cluster.admit_score(item, items, config) {
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((ci, score));
                }
            }
        }

        match best {
            Some((ci, score)) => {
                let cluster = &mut clusters[ci];
                cluster.members.push(index);
                cluster.slots[slot(item.amount_kind)] = Some(index);
                cluster.similarity = cluster.similarity.min(score);
            }
            None => clusters.push(Cluster::open(index, item.amount_kind)),
        }
    }

    let rows: Vec<CoverageRow> = clusters.iter().map(|c| build_row(c, items)).collect();
    let summary = summarize(&rows);

    tracing::debug!(
        items = items.len(),
        rows = summary.total_rows,
        reconciled = summary.reconciled,
        partially_reconciled = summary.partially_reconciled,
        orphaned = summary.orphaned,
        "Coverage matrix built"
    );

    CoverageMatrix { rows, summary }
}

fn build_row(cluster: &Cluster, items: &[NormalizedLineItem]) -> CoverageRow {
    let members: Vec<&NormalizedLineItem> = cluster.members.iter().map(|&i| &items[i]).collect();

    let description = members
        .iter()
        .find_map(|m| m.description.known().cloned())
        .into();

    // Most specific date; earliest member wins ties.
    let date = members
        .iter()
        .map(|m| &m.date_of_service)
        .fold(&ServiceDate::Unknown, |best, d| {
            if d.precision() > best.precision() {
                d
            } else {
                best
            }
        })
        .clone();

    let lens = |kind: AmountKind| -> Field<Money> {
        cluster.slots[slot(kind)]
            .map(|i| items[i].lens_amount())
            .unwrap_or(Field::Unknown)
    };
    let receipt_amount = lens(AmountKind::Receipt);
    let fsa_amount = lens(AmountKind::Fsa);
    let insurance_amount = lens(AmountKind::Insurance);

    let status = match cluster.slots.iter().filter(|s| s.is_some()).count() {
        3 => CoverageStatus::Reconciled,
        2 => CoverageStatus::PartiallyReconciled,
        _ => CoverageStatus::Orphaned,
    };

    let out_of_pocket_gap = match (&receipt_amount, &fsa_amount) {
        (Field::Known(r), Field::Known(f)) => Field::Known(*r - *f),
        _ => Field::Unknown,
    };

    let mut source_documents = Vec::new();
    for m in &members {
        if !source_documents.contains(&m.source_document_id) {
            source_documents.push(m.source_document_id);
        }
    }

    CoverageRow {
        description,
        date,
        receipt_amount,
        fsa_amount,
        insurance_amount,
        status,
        similarity: cluster.similarity,
        out_of_pocket_gap,
        line_items: members
            .iter()
            .map(|m| LineItemRef {
                document_id: m.source_document_id,
                row_index: m.row_index,
            })
            .collect(),
        source_documents,
    }
}

fn summarize(rows: &[CoverageRow]) -> CoverageSummary {
    let mut summary = CoverageSummary {
        total_rows: rows.len(),
        ..CoverageSummary::default()
    };

    for row in rows {
        match row.status {
            CoverageStatus::Reconciled => summary.reconciled += 1,
            CoverageStatus::PartiallyReconciled => summary.partially_reconciled += 1,
            CoverageStatus::Orphaned => summary.orphaned += 1,
        }
        summary.receipt_total = summary.receipt_total + row.receipt_amount.get().unwrap_or_default();
        summary.fsa_total = summary.fsa_total + row.fsa_amount.get().unwrap_or_default();
        summary.insurance_total =
            summary.insurance_total + row.insurance_amount.get().unwrap_or_default();
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::line_item::fixtures::item;
    use crate::pipeline::dates::normalize_date;
    use uuid::Uuid;

    fn charge(
        doc: Uuid,
        kind: AmountKind,
        date: &str,
        description: &str,
        amount_cents: i64,
    ) -> NormalizedLineItem {
        let mut it = item(kind);
        it.source_document_id = doc;
        it.date_of_service = normalize_date(date);
        it.description = Field::Known(description.to_string());
        let amount = Field::Known(Money::from_cents(amount_cents));
        match kind {
            AmountKind::Receipt => it.patient_responsibility = amount,
            AmountKind::Fsa => it.billed = amount,
            AmountKind::Insurance => it.insurance_paid = amount,
        }
        it
    }

    #[test]
    fn month_date_covers_day_date() {
        let items = vec![
            charge(Uuid::new_v4(), AmountKind::Receipt, "2024-03-14", "Office visit", 4500),
            charge(Uuid::new_v4(), AmountKind::Insurance, "2024-03", "Office Visit.", 13500),
        ];
        let matrix = build_coverage(&items, &CoverageConfig::default());
        assert_eq!(matrix.rows.len(), 1);

        let row = &matrix.rows[0];
        assert_eq!(row.status, CoverageStatus::PartiallyReconciled);
        assert_eq!(row.date.to_string(), "2024-03-14");
        assert_eq!(row.receipt_amount, Field::Known(Money::from_cents(4500)));
        assert_eq!(row.insurance_amount, Field::Known(Money::from_cents(13500)));
        assert_eq!(row.fsa_amount, Field::Unknown);
        assert_eq!(row.source_documents.len(), 2);
    }

    #[test]
    fn unmatched_item_is_orphaned_with_unknown_lenses() {
        let items = vec![
            charge(Uuid::new_v4(), AmountKind::Receipt, "2024-03-14", "Office visit", 4500),
            charge(Uuid::new_v4(), AmountKind::Insurance, "2024-05-02", "MRI lumbar spine", 90000),
        ];
        let matrix = build_coverage(&items, &CoverageConfig::default());
        assert_eq!(matrix.rows.len(), 2);
        for row in &matrix.rows {
            assert_eq!(row.status, CoverageStatus::Orphaned);
        }
        assert_eq!(matrix.rows[0].fsa_amount, Field::Unknown);
        assert_eq!(matrix.rows[0].insurance_amount, Field::Unknown);
        assert_eq!(matrix.rows[1].receipt_amount, Field::Unknown);
        assert_eq!(matrix.summary.orphaned, 2);
    }

    #[test]
    fn three_lenses_reconcile() {
        let items = vec![
            charge(Uuid::new_v4(), AmountKind::Receipt, "03/14/2024", "Office visit est patient", 4500),
            charge(Uuid::new_v4(), AmountKind::Insurance, "2024-03-14", "office visit", 13500),
            charge(Uuid::new_v4(), AmountKind::Fsa, "2024-03-14", "Office visit", 4000),
        ];
        let matrix = build_coverage(&items, &CoverageConfig::default());
        assert_eq!(matrix.rows.len(), 1);
        let row = &matrix.rows[0];
        assert_eq!(row.status, CoverageStatus::Reconciled);
        assert_eq!(row.out_of_pocket_gap, Field::Known(Money::from_cents(500)));
        assert_eq!(row.line_items.len(), 3);
        assert_eq!(matrix.summary.reconciled, 1);
        assert_eq!(matrix.summary.receipt_total, Money::from_cents(4500));
        assert_eq!(matrix.summary.fsa_total, Money::from_cents(4000));
        assert_eq!(matrix.summary.insurance_total, Money::from_cents(13500));
    }

    #[test]
    fn same_lens_never_merges() {
        let items = vec![
            charge(Uuid::new_v4(), AmountKind::Receipt, "2024-03-14", "Office visit", 4500),
            charge(Uuid::new_v4(), AmountKind::Receipt, "2024-03-14", "Office visit", 4500),
        ];
        let matrix = build_coverage(&items, &CoverageConfig::default());
        assert_eq!(matrix.rows.len(), 2);
    }

    #[test]
    fn repeated_charges_in_one_document_stay_apart() {
        let doc = Uuid::new_v4();
        let items = vec![
            charge(doc, AmountKind::Receipt, "2024-03-14", "Venipuncture", 2500),
            charge(doc, AmountKind::Insurance, "2024-03-14", "Venipuncture", 2000),
        ];
        let matrix = build_coverage(&items, &CoverageConfig::default());
        assert_eq!(matrix.rows.len(), 2);
    }

    #[test]
    fn shared_code_matches_despite_descriptions() {
        let mut receipt = charge(Uuid::new_v4(), AmountKind::Receipt, "2024-03-14", "OV EST LVL 3", 4500);
        receipt.code = Field::Known("99213".into());
        let mut eob = charge(Uuid::new_v4(), AmountKind::Insurance, "2024-03-14", "Office visit", 13500);
        eob.code = Field::Known("99213".into());

        let matrix = build_coverage(&[receipt, eob], &CoverageConfig::default());
        assert_eq!(matrix.rows.len(), 1);
        assert_eq!(matrix.rows[0].similarity, 1.0);
    }

    #[test]
    fn date_window_is_configurable() {
        let items = vec![
            charge(Uuid::new_v4(), AmountKind::Receipt, "2024-03-14", "Office visit", 4500),
            charge(Uuid::new_v4(), AmountKind::Fsa, "2024-03-16", "Office visit", 4500),
        ];
        assert_eq!(build_coverage(&items, &CoverageConfig::default()).rows.len(), 2);

        let wide = CoverageConfig {
            date_window_days: 3,
            ..CoverageConfig::default()
        };
        let matrix = build_coverage(&items, &wide);
        assert_eq!(matrix.rows.len(), 1);
        assert_eq!(matrix.rows[0].out_of_pocket_gap, Field::Known(Money::ZERO));
    }

    #[test]
    fn best_scoring_row_wins() {
        let items = vec![
            charge(Uuid::new_v4(), AmountKind::Receipt, "2024-03-14", "Office visit new patient", 4500),
            charge(Uuid::new_v4(), AmountKind::Receipt, "2024-03-14", "Office visit", 3000),
            charge(Uuid::new_v4(), AmountKind::Insurance, "2024-03-14", "office visit", 9000),
        ];
        let matrix = build_coverage(&items, &CoverageConfig::default());
        assert_eq!(matrix.rows.len(), 2);
        assert_eq!(matrix.rows[1].insurance_amount, Field::Known(Money::from_cents(9000)));
        assert_eq!(matrix.rows[0].status, CoverageStatus::Orphaned);
    }

    #[test]
    fn unknown_dates_do_not_join() {
        let mut a = charge(Uuid::new_v4(), AmountKind::Receipt, "", "Office visit", 4500);
        let b = charge(Uuid::new_v4(), AmountKind::Insurance, "", "Office visit", 9000);
        assert_eq!(a.date_of_service, ServiceDate::Unknown);
        assert_eq!(build_coverage(&[a.clone(), b.clone()], &CoverageConfig::default()).rows.len(), 2);

        a.date_of_service = ServiceDate::Unparsed("spring".into());
        let mut b = b;
        b.date_of_service = ServiceDate::Unparsed("spring".into());
        assert_eq!(build_coverage(&[a, b], &CoverageConfig::default()).rows.len(), 1);
    }

    #[test]
    fn similarity_metric() {
        assert_eq!(normalize_description("  Office-Visit,  EST. "), "office visit est");
        assert_eq!(description_similarity("Office visit", "office VISIT"), 1.0);
        assert_eq!(description_similarity("office visit", "office visit est patient"), 0.5);
        assert_eq!(description_similarity("", "office"), 0.0);
    }

    #[test]
    fn non_ascii_capitals_fold() {
        assert_eq!(normalize_description("CAFÉ Crème"), "café crème");
        assert_eq!(description_similarity("ÉCHOGRAPHIE", "échographie"), 1.0);
    }

    #[test]
    fn empty_input_gives_empty_matrix() {
        let matrix = build_coverage(&[], &CoverageConfig::default());
        assert!(matrix.rows.is_empty());
        assert_eq!(matrix.summary, CoverageSummary::default());
    }
}
