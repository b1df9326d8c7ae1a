//! Document type classification from raw text signals.
//!
//! Each document type owns an ordered list of case-insensitive patterns.
//! A pattern scores at most once per document, however often it matches.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::worker_count;
use crate::models::enums::DocumentType;

/// Result of classifying one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub document_type: DocumentType,
    pub confidence: f64,
    /// Raw signal counts, only for types with at least one hit.
    pub scores: BTreeMap<DocumentType, u32>,
}

impl ClassificationResult {
    pub fn generic() -> Self {
        Self {
            document_type: DocumentType::Generic,
            confidence: 0.0,
            scores: BTreeMap::new(),
        }
    }
}

/// Signal table, in `DocumentType::SCORED` order.
static SIGNALS: LazyLock<Vec<(DocumentType, Vec<Regex>)>> = LazyLock::new(|| {
    vec![
        (
            DocumentType::MedicalBill,
            vec![
                Regex::new(r"(?i)\bCPT\b").unwrap(),
                Regex::new(r"(?i)\bCPT[:#\s]*\d{5}\b").unwrap(),
                Regex::new(r"(?i)\bHCPCS\b").unwrap(),
                Regex::new(r"(?i)\bICD-?10\b").unwrap(),
                Regex::new(r"(?i)\bstatement\s+date\b").unwrap(),
                Regex::new(r"(?i)\b(?:amount|balance)\s+due\b").unwrap(),
                Regex::new(r"(?i)\b(?:patient\s+account|account\s+(?:number|no\.?|#))").unwrap(),
                Regex::new(r"(?i)\b(?:hospital|medical\s+center|emergency\s+(?:room|department)|urgent\s+care)\b").unwrap(),
                Regex::new(r"(?i)\bguarantor\b").unwrap(),
            ],
        ),
        (
            DocumentType::InsuranceEob,
            vec![
                Regex::new(r"(?i)\bexplanation\s+of\s+benefits\b").unwrap(),
                Regex::new(r"(?i)\bEOB\b").unwrap(),
                Regex::new(r"(?i)\b(?:allowed\s+amount|amount\s+allowed)\b").unwrap(),
                Regex::new(r"(?i)\b(?:plan|insurance)\s+paid\b|\bpaid\s+by\s+(?:plan|insurance)\b").unwrap(),
                Regex::new(r"(?i)\bthis\s+is\s+not\s+a\s+bill\b").unwrap(),
                Regex::new(r"(?i)\bclaim\s+(?:number|no\.?|#|id)").unwrap(),
                Regex::new(r"(?i)\b(?:member|subscriber)\s+id\b").unwrap(),
                Regex::new(r"(?i)\bdeductible\b").unwrap(),
                Regex::new(r"(?i)\bco-?insurance\b").unwrap(),
            ],
        ),
        (
            DocumentType::PharmacyReceipt,
            vec![
                Regex::new(r"(?i)\bRx\b").unwrap(),
                Regex::new(r"(?i)\bpharmacy\b").unwrap(),
                Regex::new(r"(?i)\bNDC\b").unwrap(),
                Regex::new(r"(?i)\brefills?\b").unwrap(),
                Regex::new(r"(?i)\b(?:qty|quantity)\b").unwrap(),
                Regex::new(r"(?i)\bco-?pay\b").unwrap(),
                Regex::new(r"(?i)\bprescription\b").unwrap(),
                Regex::new(r"(?i)\b\d+\s*(?:mg|mcg|ml)\b").unwrap(),
            ],
        ),
        (
            DocumentType::DentalBill,
            vec![
                Regex::new(r"(?i)\bD\d{4}\b").unwrap(),
                Regex::new(r"(?i)\b(?:dental|dentist|dentistry|DDS|DMD)\b").unwrap(),
                Regex::new(r"(?i)\b(?:tooth|teeth)\b").unwrap(),
                Regex::new(r"(?i)\bCDT\b").unwrap(),
                Regex::new(r"(?i)\b(?:crown|filling|prophylaxis|periodontal|root\s+canal|molar)\b").unwrap(),
            ],
        ),
    ]
});

/// Classify a document by counting signal patterns per type.
///
/// The highest score wins; ties go to the type listed first in
/// `DocumentType::SCORED`. Confidence is the winner's share of all hits.
pub fn classify(text: &str) -> ClassificationResult {
    let mut scores: BTreeMap<DocumentType, u32> = BTreeMap::new();

    for (doc_type, patterns) in SIGNALS.iter() {
        let hits = patterns.iter().filter(|p| p.is_match(text)).count() as u32;
        if hits > 0 {
            scores.insert(*doc_type, hits);
        }
    }

    let total: u32 = scores.values().sum();
    if total == 0 {
        return ClassificationResult::generic();
    }

    // Strictly-greater comparison keeps the earliest type on ties.
    let mut winner = (DocumentType::Generic, 0u32);
    for doc_type in DocumentType::SCORED {
        let score = scores.get(&doc_type).copied().unwrap_or(0);
        if score > winner.1 {
            winner = (doc_type, score);
        }
    }

    ClassificationResult {
        document_type: winner.0,
        confidence: f64::from(winner.1) / f64::from(total),
        scores,
    }
}

/// Classify several documents on worker threads, one per available core at
/// a time. Output order matches input.
pub fn classify_many(texts: &[&str]) -> Vec<ClassificationResult> {
    texts
        .chunks(worker_count())
        .flat_map(|chunk| {
            std::thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|text| scope.spawn(move || classify(text)))
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap_or_else(|_| ClassificationResult::generic()))
                    .collect::<Vec<_>>()
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_generic() {
        let result = classify("");
        assert_eq!(result.document_type, DocumentType::Generic);
        assert_eq!(result.confidence, 0.0);
        assert!(result.scores.is_empty());
    }

    #[test]
    fn no_signal_text_is_generic() {
        let result = classify("Thanks for visiting, see you next spring.");
        assert_eq!(result, ClassificationResult::generic());
    }

    #[test]
    fn tie_goes_to_first_type_in_order() {
        let result = classify("CPT D2740");
        assert_eq!(result.scores.get(&DocumentType::MedicalBill), Some(&1));
        assert_eq!(result.scores.get(&DocumentType::DentalBill), Some(&1));
        assert_eq!(result.document_type, DocumentType::MedicalBill);
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn tie_break_ignores_text_order() {
        let result = classify("D2740 then CPT");
        assert_eq!(result.document_type, DocumentType::MedicalBill);
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn pattern_counts_once_per_document() {
        let result = classify("EOB EOB EOB");
        assert_eq!(result.scores.get(&DocumentType::InsuranceEob), Some(&1));
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn eob_text_classified() {
        let text = "EXPLANATION OF BENEFITS\nTHIS IS NOT A BILL\nClaim Number: 88231\n\
                    Member ID: XKZ123\nAllowed Amount  Plan Paid  Deductible";
        let result = classify(text);
        assert_eq!(result.document_type, DocumentType::InsuranceEob);
        assert!(result.confidence > 0.8, "got {}", result.confidence);
    }

    #[test]
    fn dental_text_classified() {
        let text = "Bright Smiles Dental, DDS\nD1110 Prophylaxis - adult\nD2740 Crown, tooth #14";
        let result = classify(text);
        assert_eq!(result.document_type, DocumentType::DentalBill);
    }

    #[test]
    fn pharmacy_text_classified() {
        let text = "CVS Pharmacy\nRx #6620193 Lisinopril 10 mg QTY 30\nRefills: 2\nCopay $10.00";
        let result = classify(text);
        assert_eq!(result.document_type, DocumentType::PharmacyReceipt);
    }

    #[test]
    fn medical_text_classified() {
        let text = "Mercy General Hospital\nStatement Date: 03/20/2024\nPatient Account: 55012\n\
                    CPT 99213 Office visit  $180.00\nAmount Due: $45.00";
        let result = classify(text);
        assert_eq!(result.document_type, DocumentType::MedicalBill);
    }

    #[test]
    fn confidence_is_share_of_total() {
        // medical: CPT, CPT-code, amount due (3); insurance: deductible (1)
        let result = classify("CPT 99213 amount due after deductible");
        assert_eq!(result.document_type, DocumentType::MedicalBill);
        assert_eq!(result.confidence, 0.75);
    }

    #[test]
    fn classify_many_preserves_order() {
        let texts = ["EOB", "", "D2740 dental"];
        let results = classify_many(&texts);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].document_type, DocumentType::InsuranceEob);
        assert_eq!(results[1].document_type, DocumentType::Generic);
        assert_eq!(results[2].document_type, DocumentType::DentalBill);
    }

    #[test]
    fn classify_many_beyond_worker_pool() {
        let pattern = ["EOB", "", "D2740 dental"];
        let texts: Vec<&str> = pattern.iter().copied().cycle().take(4 * worker_count() + 2).collect();
        let results = classify_many(&texts);
        assert_eq!(results.len(), texts.len());
        for (text, result) in texts.iter().zip(&results) {
            assert_eq!(result, &classify(text));
        }
    }

    #[test]
    fn classification_is_deterministic() {
        let text = "Rx pharmacy NDC CPT";
        assert_eq!(classify(text), classify(text));
    }
}
