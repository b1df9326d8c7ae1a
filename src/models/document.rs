use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::diagnostic::Diagnostic;
use super::enums::ReviewStatus;
use super::facts::ExtractedFacts;
use super::line_item::NormalizedLineItem;
use crate::pipeline::classify::ClassificationResult;
use crate::pipeline::fingerprint::Fingerprint;

/// A billing document held by a session.
///
/// Everything except `review_status` and `actions` is fixed at ingestion;
/// further parts of the same document only append.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub fingerprint: Fingerprint,
    pub canonical: String,
    /// Content hashes of every submitted part, in submission order.
    pub content_hashes: Vec<String>,
    pub classification: ClassificationResult,
    pub facts: ExtractedFacts,
    pub line_items: Vec<NormalizedLineItem>,
    pub diagnostics: Vec<Diagnostic>,
    pub ingested_at: DateTime<Utc>,
    pub review_status: ReviewStatus,
    pub actions: Vec<DocumentAction>,
}

impl DocumentRecord {
    pub fn part_count(&self) -> usize {
        self.content_hashes.len()
    }
}

/// A user annotation on a document ("called provider", "filed appeal").
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentAction {
    pub note: String,
    pub recorded_at: DateTime<Utc>,
}

/// How a submission relates to documents already in the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DuplicateStatus {
    /// A document the session had not seen.
    New,
    /// Byte-identical (after whitespace folding) to a part already ingested.
    AlreadyTracked { existing_id: Uuid },
    /// Same identity, different text: another paste or OCR pass of a known document.
    PossibleDuplicate { existing_id: Uuid },
}
