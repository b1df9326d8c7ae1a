//! Session context: the documents ingested so far and everything derived
//! from them.
//!
//! Ingestion runs classify → extract → fingerprint → normalize. The first
//! three stages are pure per document and may run on worker threads; commits
//! into the session happen in submission order.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::classify::{classify, ClassificationResult};
use super::coverage::{build_coverage, description_similarity};
use super::diagnostic::SessionDump;
use super::extraction::{run_provider, Extraction, ExtractionProvider};
use super::fingerprint::{canonicalize, content_hash, fingerprint, Fingerprint};
use super::issues::{detect_issues, Analysis};
use super::normalize::{normalize, RawLineItem};
use super::savings::aggregate_savings;
use super::store::{DocumentSnapshot, SnapshotStore, StoreError};
use super::worker_count;
use crate::config::BillsenseConfig;
use crate::models::coverage::CoverageMatrix;
use crate::models::diagnostic::Diagnostic;
use crate::models::document::{DocumentAction, DocumentRecord, DuplicateStatus};
use crate::models::enums::ReviewStatus;
use crate::models::facts::{ExtractedFacts, FactKey};
use crate::models::line_item::NormalizedLineItem;
use crate::models::value::{Field, Money};

/// Result of submitting one text to a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutcome {
    pub document_id: Uuid,
    pub fingerprint: Fingerprint,
    pub status: DuplicateStatus,
    pub classification: ClassificationResult,
    pub line_items_added: usize,
    pub diagnostics_added: usize,
}

/// Savings from the built-in rules and from an externally supplied analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SavingsBreakdown {
    pub detected: Money,
    pub external: Money,
    pub total: Money,
}

/// Everything a presentation layer needs, in one serializable value.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub documents: Vec<DocumentRecord>,
    pub coverage: CoverageMatrix,
    pub analysis: Analysis,
    pub savings: SavingsBreakdown,
}

/// Per-document work done before touching session state.
struct Prepared {
    content_hash: String,
    classification: ClassificationResult,
    facts: ExtractedFacts,
    canonical: String,
    fingerprint: Fingerprint,
    rows: Vec<RawLineItem>,
    diagnostics: Vec<Diagnostic>,
}

impl Prepared {
    fn run(text: &str, provider: &dyn ExtractionProvider) -> Self {
        let classification = classify(text);
        let extraction = run_provider(provider, text, classification.document_type);
        Self::from_extraction(text, classification, extraction)
    }

    fn from_extraction(text: &str, classification: ClassificationResult, extraction: Extraction) -> Self {
        let Extraction {
            mut facts,
            line_items,
            diagnostics,
        } = extraction;

        if facts.get(FactKey::DocumentType).is_none() {
            facts = facts.with(FactKey::DocumentType, classification.document_type.as_str());
        }
        let canonical = canonicalize(&facts);

        Self {
            content_hash: content_hash(text),
            fingerprint: fingerprint(&canonical),
            canonical,
            classification,
            facts,
            rows: line_items,
            diagnostics,
        }
    }

    /// Only a document type is known: the fingerprint cannot tell documents apart.
    fn weak_identity(&self) -> bool {
        self.facts.known_count() <= 1
    }
}

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    config: BillsenseConfig,
    documents: Vec<DocumentRecord>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(BillsenseConfig::default())
    }
}

impl Session {
    pub fn new(config: BillsenseConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            documents: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &BillsenseConfig {
        &self.config
    }

    pub fn documents(&self) -> &[DocumentRecord] {
        &self.documents
    }

    pub fn document(&self, id: Uuid) -> Option<&DocumentRecord> {
        self.documents.iter().find(|d| d.id == id)
    }

    /// Ingest one document's text.
    pub fn ingest(&mut self, text: &str, provider: &dyn ExtractionProvider) -> IngestOutcome {
        let prepared = Prepared::run(text, provider);
        self.commit(prepared)
    }

    /// Ingest several texts. Per-document work runs on scoped threads, at
    /// most one per available core at a time; outcomes and commits follow
    /// input order.
    pub fn ingest_batch(&mut self, texts: &[&str], provider: &dyn ExtractionProvider) -> Vec<IngestOutcome> {
        let prepared: Vec<Prepared> = texts
            .chunks(worker_count())
            .flat_map(|chunk| {
                std::thread::scope(|scope| {
                    let handles: Vec<_> = chunk
                        .iter()
                        .map(|text| scope.spawn(move || Prepared::run(text, provider)))
                        .collect();
                    handles
                        .into_iter()
                        .zip(chunk)
                        .map(|(handle, text)| {
                            handle.join().unwrap_or_else(|_| {
                                tracing::warn!("Ingest worker panicked, keeping document with no extraction");
                                Prepared::from_extraction(
                                    text,
                                    ClassificationResult::generic(),
                                    Extraction {
                                        diagnostics: vec![Diagnostic::provider_failed("extraction worker panicked")],
                                        ..Extraction::default()
                                    },
                                )
                            })
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        prepared.into_iter().map(|p| self.commit(p)).collect()
    }

    fn commit(&mut self, prepared: Prepared) -> IngestOutcome {
        if let Some(existing) = self
            .documents
            .iter()
            .find(|d| d.content_hashes.contains(&prepared.content_hash))
        {
            tracing::info!(
                document_id = %existing.id,
                fingerprint = %existing.fingerprint,
                "Ingest: identical content already tracked"
            );
            return IngestOutcome {
                document_id: existing.id,
                fingerprint: existing.fingerprint.clone(),
                status: DuplicateStatus::AlreadyTracked {
                    existing_id: existing.id,
                },
                classification: prepared.classification,
                line_items_added: 0,
                diagnostics_added: 0,
            };
        }

        let same_identity = if prepared.weak_identity() {
            None
        } else {
            self.documents
                .iter_mut()
                .find(|d| d.fingerprint == prepared.fingerprint)
        };

        match same_identity {
            Some(record) => {
                let incoming = normalize(record.id, &prepared.rows);
                let (mut items, repeated) = drop_repeated_rows(
                    &record.line_items,
                    incoming,
                    self.config.coverage.description_threshold,
                );
                let offset = record.line_items.len();
                for (k, item) in items.iter_mut().enumerate() {
                    item.row_index = offset + k;
                }
                let added = items.len();
                let repeated_count = repeated.len();
                let diagnostics_added = prepared.diagnostics.len() + repeated_count + flagged(&items);

                record.content_hashes.push(prepared.content_hash);
                record.line_items.extend(items);
                record.diagnostics.extend(prepared.diagnostics);
                record.diagnostics.extend(repeated);

                tracing::info!(
                    document_id = %record.id,
                    fingerprint = %record.fingerprint,
                    part = record.part_count(),
                    line_items = added,
                    repeated = repeated_count,
                    "Ingest: appended further part of known document"
                );

                IngestOutcome {
                    document_id: record.id,
                    fingerprint: record.fingerprint.clone(),
                    status: DuplicateStatus::PossibleDuplicate {
                        existing_id: record.id,
                    },
                    classification: prepared.classification,
                    line_items_added: added,
                    diagnostics_added,
                }
            }
            None => {
                let id = Uuid::new_v4();
                let items = normalize(id, &prepared.rows);
                let outcome = IngestOutcome {
                    document_id: id,
                    fingerprint: prepared.fingerprint.clone(),
                    status: DuplicateStatus::New,
                    classification: prepared.classification.clone(),
                    line_items_added: items.len(),
                    diagnostics_added: prepared.diagnostics.len() + flagged(&items),
                };

                tracing::info!(
                    document_id = %id,
                    fingerprint = %prepared.fingerprint,
                    document_type = %prepared.classification.document_type,
                    confidence = prepared.classification.confidence,
                    line_items = items.len(),
                    weak_identity = prepared.weak_identity(),
                    "Ingest: new document"
                );

                self.documents.push(DocumentRecord {
                    id,
                    fingerprint: prepared.fingerprint,
                    canonical: prepared.canonical,
                    content_hashes: vec![prepared.content_hash],
                    classification: prepared.classification,
                    facts: prepared.facts,
                    line_items: items,
                    diagnostics: prepared.diagnostics,
                    ingested_at: Utc::now(),
                    review_status: ReviewStatus::Pending,
                    actions: Vec::new(),
                });
                outcome
            }
        }
    }

    /// Update a document's review status. Returns `false` for unknown ids.
    pub fn set_review_status(&mut self, document_id: Uuid, status: ReviewStatus) -> bool {
        match self.documents.iter_mut().find(|d| d.id == document_id) {
            Some(record) => {
                tracing::debug!(document_id = %document_id, status = %status, "Review status updated");
                record.review_status = status;
                true
            }
            None => false,
        }
    }

    /// Record a user action on a document. Returns `false` for unknown ids.
    pub fn annotate(&mut self, document_id: Uuid, note: impl Into<String>) -> bool {
        match self.documents.iter_mut().find(|d| d.id == document_id) {
            Some(record) => {
                record.actions.push(DocumentAction {
                    note: note.into(),
                    recorded_at: Utc::now(),
                });
                true
            }
            None => false,
        }
    }

    /// All line items, document by document in ingestion order.
    pub fn line_items(&self) -> Vec<NormalizedLineItem> {
        self.documents
            .iter()
            .flat_map(|d| d.line_items.iter().cloned())
            .collect()
    }

    pub fn coverage(&self) -> CoverageMatrix {
        build_coverage(&self.line_items(), &self.config.coverage)
    }

    pub fn analysis(&self) -> Analysis {
        let items = self.line_items();
        let coverage = build_coverage(&items, &self.config.coverage);
        detect_issues(&items, &coverage)
    }

    /// Detected savings plus those of an external analysis, if supplied.
    pub fn savings(&self, external: Option<&Value>) -> SavingsBreakdown {
        let detected = aggregate_savings(Some(&self.analysis().to_json()));
        breakdown(detected, external)
    }

    pub fn report(&self, external: Option<&Value>) -> SessionReport {
        let items = self.line_items();
        let coverage = build_coverage(&items, &self.config.coverage);
        let analysis = detect_issues(&items, &coverage);
        let savings = breakdown(aggregate_savings(Some(&analysis.to_json())), external);

        SessionReport {
            session_id: self.id,
            generated_at: Utc::now(),
            documents: self.documents.clone(),
            coverage,
            analysis,
            savings,
        }
    }

    /// One snapshot per fingerprint. Documents sharing a weak fingerprint
    /// share a snapshot.
    pub fn snapshots(&self, coverage: &CoverageMatrix) -> Vec<DocumentSnapshot> {
        let mut grouped: BTreeMap<&Fingerprint, Vec<&DocumentRecord>> = BTreeMap::new();
        for record in &self.documents {
            grouped.entry(&record.fingerprint).or_default().push(record);
        }

        let saved_at = Utc::now();
        grouped
            .into_iter()
            .map(|(fp, records)| {
                let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
                DocumentSnapshot {
                    fingerprint: fp.clone(),
                    canonical: records[0].canonical.clone(),
                    facts: records[0].facts.clone(),
                    line_items: records
                        .iter()
                        .flat_map(|r| r.line_items.iter().cloned())
                        .collect(),
                    coverage_rows: coverage
                        .rows
                        .iter()
                        .filter(|row| row.source_documents.iter().any(|d| ids.contains(d)))
                        .cloned()
                        .collect(),
                    saved_at,
                }
            })
            .collect()
    }

    /// Write every document snapshot to `store`. Returns how many were written.
    pub fn persist(&self, store: &dyn SnapshotStore) -> Result<usize, StoreError> {
        let snapshots = self.snapshots(&self.coverage());
        let count = snapshots.len();
        for snapshot in snapshots {
            let key = snapshot.fingerprint.clone();
            store.put(&key, snapshot)?;
        }
        tracing::info!(session_id = %self.id, snapshots = count, "Session persisted");
        Ok(count)
    }

    /// Write the report and snapshots under the configured dump directory.
    /// Does nothing when no directory is configured. Never fails.
    pub fn dump(&self, report: &SessionReport) -> Option<PathBuf> {
        let base = self.config.dump_dir.as_deref()?;
        let dump = SessionDump::open(base, &self.id)?;

        let mut written = usize::from(dump.write_json("00-report.json", report));
        for snapshot in self.snapshots(&report.coverage) {
            let fp = &snapshot.fingerprint;
            written += usize::from(dump.write_text(&format!("01-{fp}-canonical.txt"), &snapshot.canonical));
            written += usize::from(dump.write_json(&format!("01-{fp}-snapshot.json"), &snapshot));
        }

        tracing::info!(path = %dump.dir().display(), files = written, "Session dump written");
        Some(dump.dir().to_path_buf())
    }
}

/// Split off incoming rows the record already carries, each existing row
/// absorbing at most one incoming copy. A re-scanned page yields the same
/// rows with slightly different text; a new page yields new rows.
fn drop_repeated_rows(
    existing: &[NormalizedLineItem],
    incoming: Vec<NormalizedLineItem>,
    description_threshold: f64,
) -> (Vec<NormalizedLineItem>, Vec<Diagnostic>) {
    let mut claimed = vec![false; existing.len()];
    let mut fresh = Vec::new();
    let mut repeated = Vec::new();

    for item in incoming {
        let hit = (0..existing.len())
            .find(|&i| !claimed[i] && same_row(&existing[i], &item, description_threshold));
        match hit {
            Some(i) => {
                claimed[i] = true;
                repeated.push(Diagnostic::repeated_row(item.row_index, existing[i].row_index));
            }
            None => fresh.push(item),
        }
    }

    (fresh, repeated)
}

/// Same lens, date and amounts, and the same code or a close description.
fn same_row(a: &NormalizedLineItem, b: &NormalizedLineItem, description_threshold: f64) -> bool {
    let same_amounts = a.billed == b.billed
        && a.allowed == b.allowed
        && a.patient_responsibility == b.patient_responsibility
        && a.insurance_paid == b.insurance_paid;
    if a.amount_kind != b.amount_kind || a.date_of_service != b.date_of_service || !same_amounts {
        return false;
    }

    match (&a.code, &b.code) {
        (Field::Known(x), Field::Known(y)) => x.eq_ignore_ascii_case(y),
        _ => match (&a.description, &b.description) {
            (Field::Known(x), Field::Known(y)) => {
                description_similarity(x, y) >= description_threshold
            }
            (Field::Unknown, Field::Unknown) => true,
            _ => false,
        },
    }
}

fn flagged(items: &[NormalizedLineItem]) -> usize {
    items.iter().map(|i| i.diagnostics.len()).sum()
}

fn breakdown(detected: Money, external: Option<&Value>) -> SavingsBreakdown {
    let external = aggregate_savings(external);
    SavingsBreakdown {
        detected,
        external,
        total: detected + external,
    }
}
