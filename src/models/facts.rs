use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Semantic keys that identify a billing document.
///
/// `ALL` fixes the canonical order used for fingerprinting. Never reorder it:
/// every stored fingerprint depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKey {
    DocumentType,
    FacilityName,
    ProviderName,
    PatientName,
    DateOfBirth,
    DateOfService,
    ProcedureCode,
}

impl FactKey {
    pub const ALL: [FactKey; 7] = [
        FactKey::DocumentType,
        FactKey::FacilityName,
        FactKey::ProviderName,
        FactKey::PatientName,
        FactKey::DateOfBirth,
        FactKey::DateOfService,
        FactKey::ProcedureCode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FactKey::DocumentType => "document_type",
            FactKey::FacilityName => "facility_name",
            FactKey::ProviderName => "provider_name",
            FactKey::PatientName => "patient_name",
            FactKey::DateOfBirth => "date_of_birth",
            FactKey::DateOfService => "date_of_service",
            FactKey::ProcedureCode => "procedure_code",
        }
    }

    pub fn from_name(name: &str) -> Option<FactKey> {
        FactKey::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

/// Identity facts pulled out of one document. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractedFacts {
    values: BTreeMap<FactKey, String>,
}

impl ExtractedFacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder step. Blank values leave the fact absent.
    pub fn with(mut self, key: FactKey, value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            self.values.remove(&key);
        } else {
            self.values.insert(key, value);
        }
        self
    }

    /// Build from `(name, value)` pairs; unknown names are ignored.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        pairs
            .into_iter()
            .fold(Self::new(), |facts, (name, value)| match FactKey::from_name(name) {
                Some(key) => facts.with(key, value),
                None => facts,
            })
    }

    pub fn get(&self, key: FactKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    pub fn known_count(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
