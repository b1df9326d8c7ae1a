//! Document identity: canonical fact strings and their truncated digests.
//!
//! The fingerprint is the key persistence collaborators address documents by.
//! It is 64 bits of SHA-256; widening it changes the storage key width.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::facts::{ExtractedFacts, FactKey};

/// Placeholder for an absent fact in the canonical string.
pub const MISSING_SENTINEL: &str = "_";

/// Hex characters kept from the digest.
pub const FINGERPRINT_HEX_LEN: usize = 16;

/// Truncated SHA-256 of a canonical identity string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build the canonical identity string for a fact set.
///
/// Keys follow `FactKey::ALL`; values are trimmed and lower-cased, absent
/// ones become `_`. Separators inside values are backslash-escaped, and so
/// is a literal `_`, so distinct fact sets never share a string. Never fails.
pub fn canonicalize(facts: &ExtractedFacts) -> String {
    FactKey::ALL
        .iter()
        .map(|key| {
            let value = facts
                .get(*key)
                .map(|v| v.trim().to_lowercase())
                .filter(|v| !v.is_empty())
                .map(|v| escape_value(&v))
                .unwrap_or_else(|| MISSING_SENTINEL.to_string());
            format!("{}={}", key.as_str(), value)
        })
        .collect::<Vec<_>>()
        .join("|")
}

fn escape_value(value: &str) -> String {
    if value == MISSING_SENTINEL {
        return format!("\\{MISSING_SENTINEL}");
    }
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '|' | '=') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// First 16 hex characters of the SHA-256 of `canonical`.
pub fn fingerprint(canonical: &str) -> Fingerprint {
    let digest = format!("{:x}", Sha256::digest(canonical.as_bytes()));
    Fingerprint(digest[..FINGERPRINT_HEX_LEN].to_string())
}

pub fn fingerprint_facts(facts: &ExtractedFacts) -> Fingerprint {
    fingerprint(&canonicalize(facts))
}

/// Full SHA-256 hex of raw document text with whitespace runs folded.
///
/// Two pastes differing only in line breaks or spacing hash the same.
pub fn content_hash(text: &str) -> String {
    let folded = text.split_whitespace().collect::<Vec<_>>().join(" ");
    format!("{:x}", Sha256::digest(folded.as_bytes()))
}
