pub mod heuristic;
pub mod raw;

pub use heuristic::HeuristicExtractor;
pub use raw::{parse_provider_output, Extraction};

use serde_json::Value;
use thiserror::Error;

use crate::models::diagnostic::Diagnostic;
use crate::models::enums::DocumentType;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider timed out after {0} ms")]
    Timeout(u64),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Semi-structured output of an extraction provider.
///
/// Expected layout is `{"facts": {...}, "line_items": [...]}`; the parser
/// tolerates variations (see `raw::parse_provider_output`).
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderOutput(pub Value);

impl ProviderOutput {
    /// Parse a model response, taking the first ```json fenced block if
    /// there is one and the whole response otherwise.
    pub fn from_response(response: &str) -> Result<Self, ExtractionError> {
        let body = match response.find("```json") {
            Some(start) => {
                let content = &response[start + 7..];
                let end = content.find("```").ok_or_else(|| {
                    ExtractionError::MalformedResponse("Unclosed JSON block".into())
                })?;
                &content[..end]
            }
            None => response,
        };
        Ok(Self(serde_json::from_str(body.trim())?))
    }

    pub fn value(&self) -> &Value {
        &self.0
    }
}

/// Turns raw document text into facts and line-item records.
///
/// Implementations own their timeouts and retries. Callers never see a
/// failure as fatal: see [`run_provider`].
pub trait ExtractionProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn extract(
        &self,
        text: &str,
        document_type: DocumentType,
    ) -> Result<ProviderOutput, ExtractionError>;
}

/// Call a provider and parse its output. A provider failure yields an empty
/// extraction carrying a `ProviderFailed` diagnostic.
pub fn run_provider(
    provider: &dyn ExtractionProvider,
    text: &str,
    document_type: DocumentType,
) -> Extraction {
    match provider.extract(text, document_type) {
        Ok(output) => parse_provider_output(output.value(), document_type),
        Err(e) => {
            tracing::warn!(
                provider = provider.name(),
                document_type = %document_type,
                error = %e,
                "Extraction provider failed, continuing with empty extraction"
            );
            Extraction {
                diagnostics: vec![Diagnostic::provider_failed(&e.to_string())],
                ..Extraction::default()
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockProvider;
    use super::*;
    use crate::models::diagnostic::DiagnosticKind;
    use crate::models::facts::FactKey;
    use serde_json::json;

    #[test]
    fn response_with_fenced_json() {
        let response = "Here you go:\n```json\n{\"facts\": {\"patient_name\": \"Jane\"}}\n```\nDone.";
        let output = ProviderOutput::from_response(response).unwrap();
        assert_eq!(output.value()["facts"]["patient_name"], "Jane");
    }

    #[test]
    fn response_without_fence_is_parsed_whole() {
        let output = ProviderOutput::from_response(" [] ").unwrap();
        assert_eq!(output.value(), &json!([]));
    }

    #[test]
    fn unclosed_fence_is_malformed() {
        let err = ProviderOutput::from_response("```json {\"a\": 1}").unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedResponse(_)));
    }

    #[test]
    fn invalid_json_is_error() {
        let err = ProviderOutput::from_response("{not json").unwrap_err();
        assert!(matches!(err, ExtractionError::Json(_)));
    }

    #[test]
    fn failing_provider_degrades_to_empty() {
        let extraction = run_provider(&MockProvider::failing(), "text", DocumentType::MedicalBill);
        assert!(extraction.facts.is_empty());
        assert!(extraction.line_items.is_empty());
        assert_eq!(extraction.diagnostics.len(), 1);
        assert_eq!(extraction.diagnostics[0].kind, DiagnosticKind::ProviderFailed);
        assert!(extraction.diagnostics[0].message.contains("connection refused"));
    }

    #[test]
    fn provider_output_is_parsed() {
        let provider = MockProvider::returning(json!({
            "facts": {"patient_name": "Jane Roe"},
            "line_items": [{"description": "Office visit", "billed": 180}]
        }));
        let extraction = run_provider(&provider, "text", DocumentType::MedicalBill);
        assert_eq!(extraction.facts.get(FactKey::PatientName), Some("Jane Roe"));
        assert_eq!(extraction.line_items.len(), 1);
    }
}
