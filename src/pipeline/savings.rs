//! Savings rollup over a semi-structured analysis result.

use serde_json::Value;

use crate::models::value::{parse_amount, Money};

const SAVINGS_KEY: &str = "potential_savings";

/// Total potential savings reported by an analysis.
///
/// Adds `summary.potential_savings`, every `issues[*].potential_savings` and a
/// top-level `potential_savings`. All three are summed even when they overlap;
/// the analysis producer owns not double-reporting. Missing, negative and
/// non-numeric values count as zero. Never fails.
pub fn aggregate_savings(analysis: Option<&Value>) -> Money {
    let Some(Value::Object(root)) = analysis else {
        return Money::ZERO;
    };

    let from_summary = root
        .get("summary")
        .and_then(|s| s.get(SAVINGS_KEY))
        .map(amount_of)
        .unwrap_or(Money::ZERO);

    let from_issues: Money = root
        .get("issues")
        .and_then(Value::as_array)
        .map(|issues| {
            issues
                .iter()
                .filter_map(|issue| issue.get(SAVINGS_KEY))
                .map(amount_of)
                .sum()
        })
        .unwrap_or(Money::ZERO);

    let top_level = root.get(SAVINGS_KEY).map(amount_of).unwrap_or(Money::ZERO);

    let total = from_summary + from_issues + top_level;
    tracing::debug!(
        summary = %from_summary,
        issues = %from_issues,
        top_level = %top_level,
        total = %total,
        "Savings aggregated"
    );
    total
}

/// Read one savings value; anything unusable is zero.
fn amount_of(value: &Value) -> Money {
    let parsed = match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|v| *v >= 0.0)
            .and_then(Money::from_f64),
        Value::String(s) => parse_amount(s),
        _ => None,
    };
    parsed.unwrap_or(Money::ZERO)
}
