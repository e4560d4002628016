//! Model response → `AnalysisResult`.
//!
//! repair → parse → schema check → back-fill → per-metric normalization →
//! risk summary. Every failure is a distinct `AnalysisError`.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::normalize::{
    backfill_prose, backfill_recommendations, derive_categories, parse_patient_info,
    string_list, value_to_string, RawMetric, FALLBACK_DETAILED_ANALYSIS, FALLBACK_SUMMARY,
};
use super::AnalysisError;
use crate::models::{AnalysisResult, HealthMetric, RiskSummary};

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json|JSON)?\s*([\s\S]*?)```").unwrap());

static TRAILING_COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",\s*([}\]])").unwrap());

/// Attempts at trimming a truncated response back to its last complete element.
const MAX_TRUNCATION_STEPS: usize = 64;

/// Candidate JSON text: the first fenced block holding an object, else the
/// span from the first `{` to the last `}`, or to the end of the response
/// when that span doesn't close the object.
pub fn extract_json_candidate(response: &str) -> Option<String> {
    if let Some(block) = FENCED_BLOCK
        .captures_iter(response)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .find(|b| b.starts_with('{'))
    {
        return Some(block.to_string());
    }

    let start = response.find('{')?;
    let closed_at = response
        .rfind('}')
        .filter(|&end| end > start)
        .map(|end| end + 1)
        .filter(|&end| {
            let state = scan(&response[start..end]);
            state.closers.is_empty() && !state.in_string
        });
    let candidate = match closed_at {
        Some(end) => &response[start..end],
        // Object never closes: the response was cut off.
        None => &response[start..],
    };
    Some(candidate.trim().trim_end_matches('`').trim_end().to_string())
}

/// Lexical state at the end of a JSON fragment.
struct ScanState {
    /// Closers for every bracket still open, innermost last.
    closers: Vec<char>,
    in_string: bool,
    /// Byte offset of the last comma outside strings.
    last_comma: Option<usize>,
}

fn scan(json: &str) -> ScanState {
    let mut state = ScanState {
        closers: Vec::new(),
        in_string: false,
        last_comma: None,
    };
    let mut escaped = false;

    for (i, c) in json.char_indices() {
        if state.in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => state.in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => state.in_string = true,
            '{' => state.closers.push('}'),
            '[' => state.closers.push(']'),
            '}' | ']' => {
                if state.closers.last() == Some(&c) {
                    state.closers.pop();
                }
            }
            ',' => state.last_comma = Some(i),
            _ => {}
        }
    }
    state
}

/// Close an unterminated string and every open bracket.
fn close_open_structures(json: &str) -> String {
    let state = scan(json);
    let mut out = json.to_string();
    if state.in_string {
        out.push('"');
    }
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if out.ends_with(',') {
        out.pop();
    }
    if out.ends_with(':') {
        out.push_str("null");
    }
    out.extend(state.closers.iter().rev());
    out
}

/// Recover a response cut off mid-document: close what is open, and if the
/// last element is itself incomplete, drop it and try again.
fn close_truncated(json: &str) -> String {
    let mut current = json.trim_end().to_string();
    for _ in 0..MAX_TRUNCATION_STEPS {
        let closed = close_open_structures(&current);
        if serde_json::from_str::<Value>(&closed).is_ok() {
            return closed;
        }
        match scan(&current).last_comma {
            Some(pos) => current.truncate(pos),
            None => return closed,
        }
    }
    close_open_structures(&current)
}

/// Turn typographic quotes used as string delimiters into ASCII quotes.
///
/// Typographic quotes inside an ASCII-quoted string are content and stay
/// as they are. ASCII quotes inside a typographically quoted string are
/// escaped.
fn normalize_quote_delimiters(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Delimiter that opened the current string, if inside one.
    let mut open: Option<char> = None;
    let mut escaped = false;

    for c in text.chars() {
        match open {
            None => match c {
                '"' => {
                    open = Some('"');
                    out.push('"');
                }
                '\u{201c}' | '\u{201d}' => {
                    open = Some('\u{201d}');
                    out.push('"');
                }
                '\u{2018}' | '\u{2019}' => out.push('\''),
                _ => out.push(c),
            },
            Some(_) if escaped => {
                escaped = false;
                out.push(c);
            }
            Some(delimiter) => match c {
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' if delimiter == '"' => {
                    open = None;
                    out.push('"');
                }
                '"' => out.push_str("\\\""),
                '\u{201c}' | '\u{201d}' if delimiter != '"' => {
                    open = None;
                    out.push('"');
                }
                _ => out.push(c),
            },
        }
    }
    out
}

/// Fix the usual ways model output is almost-JSON: byte order mark, smart
/// quotes used as delimiters, trailing commas, and truncation.
pub fn repair_json(candidate: &str) -> String {
    let cleaned = normalize_quote_delimiters(candidate.trim_start_matches('\u{feff}'));
    let cleaned = TRAILING_COMMA.replace_all(&cleaned, "$1").into_owned();

    let state = scan(&cleaned);
    if state.closers.is_empty() && !state.in_string {
        return cleaned;
    }

    let closed = close_truncated(&cleaned);
    TRAILING_COMMA.replace_all(&closed, "$1").into_owned()
}

fn parse_json(candidate: &str) -> Result<Value, AnalysisError> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(value) => Ok(value),
        Err(first_error) => {
            let repaired = repair_json(candidate);
            serde_json::from_str::<Value>(&repaired).map_err(|e| {
                tracing::warn!(error = %first_error, "Response JSON could not be repaired");
                AnalysisError::Parse(e.to_string())
            })
        }
    }
}

/// Parse, validate and normalize a model response.
pub fn parse_analysis_response(response: &str) -> Result<AnalysisResult, AnalysisError> {
    let candidate = extract_json_candidate(response).ok_or(AnalysisError::NoJsonFound)?;
    let value = parse_json(&candidate)?;
    let object = value
        .as_object()
        .ok_or_else(|| AnalysisError::Parse("top-level value is not an object".into()))?;

    let Some(Value::Array(items)) = object.get("metrics") else {
        return Err(AnalysisError::MissingMetrics);
    };

    let metrics: Vec<HealthMetric> = items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            if !item.is_object() {
                tracing::warn!(index, "Skipping metric that is not an object");
                return None;
            }
            match serde_json::from_value::<RawMetric>(item.clone()) {
                Ok(raw) => Some(raw.into_metric()),
                Err(e) => {
                    tracing::warn!(index, error = %e, "Skipping unreadable metric");
                    None
                }
            }
        })
        .collect();

    if metrics.is_empty() {
        return Err(AnalysisError::EmptyMetrics);
    }

    let summary = backfill_prose(
        object.get("summary").and_then(value_to_string),
        FALLBACK_SUMMARY,
        "summary",
    );
    let detailed_analysis = backfill_prose(
        object.get("detailedAnalysis").and_then(value_to_string),
        FALLBACK_DETAILED_ANALYSIS,
        "detailedAnalysis",
    );
    let recommendations = backfill_recommendations(string_list(object.get("recommendations")));

    let mut categories = Vec::new();
    for category in string_list(object.get("categories")) {
        if !categories.contains(&category) {
            categories.push(category);
        }
    }
    if categories.is_empty() {
        categories = derive_categories(&metrics);
    }

    let patient_info = object.get("patientInfo").and_then(parse_patient_info);
    let risk_summary = RiskSummary::from_metrics(&metrics);

    tracing::debug!(
        metric_count = metrics.len(),
        abnormal = risk_summary.abnormal_count(),
        "Analysis response parsed"
    );

    Ok(AnalysisResult {
        patient_info,
        metrics,
        summary,
        detailed_analysis,
        recommendations,
        categories,
        risk_summary: Some(risk_summary),
        model_used: None,
    })
}
