//! Parsing one chunk's extraction output into a fragment

use super::types::{RiskLevel, Rule, RULE_CATEGORIES};
use serde_json::{Map, Value};
use thiserror::Error;

/// Why a fragment could not be folded. Recovered by skipping the fragment.
#[derive(Debug, Error)]
pub enum FragmentParseError {
    #[error("fragment is empty")]
    Empty,

    #[error("fragment is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("fragment is not a JSON object")]
    NotAnObject,
}

/// Strip an optional fenced code block (```` ```json ... ``` ````) and
/// surrounding whitespace.
pub fn strip_fences(text: &str) -> &str {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    }
    if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Flags and observations declared by one fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FragmentFlags {
    pub ambiguities: Vec<Value>,
    pub conflicts: Vec<Value>,
    pub missing_provisions: Vec<Value>,
    pub tenant_concerns: Vec<Value>,
    pub provisions_spanning_to_next_page: Option<Vec<Value>>,
}

/// The summary block declared by one fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FragmentSummary {
    /// Declared counts for recognized categories only
    pub declared_counts: Vec<(&'static str, u64)>,
    /// `None` when absent or not a recognized level
    pub risk: Option<RiskLevel>,
    pub protections: Vec<Value>,
    pub exposures: Vec<Value>,
}

/// One chunk's extraction output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pub page_analysis: Option<Map<String, Value>>,
    pub new_rules: Vec<Rule>,
    pub continued_rules: Vec<Value>,
    pub cross_page_context: Vec<Value>,
    pub all_extracted_rules: Vec<Value>,
    pub flags: Option<FragmentFlags>,
    pub summary: Option<FragmentSummary>,
}

impl Fragment {
    /// Parse fragment text, tolerating a fenced code block around it.
    pub fn parse(text: &str) -> Result<Self, FragmentParseError> {
        let cleaned = strip_fences(text);
        if cleaned.is_empty() {
            return Err(FragmentParseError::Empty);
        }
        let value: Value = serde_json::from_str(cleaned)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, FragmentParseError> {
        let obj = value.as_object().ok_or(FragmentParseError::NotAnObject)?;

        // extractedCamRules wins over newCamRules when both are present
        let new_rules = if present(obj, "extractedCamRules") {
            list(obj, "extractedCamRules")
        } else {
            list(obj, "newCamRules")
        }
        .into_iter()
        .map(Rule)
        .collect();

        Ok(Self {
            page_analysis: obj.get("pageAnalysis").and_then(Value::as_object).cloned(),
            new_rules,
            continued_rules: list(obj, "continuedRules"),
            cross_page_context: list(obj, "crossPageContext"),
            all_extracted_rules: list(obj, "allExtractedRules"),
            flags: obj
                .get("flagsAndObservations")
                .and_then(Value::as_object)
                .map(parse_flags),
            summary: obj
                .get("cumulativeCamRulesSummary")
                .and_then(Value::as_object)
                .map(parse_summary),
        })
    }
}

fn present(obj: &Map<String, Value>, key: &str) -> bool {
    obj.get(key).is_some_and(|v| !v.is_null())
}

/// Items of an array field; absent or non-array fields contribute nothing.
fn list(obj: &Map<String, Value>, key: &str) -> Vec<Value> {
    match obj.get(key) {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

fn parse_flags(obj: &Map<String, Value>) -> FragmentFlags {
    FragmentFlags {
        ambiguities: list(obj, "ambiguities"),
        conflicts: list(obj, "conflicts"),
        missing_provisions: list(obj, "missingProvisions"),
        tenant_concerns: list(obj, "tenantConcerns"),
        provisions_spanning_to_next_page: match obj.get("provisionsSpanningToNextPage") {
            Some(Value::Array(items)) => Some(items.clone()),
            _ => None,
        },
    }
}

fn parse_summary(obj: &Map<String, Value>) -> FragmentSummary {
    let declared_counts = obj
        .get("rulesByCategory")
        .and_then(Value::as_object)
        .map(|counts| {
            RULE_CATEGORIES
                .iter()
                .filter_map(|category| {
                    let n = counts.get(*category)?;
                    Some((*category, n.as_u64().unwrap_or(0)))
                })
                .collect()
        })
        .unwrap_or_default();

    FragmentSummary {
        declared_counts,
        risk: obj
            .get("overallTenantRiskAssessment")
            .and_then(Value::as_str)
            .and_then(RiskLevel::parse),
        protections: list(obj, "keyTenantProtections"),
        exposures: list(obj, "keyTenantExposures"),
    }
}
