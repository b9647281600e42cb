//! Cumulative CAM-rule result types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Overall tenant risk, ordered `Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Parse a declared level. Unrecognized text yields `None`, so it can
    /// never raise the running level.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The recognized rule categories, in reporting order.
pub const RULE_CATEGORIES: [&str; 14] = [
    "proportionateShare",
    "camExpenseCategories",
    "exclusions",
    "paymentTerms",
    "capsLimitations",
    "reconciliationProcedures",
    "baseYearProvisions",
    "grossUpProvisions",
    "administrativeFees",
    "auditRights",
    "noticeRequirements",
    "controllableVsNonControllable",
    "definitions",
    "calculationMethods",
];

/// Per-category rule tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCounts {
    pub proportionate_share: u64,
    pub cam_expense_categories: u64,
    pub exclusions: u64,
    pub payment_terms: u64,
    pub caps_limitations: u64,
    pub reconciliation_procedures: u64,
    pub base_year_provisions: u64,
    pub gross_up_provisions: u64,
    pub administrative_fees: u64,
    pub audit_rights: u64,
    pub notice_requirements: u64,
    pub controllable_vs_non_controllable: u64,
    pub definitions: u64,
    pub calculation_methods: u64,
}

impl CategoryCounts {
    /// Counter for a category key, or `None` if the key isn't recognized
    pub fn slot_mut(&mut self, category: &str) -> Option<&mut u64> {
        let slot = match category {
            "proportionateShare" => &mut self.proportionate_share,
            "camExpenseCategories" => &mut self.cam_expense_categories,
            "exclusions" => &mut self.exclusions,
            "paymentTerms" => &mut self.payment_terms,
            "capsLimitations" => &mut self.caps_limitations,
            "reconciliationProcedures" => &mut self.reconciliation_procedures,
            "baseYearProvisions" => &mut self.base_year_provisions,
            "grossUpProvisions" => &mut self.gross_up_provisions,
            "administrativeFees" => &mut self.administrative_fees,
            "auditRights" => &mut self.audit_rights,
            "noticeRequirements" => &mut self.notice_requirements,
            "controllableVsNonControllable" => &mut self.controllable_vs_non_controllable,
            "definitions" => &mut self.definitions,
            "calculationMethods" => &mut self.calculation_methods,
            _ => return None,
        };
        Some(slot)
    }

    pub fn get(&self, category: &str) -> Option<u64> {
        let mut copy = *self;
        copy.slot_mut(category).copied()
    }

    /// Add `n` to a category; unrecognized categories are ignored.
    pub fn add(&mut self, category: &str, n: u64) -> bool {
        match self.slot_mut(category) {
            Some(slot) => {
                *slot += n;
                true
            }
            None => false,
        }
    }

    /// (category, count) pairs in reporting order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        RULE_CATEGORIES
            .iter()
            .map(move |c| (*c, self.get(c).unwrap_or_default()))
    }

    pub fn total(&self) -> u64 {
        self.iter().map(|(_, n)| n).sum()
    }
}

/// Typed `ruleId`, so `7` and `"7"` stay different rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleKey {
    Text(String),
    Number(String),
}

/// One extracted CAM rule.
///
/// Rules are free-form; only `ruleId` (identity) and `ruleCategory` are
/// interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rule(pub Value);

impl Rule {
    /// Display form of `ruleId`, if the rule has one.
    pub fn id(&self) -> Option<String> {
        match self.key()? {
            RuleKey::Text(s) | RuleKey::Number(s) => Some(s),
        }
    }

    /// Identity key used for deduplication. Rules without one are never
    /// deduplicated. A numeric id and its string spelling are distinct.
    pub fn key(&self) -> Option<RuleKey> {
        match self.0.get("ruleId")? {
            Value::String(s) if !s.is_empty() => Some(RuleKey::Text(s.clone())),
            Value::Number(n) => Some(RuleKey::Number(n.to_string())),
            _ => None,
        }
    }

    pub fn category(&self) -> Option<&str> {
        self.0.get("ruleCategory").and_then(Value::as_str)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for Rule {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Page position of the most recent analysis; fields overwrite individually.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageAnalysis(pub Map<String, Value>);

impl Default for PageAnalysis {
    fn default() -> Self {
        let mut fields = Map::new();
        fields.insert("currentPage".into(), Value::from(0));
        fields.insert("previousPage".into(), Value::from("N/A"));
        fields.insert("nextPage".into(), Value::from("N/A"));
        fields.insert("analysisTimestamp".into(), Value::from(""));
        Self(fields)
    }
}

impl PageAnalysis {
    /// Overwrite the fields present in `update`; leave the rest.
    pub fn apply(&mut self, update: &Map<String, Value>) {
        for (key, value) in update {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagsAndObservations {
    pub ambiguities: Vec<Value>,
    pub conflicts: Vec<Value>,
    pub missing_provisions: Vec<Value>,
    pub tenant_concerns: Vec<Value>,
    /// Replaced wholesale by each fragment that declares it
    pub provisions_spanning_to_next_page: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesSummary {
    pub total_rules_extracted: u64,
    pub rules_by_category: CategoryCounts,
    pub overall_tenant_risk_assessment: RiskLevel,
    pub key_tenant_protections: Vec<Value>,
    pub key_tenant_exposures: Vec<Value>,
}

/// The cumulative result of folding a document's fragments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub page_analysis: PageAnalysis,
    pub new_cam_rules: Vec<Rule>,
    pub continued_rules: Vec<Value>,
    pub cross_page_context: Vec<Value>,
    pub flags_and_observations: FlagsAndObservations,
    pub cumulative_cam_rules_summary: RulesSummary,
    pub all_extracted_rules: Vec<Value>,
}

impl AggregateResult {
    pub fn risk(&self) -> RiskLevel {
        self.cumulative_cam_rules_summary.overall_tenant_risk_assessment
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
