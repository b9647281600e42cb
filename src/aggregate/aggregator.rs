//! Folding ordered fragments into one cumulative result

use super::error::AggregateError;
use super::fragment::{Fragment, FragmentFlags, FragmentSummary};
use super::source::FragmentSource;
use super::types::{AggregateResult, CategoryCounts, RuleKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// A fragment that was skipped, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub sequence: u64,
    pub reason: String,
}

/// What `fold` did with one fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOutcome {
    Folded,
    Skipped,
}

/// A finalized run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregation {
    pub result: AggregateResult,
    pub diagnostics: Vec<Diagnostic>,
    pub fragments_folded: usize,
    /// Sum of the per-fragment declared category counts. Informational
    /// only; `result` carries counts recomputed from the deduplicated rules.
    pub declared_by_category: CategoryCounts,
}

/// Sequential fold over one document's fragments.
///
/// Fragments must be offered in strictly increasing sequence order; the
/// aggregator never reorders. A fragment that fails to parse is skipped with
/// a diagnostic and the run continues.
#[derive(Debug, Default)]
pub struct ChunkAggregator {
    state: AggregateResult,
    seen_rule_ids: HashSet<RuleKey>,
    declared: CategoryCounts,
    last_sequence: Option<u64>,
    folded: usize,
    diagnostics: Vec<Diagnostic>,
}

impl ChunkAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The running result so far (category tallies not yet recomputed)
    pub fn current(&self) -> &AggregateResult {
        &self.state
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Fold one fragment's text.
    pub fn fold(&mut self, sequence: u64, text: &str) -> Result<FoldOutcome, AggregateError> {
        self.claim_sequence(sequence)?;
        match Fragment::parse(text) {
            Ok(fragment) => {
                self.apply(fragment);
                self.folded += 1;
                Ok(FoldOutcome::Folded)
            }
            Err(e) => {
                self.record_skip(sequence, e.to_string());
                Ok(FoldOutcome::Skipped)
            }
        }
    }

    /// Record a fragment that never arrived (e.g. its extraction failed).
    ///
    /// The sequence number is consumed as if the fragment had been folded,
    /// so diagnostics stay in sequence order.
    pub fn skip(&mut self, sequence: u64, reason: impl Into<String>) -> Result<(), AggregateError> {
        self.claim_sequence(sequence)?;
        self.record_skip(sequence, reason.into());
        Ok(())
    }

    fn record_skip(&mut self, sequence: u64, reason: String) {
        warn!(sequence, reason = %reason, "skipping fragment");
        self.diagnostics.push(Diagnostic { sequence, reason });
    }

    fn claim_sequence(&mut self, sequence: u64) -> Result<(), AggregateError> {
        if let Some(previous) = self.last_sequence {
            if sequence <= previous {
                return Err(AggregateError::OutOfOrder {
                    previous,
                    got: sequence,
                });
            }
        }
        self.last_sequence = Some(sequence);
        Ok(())
    }

    fn apply(&mut self, fragment: Fragment) {
        if let Some(page) = &fragment.page_analysis {
            self.state.page_analysis.apply(page);
        }

        for rule in fragment.new_rules {
            if let Some(key) = rule.key() {
                if !self.seen_rule_ids.insert(key) {
                    debug!(rule_id = ?rule.id(), "dropping duplicate rule");
                    continue;
                }
            }
            self.state.new_cam_rules.push(rule);
        }

        self.state.continued_rules.extend(fragment.continued_rules);
        self.state.cross_page_context.extend(fragment.cross_page_context);
        self.state
            .all_extracted_rules
            .extend(fragment.all_extracted_rules);

        if let Some(flags) = fragment.flags {
            self.apply_flags(flags);
        }
        if let Some(summary) = fragment.summary {
            self.apply_summary(summary);
        }
    }

    fn apply_flags(&mut self, flags: FragmentFlags) {
        let running = &mut self.state.flags_and_observations;
        running.ambiguities.extend(flags.ambiguities);
        running.conflicts.extend(flags.conflicts);
        running.missing_provisions.extend(flags.missing_provisions);
        running.tenant_concerns.extend(flags.tenant_concerns);
        if let Some(spanning) = flags.provisions_spanning_to_next_page {
            running.provisions_spanning_to_next_page = spanning;
        }
    }

    fn apply_summary(&mut self, summary: FragmentSummary) {
        for (category, n) in summary.declared_counts {
            self.declared.add(category, n);
        }

        let running = &mut self.state.cumulative_cam_rules_summary;
        if let Some(risk) = summary.risk {
            if risk > running.overall_tenant_risk_assessment {
                running.overall_tenant_risk_assessment = risk;
            }
        }
        append_unique(&mut running.key_tenant_protections, summary.protections);
        append_unique(&mut running.key_tenant_exposures, summary.exposures);
    }

    /// Close the run: recompute tallies from the deduplicated rules.
    pub fn finalize(self) -> Aggregation {
        let mut result = self.state;

        let mut tallies = CategoryCounts::default();
        for rule in &result.new_cam_rules {
            if let Some(category) = rule.category() {
                tallies.add(category, 1);
            }
        }
        if tallies != self.declared {
            debug!(
                recomputed = tallies.total(),
                declared = self.declared.total(),
                "declared category counts differ from deduplicated rules"
            );
        }

        let summary = &mut result.cumulative_cam_rules_summary;
        summary.rules_by_category = tallies;
        summary.total_rules_extracted = result.new_cam_rules.len() as u64;

        info!(
            fragments = self.folded,
            skipped = self.diagnostics.len(),
            rules = summary.total_rules_extracted,
            "aggregation finalized"
        );

        Aggregation {
            result,
            diagnostics: self.diagnostics,
            fragments_folded: self.folded,
            declared_by_category: self.declared,
        }
    }

    /// Fold everything `source` yields, finalize, and purge the source.
    ///
    /// An unreadable fragment is skipped with a diagnostic. The source is
    /// purged whether or not the run succeeds; failure to release transient
    /// storage is logged, not returned.
    pub fn run(mut self, source: &mut dyn FragmentSource) -> Result<Aggregation, AggregateError> {
        let drained = self.drain(source);
        if let Err(e) = source.purge() {
            warn!(error = %e, "could not purge fragment storage");
        }
        drained?;
        Ok(self.finalize())
    }

    fn drain(&mut self, source: &mut dyn FragmentSource) -> Result<(), AggregateError> {
        loop {
            let fragment = match source.next_fragment() {
                Ok(Some(fragment)) => fragment,
                Ok(None) => return Ok(()),
                Err(AggregateError::Unreadable { sequence, source: e }) => {
                    self.skip(sequence, format!("unreadable: {}", e))?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.fold(fragment.sequence, &fragment.text)?;
            if let Err(e) = source.acknowledge(fragment.sequence) {
                warn!(sequence = fragment.sequence, error = %e, "could not acknowledge fragment");
            }
        }
    }
}

fn append_unique(running: &mut Vec<Value>, incoming: Vec<Value>) {
    for item in incoming {
        if !running.contains(&item) {
            running.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::source::{MemoryFragments, RawFragment};
    use crate::aggregate::types::RiskLevel;
    use serde_json::json;

    fn fold_all(texts: &[String]) -> Aggregation {
        let mut aggregator = ChunkAggregator::new();
        for (i, text) in texts.iter().enumerate() {
            aggregator.fold(i as u64, text).unwrap();
        }
        aggregator.finalize()
    }

    fn risk_fragment(level: &str) -> String {
        json!({"cumulativeCamRulesSummary": {"overallTenantRiskAssessment": level}}).to_string()
    }

    #[test]
    fn test_duplicate_rule_keeps_first_payload() {
        let texts = vec![
            json!({"newCamRules": [{"ruleId": "R1", "ruleCategory": "exclusions", "text": "first"}]})
                .to_string(),
            json!({"newCamRules": [{"ruleId": "R1", "ruleCategory": "exclusions", "text": "second"}]})
                .to_string(),
        ];
        let result = fold_all(&texts).result;

        assert_eq!(result.new_cam_rules.len(), 1);
        assert_eq!(result.new_cam_rules[0].as_value()["text"], json!("first"));
    }

    #[test]
    fn test_rules_without_id_are_kept() {
        let texts = vec![
            json!({"newCamRules": [{"text": "a"}, {"text": "a"}]}).to_string(),
        ];
        assert_eq!(fold_all(&texts).result.new_cam_rules.len(), 2);
    }

    #[test]
    fn test_risk_never_regresses() {
        let texts: Vec<String> = ["Medium", "Low", "High"]
            .iter()
            .map(|l| risk_fragment(l))
            .collect();
        assert_eq!(fold_all(&texts).result.risk(), RiskLevel::High);

        let texts: Vec<String> = ["High", "Low"].iter().map(|l| risk_fragment(l)).collect();
        assert_eq!(fold_all(&texts).result.risk(), RiskLevel::High);

        let texts = vec![risk_fragment("Medium"), risk_fragment("Extreme")];
        assert_eq!(fold_all(&texts).result.risk(), RiskLevel::Medium);
    }

    #[test]
    fn test_accumulates_and_replaces() {
        let texts = vec![
            json!({
                "pageAnalysis": {"currentPage": 1, "nextPage": 2},
                "continuedRules": ["c1"],
                "crossPageContext": ["x1"],
                "allExtractedRules": [{"ruleId": "R1"}],
                "flagsAndObservations": {
                    "ambiguities": ["a1"],
                    "provisionsSpanningToNextPage": ["p1"]
                }
            })
            .to_string(),
            json!({
                "pageAnalysis": {"currentPage": 2},
                "continuedRules": ["c2"],
                "allExtractedRules": [{"ruleId": "R1"}],
                "flagsAndObservations": {
                    "ambiguities": ["a2"],
                    "tenantConcerns": ["t1"],
                    "provisionsSpanningToNextPage": ["p2"]
                }
            })
            .to_string(),
        ];
        let result = fold_all(&texts).result;

        assert_eq!(result.page_analysis.get("currentPage"), Some(&json!(2)));
        assert_eq!(result.page_analysis.get("nextPage"), Some(&json!(2)));
        assert_eq!(result.page_analysis.get("previousPage"), Some(&json!("N/A")));
        assert_eq!(result.continued_rules, vec![json!("c1"), json!("c2")]);
        assert_eq!(result.cross_page_context, vec![json!("x1")]);
        // allExtractedRules is a plain accumulation, not deduplicated
        assert_eq!(result.all_extracted_rules.len(), 2);

        let flags = &result.flags_and_observations;
        assert_eq!(flags.ambiguities, vec![json!("a1"), json!("a2")]);
        assert_eq!(flags.tenant_concerns, vec![json!("t1")]);
        assert_eq!(flags.provisions_spanning_to_next_page, vec![json!("p2")]);
    }

    #[test]
    fn test_protections_deduplicated_by_text() {
        let texts = vec![
            json!({"cumulativeCamRulesSummary": {
                "keyTenantProtections": ["5% cap", "audit right"],
                "keyTenantExposures": ["gross-up"]
            }})
            .to_string(),
            json!({"cumulativeCamRulesSummary": {
                "keyTenantProtections": ["audit right", "5% Cap"],
                "keyTenantExposures": ["gross-up"]
            }})
            .to_string(),
        ];
        let summary = fold_all(&texts).result.cumulative_cam_rules_summary;
        assert_eq!(
            summary.key_tenant_protections,
            vec![json!("5% cap"), json!("audit right"), json!("5% Cap")]
        );
        assert_eq!(summary.key_tenant_exposures, vec![json!("gross-up")]);
    }

    #[test]
    fn test_tallies_recomputed_from_deduplicated_rules() {
        let texts = vec![
            json!({
                "newCamRules": [
                    {"ruleId": "R1", "ruleCategory": "exclusions"},
                    {"ruleId": "R2", "ruleCategory": "auditRights"}
                ],
                "cumulativeCamRulesSummary": {"rulesByCategory": {"exclusions": 1, "auditRights": 1}}
            })
            .to_string(),
            json!({
                "newCamRules": [
                    {"ruleId": "R1", "ruleCategory": "exclusions"},
                    {"ruleId": "R3", "ruleCategory": "exclusions"},
                    {"ruleId": "R4", "ruleCategory": "parking"}
                ],
                "cumulativeCamRulesSummary": {"rulesByCategory": {"exclusions": 2}}
            })
            .to_string(),
        ];
        let aggregation = fold_all(&texts);
        let summary = &aggregation.result.cumulative_cam_rules_summary;

        assert_eq!(summary.total_rules_extracted, 4);
        assert_eq!(summary.rules_by_category.exclusions, 2);
        assert_eq!(summary.rules_by_category.audit_rights, 1);
        assert_eq!(aggregation.declared_by_category.exclusions, 3);
    }

    #[test]
    fn test_malformed_fragment_is_skipped() {
        let texts = vec![
            json!({"newCamRules": [{"ruleId": "R1"}]}).to_string(),
            "{ truncated".to_string(),
            "```json\n```".to_string(),
            format!("```json\n{}\n```", json!({"newCamRules": [{"ruleId": "R2"}]})),
        ];
        let aggregation = fold_all(&texts);

        assert_eq!(aggregation.fragments_folded, 2);
        assert_eq!(aggregation.result.new_cam_rules.len(), 2);
        let skipped: Vec<u64> = aggregation.diagnostics.iter().map(|d| d.sequence).collect();
        assert_eq!(skipped, vec![1, 2]);
    }

    #[test]
    fn test_out_of_order_is_rejected() {
        let mut aggregator = ChunkAggregator::new();
        aggregator.fold(3, "{}").unwrap();
        assert!(matches!(
            aggregator.fold(3, "{}"),
            Err(AggregateError::OutOfOrder { previous: 3, got: 3 })
        ));
        assert!(aggregator.fold(1, "{}").is_err());
        assert_eq!(aggregator.fold(7, "{}").unwrap(), FoldOutcome::Folded);
    }

    #[test]
    fn test_run_acknowledges_and_purges() {
        let mut source = MemoryFragments::from_texts([
            json!({"newCamRules": [{"ruleId": "R1"}]}).to_string(),
            "not json".to_string(),
        ]);
        let aggregation = ChunkAggregator::new().run(&mut source).unwrap();

        assert_eq!(aggregation.result.new_cam_rules.len(), 1);
        assert_eq!(source.acknowledged(), &[0, 1]);
        assert_eq!(source.purges(), 1);
    }

    #[test]
    fn test_numeric_and_text_rule_ids_are_distinct() {
        let texts = vec![
            json!({"newCamRules": [{"ruleId": 7, "text": "numeric"}]}).to_string(),
            json!({"newCamRules": [{"ruleId": "7", "text": "text"}, {"ruleId": 7}]}).to_string(),
        ];
        let rules = fold_all(&texts).result.new_cam_rules;

        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].as_value()["text"], json!("text"));
    }

    #[test]
    fn test_skip_claims_its_sequence() {
        let mut aggregator = ChunkAggregator::new();
        aggregator.fold(0, "{}").unwrap();
        aggregator.skip(2, "extraction failed").unwrap();
        assert!(matches!(
            aggregator.skip(1, "late"),
            Err(AggregateError::OutOfOrder { previous: 2, got: 1 })
        ));
        assert!(aggregator.fold(2, "{}").is_err());
        aggregator.skip(3, "extraction failed").unwrap();

        let skipped: Vec<u64> = aggregator.diagnostics().iter().map(|d| d.sequence).collect();
        assert_eq!(skipped, vec![2, 3]);
    }

    #[test]
    fn test_run_purges_when_fold_order_breaks() {
        let mut source = MemoryFragments::new();
        source.push(RawFragment::new(1, "{}"));
        source.push(RawFragment::new(0, "{}"));

        let err = ChunkAggregator::new().run(&mut source).unwrap_err();
        assert!(matches!(err, AggregateError::OutOfOrder { previous: 1, got: 0 }));
        assert_eq!(source.purges(), 1);
        assert!(source.is_empty());
    }

    #[test]
    fn test_empty_run_finalizes_to_default() {
        let mut source = MemoryFragments::new();
        let aggregation = ChunkAggregator::new().run(&mut source).unwrap();
        assert_eq!(aggregation.result, AggregateResult::default());
        assert!(aggregation.diagnostics.is_empty());

        // Purging again is harmless
        source.purge().unwrap();
    }
}
