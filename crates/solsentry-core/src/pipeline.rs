//! Analysis orchestration.
//!
//! The pipeline combines the heuristic scanner, the gas estimator, and the
//! optional AI provider into storable [`AnalysisOutcome`]s. It never touches
//! the store itself; the server persists what comes back.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use solsentry_storage::{AnalysisKind, AnalysisOutcome};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::ai::{AiProvider, ReviewRequest, RewriteRequest};
use crate::error::{AiError, PipelineError};
use crate::gas;
use crate::scanner::{self, Finding, ScanReport};

/// Runs analyses, bounding concurrent AI calls.
pub struct AnalysisPipeline {
    ai: Option<Arc<dyn AiProvider>>,
    permits: Arc<Semaphore>,
    max_source_bytes: usize,
}

impl std::fmt::Debug for AnalysisPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisPipeline")
            .field("ai", &self.ai.as_ref().map(|p| p.name()))
            .field("available_permits", &self.permits.available_permits())
            .field("max_source_bytes", &self.max_source_bytes)
            .finish()
    }
}

impl AnalysisPipeline {
    /// Create a pipeline. `max_concurrent_ai` is clamped to at least 1.
    #[must_use]
    pub fn new(
        ai: Option<Arc<dyn AiProvider>>,
        max_concurrent_ai: usize,
        max_source_bytes: usize,
    ) -> Self {
        Self {
            ai,
            permits: Arc::new(Semaphore::new(max_concurrent_ai.max(1))),
            max_source_bytes,
        }
    }

    /// Whether an AI provider is configured.
    pub fn ai_enabled(&self) -> bool {
        self.ai.is_some()
    }

    /// Name and model of the configured provider.
    pub fn ai_identity(&self) -> Option<(String, String)> {
        self.ai
            .as_ref()
            .map(|p| (p.name().to_owned(), p.model().to_owned()))
    }

    pub fn max_source_bytes(&self) -> usize {
        self.max_source_bytes
    }

    /// Heuristic scan of `source` under this pipeline's size limit.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Scan`] for empty or oversized input.
    pub fn scan(&self, source: &str) -> Result<ScanReport, PipelineError> {
        Ok(scanner::scan_with_limit(source, self.max_source_bytes)?)
    }

    /// Dispatch on the analysis kind.
    ///
    /// # Errors
    ///
    /// See the individual operations.
    pub async fn run(
        &self,
        kind: AnalysisKind,
        source: &str,
        contract_name: Option<&str>,
    ) -> Result<AnalysisOutcome, PipelineError> {
        match kind {
            AnalysisKind::Security => self.security_review(source, contract_name).await,
            AnalysisKind::Gas => self.gas_review(source),
            AnalysisKind::Rewrite => {
                let findings = self.scan(source)?.findings;
                self.rewrite(source, &findings, None).await
            }
        }
    }

    /// Heuristic scan, then AI review when available.
    ///
    /// AI failure does not fail the review: the heuristic result is returned
    /// with the AI error recorded in `error`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Scan`] for empty or oversized input.
    pub async fn security_review(
        &self,
        source: &str,
        contract_name: Option<&str>,
    ) -> Result<AnalysisOutcome, PipelineError> {
        let report = self.scan(source)?;
        let gas_report = gas::estimate_with_limit(source, self.max_source_bytes)?;

        let mut outcome = AnalysisOutcome {
            risk_score: score_i32(report.risk_score),
            summary: report.summary(),
            findings: to_json(&report.findings),
            gas_report: serde_json::to_value(&gas_report).unwrap_or_default(),
            ..AnalysisOutcome::default()
        };

        let Some(ai) = &self.ai else {
            return Ok(outcome);
        };

        let request = ReviewRequest {
            source: source.to_owned(),
            contract_name: contract_name.map(str::to_owned),
            heuristic_findings: report.findings.clone(),
        };

        let result = {
            let _permit = self.acquire().await?;
            ai.review(&request).await
        };

        match result {
            Ok(review) => {
                debug!(
                    model = %review.model,
                    ai_findings = review.findings.len(),
                    "AI review completed"
                );
                let ai_score = review.risk_score.unwrap_or(0);
                outcome.risk_score = score_i32(report.risk_score.max(ai_score));
                outcome.findings = to_json(&merge_findings(report.findings, review.findings));
                if !review.summary.is_empty() {
                    outcome.summary = review.summary;
                }
                outcome.model = Some(review.model);
            }
            Err(err) => {
                warn!(provider = ai.name(), error = %err, "AI review failed, returning heuristic result");
                outcome.error = Some(err.to_string());
            }
        }

        Ok(outcome)
    }

    /// Gas estimate only.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Scan`] for empty or oversized input.
    pub fn gas_review(&self, source: &str) -> Result<AnalysisOutcome, PipelineError> {
        let report = gas::estimate_with_limit(source, self.max_source_bytes)?;
        Ok(AnalysisOutcome {
            summary: report.summary(),
            findings: Value::Array(Vec::new()),
            gas_report: serde_json::to_value(&report).unwrap_or_default(),
            ..AnalysisOutcome::default()
        })
    }

    /// AI rewrite addressing `findings`. The result is re-scanned and its
    /// risk score and findings describe the rewritten source.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::NotConfigured`] without a provider, any other
    /// [`AiError`] from the provider, or [`PipelineError::Scan`] for bad input.
    pub async fn rewrite(
        &self,
        source: &str,
        findings: &[Finding],
        instructions: Option<&str>,
    ) -> Result<AnalysisOutcome, PipelineError> {
        let ai = self.ai.as_ref().ok_or(AiError::NotConfigured)?;
        let before = self.scan(source)?;

        let request = RewriteRequest {
            source: source.to_owned(),
            findings: findings.to_vec(),
            instructions: instructions.map(str::to_owned),
        };

        let rewrite = {
            let _permit = self.acquire().await?;
            ai.rewrite(&request).await?
        };

        let mut outcome = AnalysisOutcome {
            model: Some(rewrite.model),
            ..AnalysisOutcome::default()
        };

        // A rewrite that no longer scans (e.g. the model returned prose) is
        // still stored, with the scan error attached.
        match scanner::scan_with_limit(&rewrite.source, self.max_source_bytes) {
            Ok(after) => {
                outcome.risk_score = score_i32(after.risk_score);
                outcome.findings = to_json(&after.findings);
                let headline = format!(
                    "Rewrite complete. Risk score {} -> {}.",
                    before.risk_score, after.risk_score
                );
                outcome.summary = if rewrite.notes.is_empty() {
                    headline
                } else {
                    format!("{headline}\n\n{}", rewrite.notes)
                };
            }
            Err(err) => {
                outcome.summary = rewrite.notes;
                outcome.findings = Value::Array(Vec::new());
                outcome.error = Some(format!("rewritten source could not be scanned: {err}"));
            }
        }
        outcome.rewritten_source = Some(rewrite.source);

        Ok(outcome)
    }

    async fn acquire(&self) -> Result<tokio::sync::OwnedSemaphorePermit, AiError> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| AiError::Http {
                reason: "AI concurrency limiter closed".to_owned(),
            })
    }
}

/// Heuristic findings first, then AI findings not already covered by rule
/// id or (case-insensitive) title.
#[must_use]
pub fn merge_findings(heuristic: Vec<Finding>, ai: Vec<Finding>) -> Vec<Finding> {
    let mut seen: HashSet<String> = HashSet::new();
    for f in &heuristic {
        seen.insert(f.rule_id.clone());
        seen.insert(f.title.to_lowercase());
    }

    let mut merged = heuristic;
    for f in ai {
        let title = f.title.to_lowercase();
        if seen.contains(&f.rule_id) || seen.contains(&title) {
            continue;
        }
        seen.insert(f.rule_id.clone());
        seen.insert(title);
        merged.push(f);
    }
    merged
}

fn score_i32(score: u32) -> i32 {
    i32::try_from(score.min(100)).unwrap_or(100)
}

fn to_json(findings: &[Finding]) -> Value {
    serde_json::to_value(findings).unwrap_or_else(|_| Value::Array(Vec::new()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::ai::{AiReview, AiRewrite};
    use crate::error::ScanError;
    use crate::scanner::{FindingSource, Severity};

    const SOURCE: &str = r"// SPDX-License-Identifier: MIT
pragma solidity 0.8.24;
contract A {
    address owner;
    function f() external view returns (bool) { return tx.origin == owner; }
}
";

    struct StubAi {
        fail: bool,
        calls: AtomicUsize,
    }

    impl StubAi {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AiProvider for StubAi {
        fn name(&self) -> &str {
            "stub"
        }

        fn model(&self) -> &str {
            "stub-1"
        }

        async fn review(&self, _request: &ReviewRequest) -> Result<AiReview, AiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AiError::Timeout);
            }
            Ok(AiReview {
                summary: "Authorization relies on tx.origin.".to_owned(),
                risk_score: Some(90),
                findings: vec![
                    Finding {
                        rule_id: "tx-origin".to_owned(),
                        title: "duplicate of heuristic".to_owned(),
                        severity: Severity::High,
                        line: Some(5),
                        description: String::new(),
                        recommendation: String::new(),
                        source: FindingSource::Ai,
                    },
                    Finding {
                        rule_id: "ai-missing-events".to_owned(),
                        title: "Missing events".to_owned(),
                        severity: Severity::Low,
                        line: None,
                        description: String::new(),
                        recommendation: String::new(),
                        source: FindingSource::Ai,
                    },
                ],
                model: "stub-1".to_owned(),
            })
        }

        async fn rewrite(&self, _request: &RewriteRequest) -> Result<AiRewrite, AiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AiError::Upstream {
                    status: 500,
                    body: "boom".to_owned(),
                });
            }
            Ok(AiRewrite {
                source: "// SPDX-License-Identifier: MIT\npragma solidity 0.8.24;\ncontract A {}\n"
                    .to_owned(),
                notes: "- replaced tx.origin with msg.sender".to_owned(),
                model: "stub-1".to_owned(),
            })
        }
    }

    fn findings(outcome: &AnalysisOutcome) -> Vec<Finding> {
        serde_json::from_value(outcome.findings.clone()).unwrap()
    }

    #[tokio::test]
    async fn security_review_without_ai_is_heuristic_only() {
        let pipeline = AnalysisPipeline::new(None, 2, 10_000);
        let outcome = pipeline.security_review(SOURCE, None).await.unwrap();
        assert_eq!(outcome.risk_score, 30);
        assert!(outcome.model.is_none());
        assert!(outcome.error.is_none());
        assert!(findings(&outcome).iter().any(|f| f.rule_id == "tx-origin"));
        assert!(outcome.gas_report.get("deployment_gas").is_some());
    }

    #[tokio::test]
    async fn security_review_merges_ai_findings() {
        let ai = StubAi::new(false);
        let pipeline = AnalysisPipeline::new(Some(ai.clone()), 2, 10_000);
        let outcome = pipeline.security_review(SOURCE, Some("A")).await.unwrap();

        assert_eq!(outcome.risk_score, 90);
        assert_eq!(outcome.model.as_deref(), Some("stub-1"));
        assert_eq!(outcome.summary, "Authorization relies on tx.origin.");

        let merged = findings(&outcome);
        assert_eq!(merged[0].source, FindingSource::Heuristic);
        assert_eq!(merged.iter().filter(|f| f.rule_id == "tx-origin").count(), 1);
        assert_eq!(merged.last().unwrap().rule_id, "ai-missing-events");
        assert_eq!(ai.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn security_review_survives_ai_failure() {
        let pipeline = AnalysisPipeline::new(Some(StubAi::new(true)), 1, 10_000);
        let outcome = pipeline.security_review(SOURCE, None).await.unwrap();
        assert_eq!(outcome.risk_score, 30);
        assert!(outcome.model.is_none());
        assert_eq!(outcome.error.as_deref(), Some("AI request timed out"));
    }

    #[tokio::test]
    async fn oversized_source_is_rejected_before_ai() {
        let ai = StubAi::new(false);
        let pipeline = AnalysisPipeline::new(Some(ai.clone()), 1, 16);
        let err = pipeline.security_review(SOURCE, None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Scan(ScanError::TooLarge { .. })));
        assert_eq!(ai.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn gas_review_has_report_and_no_findings() {
        let pipeline = AnalysisPipeline::new(None, 1, 10_000);
        let outcome = pipeline.gas_review(SOURCE).unwrap();
        assert_eq!(outcome.findings, Value::Array(Vec::new()));
        assert!(outcome.summary.starts_with("Estimated deployment gas"));
        assert!(outcome.gas_report.get("functions").is_some());
    }

    #[tokio::test]
    async fn rewrite_requires_ai() {
        let pipeline = AnalysisPipeline::new(None, 1, 10_000);
        let err = pipeline.rewrite(SOURCE, &[], None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Ai(AiError::NotConfigured)));
    }

    #[tokio::test]
    async fn rewrite_rescans_result() {
        let pipeline = AnalysisPipeline::new(Some(StubAi::new(false)), 1, 10_000);
        let outcome = pipeline
            .run(AnalysisKind::Rewrite, SOURCE, None)
            .await
            .unwrap();
        assert_eq!(outcome.risk_score, 0);
        assert!(outcome.rewritten_source.unwrap().contains("contract A {}"));
        assert!(outcome.summary.starts_with("Rewrite complete. Risk score 30 -> 0."));
        assert!(outcome.summary.contains("msg.sender"));
    }

    #[tokio::test]
    async fn rewrite_propagates_provider_error() {
        let pipeline = AnalysisPipeline::new(Some(StubAi::new(true)), 1, 10_000);
        let err = pipeline.rewrite(SOURCE, &[], None).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Ai(AiError::Upstream { status: 500, .. })
        ));
    }

    #[test]
    fn merge_dedupes_by_title_case_insensitively() {
        let mk = |id: &str, title: &str, source| Finding {
            rule_id: id.to_owned(),
            title: title.to_owned(),
            severity: Severity::Low,
            line: None,
            description: String::new(),
            recommendation: String::new(),
            source,
        };
        let merged = merge_findings(
            vec![mk("reentrancy", "Possible reentrancy", FindingSource::Heuristic)],
            vec![
                mk("ai-x", "POSSIBLE REENTRANCY", FindingSource::Ai),
                mk("ai-y", "Other", FindingSource::Ai),
                mk("ai-y", "Other again", FindingSource::Ai),
            ],
        );
        let ids: Vec<&str> = merged.iter().map(|f| f.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["reentrancy", "ai-y"]);
    }
}
