//! Decision synthesis: weighted confidence over five factors plus hard overrides.

use chrono::Utc;
use uuid::Uuid;

use crate::config::{DecisionConfig, Thresholds};
use crate::types::{
  CiStatus, Decision, DecisionAction, DecisionFactor, FactorImpact, FactorName, Finding,
  FindingKind, ImpactResult, ReviewSignals, RuleAction, RuleOutcome, RuleStatus, Severity,
};

/// Factor weights. Absent optional factors contribute nothing; the sum is not renormalized.
struct Weights {
  security: f64,
  blast_radius: f64,
  policy: f64,
  approvals: f64,
  ci: f64,
}

impl Weights {
  fn for_signals(signals: &ReviewSignals) -> Self {
    if signals.approvals.is_none() && signals.ci_status.is_none() {
      Self {
        security: 0.40,
        blast_radius: 0.30,
        policy: 0.30,
        approvals: 0.0,
        ci: 0.0,
      }
    } else {
      Self {
        security: 0.35,
        blast_radius: 0.25,
        policy: 0.25,
        approvals: 0.10,
        ci: 0.05,
      }
    }
  }
}

/// Why a block was forced regardless of the score bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HardOverride {
  CriticalFinding,
  PolicyBlock,
  CiFailure,
}

impl HardOverride {
  fn describe(self) -> &'static str {
    match self {
      Self::CriticalFinding => "critical security finding",
      Self::PolicyBlock => "blocking policy rule failed",
      Self::CiFailure => "CI checks failing",
    }
  }
}

pub fn security_score(findings: &[Finding]) -> f64 {
  if findings.is_empty() {
    1.0
  } else if findings.iter().any(|f| f.severity == Severity::Critical) {
    0.0
  } else if findings.iter().any(|f| f.severity == Severity::High) {
    0.2
  } else {
    0.6
  }
}

pub fn blast_radius_score(score: u8) -> f64 {
  match score {
    0..=20 => 1.0,
    21..=40 => 0.8,
    41..=60 => 0.6,
    61..=80 => 0.4,
    _ => 0.2,
  }
}

pub fn policy_score(rules: &[RuleOutcome]) -> f64 {
  let applicable: Vec<&RuleOutcome> = rules
    .iter()
    .filter(|r| r.status != RuleStatus::Skipped)
    .collect();
  if applicable.is_empty() {
    1.0
  } else if applicable.iter().any(|r| r.status == RuleStatus::Failed) {
    0.0
  } else if applicable.iter().any(|r| r.status == RuleStatus::Warning) {
    0.7
  } else {
    1.0
  }
}

pub fn approvals_score(approvals: u32) -> f64 {
  match approvals {
    0 => 0.5,
    1 => 0.7,
    _ => 1.0,
  }
}

pub fn ci_score(status: CiStatus) -> f64 {
  match status {
    CiStatus::Success => 1.0,
    CiStatus::Pending => 0.5,
    CiStatus::Failure | CiStatus::Error => 0.0,
    CiStatus::Unknown => 0.6,
  }
}

fn factor(name: FactorName, score: f64, weight: f64, detail: String) -> DecisionFactor {
  DecisionFactor {
    name,
    impact: FactorImpact::from_score(score),
    score,
    weight,
    detail,
  }
}

fn round3(x: f64) -> f64 {
  (x * 1000.0).round() / 1000.0
}

pub struct DecisionEngine {
  thresholds: Thresholds,
  min_confidence: f64,
}

impl DecisionEngine {
  pub fn new(thresholds: Thresholds, config: DecisionConfig) -> Self {
    Self {
      thresholds,
      min_confidence: config.min_confidence,
    }
  }

  pub fn decide(
    &self,
    impact: &ImpactResult,
    findings: &[Finding],
    rules: &[RuleOutcome],
    signals: &ReviewSignals,
  ) -> Decision {
    let factors = build_factors(impact, findings, rules, signals);
    let raw_confidence = factors
      .iter()
      .map(|f| f.score * f.weight)
      .sum::<f64>()
      .clamp(0.0, 1.0);
    let confidence = round3(raw_confidence);

    let hard = if findings.iter().any(|f| f.severity == Severity::Critical) {
      Some(HardOverride::CriticalFinding)
    } else if rules.iter().any(|r| r.action == RuleAction::Block) {
      Some(HardOverride::PolicyBlock)
    } else if signals.ci_status.is_some_and(CiStatus::is_failing) {
      Some(HardOverride::CiFailure)
    } else {
      None
    };

    let low_confidence = hard.is_none() && self.below_floor(raw_confidence);
    let action = match hard {
      Some(_) => DecisionAction::Block,
      None if low_confidence => DecisionAction::RequireReview,
      None => self.band(impact.score),
    };

    let reasoning = self.reasoning(action, hard, low_confidence, confidence, impact, findings, rules);
    let recommendations = recommendations(action, findings, rules, signals);
    let next_steps = next_steps(action, signals);

    tracing::debug!(action = action.as_str(), confidence, "decision synthesized");

    Decision {
      id: Uuid::new_v4(),
      action,
      confidence,
      reasoning,
      factors,
      recommendations,
      next_steps,
      created_at: Utc::now(),
    }
  }

  /// Compared before rounding; only the reported confidence is rounded.
  fn below_floor(&self, confidence: f64) -> bool {
    confidence < self.min_confidence
  }

  fn band(&self, score: u8) -> DecisionAction {
    let t = &self.thresholds;
    if score <= t.auto_approve {
      DecisionAction::AutoApprove
    } else if score <= t.auto_approve_with_comment {
      DecisionAction::AutoApproveComment
    } else if score <= t.requires_review {
      DecisionAction::RequireReview
    } else if score <= t.requires_senior_review {
      DecisionAction::RequireSeniorReview
    } else {
      DecisionAction::Block
    }
  }

  #[allow(clippy::too_many_arguments)]
  fn reasoning(
    &self,
    action: DecisionAction,
    hard: Option<HardOverride>,
    low_confidence: bool,
    confidence: f64,
    impact: &ImpactResult,
    findings: &[Finding],
    rules: &[RuleOutcome],
  ) -> String {
    let failed = rules.iter().filter(|r| r.status == RuleStatus::Failed).count();
    let warned = rules.iter().filter(|r| r.status == RuleStatus::Warning).count();
    let mut out = format!(
      "{}: blast radius {}, {} finding(s), {} failed and {} warned rule(s), confidence {:.2}",
      action.as_str(),
      impact.score,
      findings.len(),
      failed,
      warned,
      confidence
    );
    if let Some(h) = hard {
      out.push_str(&format!("; blocked by {}", h.describe()));
    } else if low_confidence {
      out.push_str(&format!(
        "; confidence below minimum {:.2}",
        self.min_confidence
      ));
    }
    out
  }
}

fn build_factors(
  impact: &ImpactResult,
  findings: &[Finding],
  rules: &[RuleOutcome],
  signals: &ReviewSignals,
) -> Vec<DecisionFactor> {
  let w = Weights::for_signals(signals);
  let mut factors = Vec::with_capacity(5);

  factors.push(factor(
    FactorName::SecurityFindings,
    security_score(findings),
    w.security,
    format!("{} security finding(s)", findings.len()),
  ));
  factors.push(factor(
    FactorName::BlastRadius,
    blast_radius_score(impact.score),
    w.blast_radius,
    format!("Blast radius score {}", impact.score),
  ));
  let applicable = rules
    .iter()
    .filter(|r| r.status != RuleStatus::Skipped)
    .count();
  factors.push(factor(
    FactorName::PolicyCompliance,
    policy_score(rules),
    w.policy,
    format!("{} of {} rule(s) applicable", applicable, rules.len()),
  ));
  if let Some(approvals) = signals.approvals {
    factors.push(factor(
      FactorName::Approvals,
      approvals_score(approvals),
      w.approvals,
      format!("{} approval(s)", approvals),
    ));
  }
  if let Some(ci) = signals.ci_status {
    factors.push(factor(
      FactorName::CiStatus,
      ci_score(ci),
      w.ci,
      format!("CI status {}", ci.as_str()),
    ));
  }
  factors
}

fn recommendations(
  action: DecisionAction,
  findings: &[Finding],
  rules: &[RuleOutcome],
  signals: &ReviewSignals,
) -> Vec<String> {
  let mut out = Vec::new();

  if findings.iter().any(|f| f.severity == Severity::Critical) {
    out.push("Remove the hardcoded credentials or unsafe code flagged as critical".to_string());
  }
  if findings
    .iter()
    .any(|f| f.kind != FindingKind::Dependency && f.severity != Severity::Critical)
  {
    out.push("Review the flagged security findings".to_string());
  }
  if findings.iter().any(|f| f.kind == FindingKind::Dependency) {
    out.push("Audit the changed dependencies and lockfiles".to_string());
  }

  let names = |status: RuleStatus| -> Vec<&str> {
    rules
      .iter()
      .filter(|r| r.status == status)
      .map(|r| r.name.as_str())
      .collect()
  };
  let failed = names(RuleStatus::Failed);
  if !failed.is_empty() {
    out.push(format!("Resolve failing policy rules: {}", failed.join(", ")));
  }
  let warned = names(RuleStatus::Warning);
  if !warned.is_empty() {
    out.push(format!("Address policy warnings: {}", warned.join(", ")));
  }

  match signals.ci_status {
    Some(ci) if ci.is_failing() => out.push("Fix the failing CI checks".to_string()),
    Some(CiStatus::Pending) => out.push("Wait for CI checks to finish".to_string()),
    _ => {}
  }

  out.push(
    match action {
      DecisionAction::AutoApprove => "Low-risk change; merge when ready",
      DecisionAction::AutoApproveComment => "Leave a comment summarising the change for the team",
      DecisionAction::RequireReview => "Request a review from a team member",
      DecisionAction::RequireSeniorReview => "Request a review from a senior engineer or code owner",
      DecisionAction::Block => "Rework or split the change before requesting review",
    }
    .to_string(),
  );
  out
}

fn next_steps(action: DecisionAction, signals: &ReviewSignals) -> Vec<String> {
  let steps: &[&str] = match action {
    DecisionAction::AutoApprove => &["Merge the pull request"],
    DecisionAction::AutoApproveComment => &[
      "Post the triage summary as a pull request comment",
      "Merge the pull request",
    ],
    DecisionAction::RequireReview => &[
      "Assign a reviewer",
      "Re-run triage after review feedback is addressed",
    ],
    DecisionAction::RequireSeniorReview => &[
      "Assign a senior reviewer or code owner",
      "Walk through the highest-impact files together",
    ],
    DecisionAction::Block => &[
      "Do not merge",
      "Fix the blocking issues and push a new revision",
    ],
  };
  let mut out: Vec<String> = steps.iter().map(|s| s.to_string()).collect();
  if signals.ci_status == Some(CiStatus::Pending) {
    out.push("Re-run triage once CI completes".to_string());
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::{Confidence, ImpactBreakdown, ImpactLevel, SubImpact};

  fn sub() -> SubImpact {
    SubImpact {
      score: 0.0,
      level: ImpactLevel::Low,
      breakdown: ImpactBreakdown::default(),
    }
  }

  fn impact(score: u8) -> ImpactResult {
    ImpactResult {
      score,
      code: sub(),
      test: sub(),
      dependency: sub(),
      risk_signals: Vec::new(),
    }
  }

  fn finding(kind: FindingKind, severity: Severity) -> Finding {
    Finding {
      kind,
      pattern: None,
      severity,
      confidence: Confidence::Medium,
      location: "x.ts:1".into(),
      snippet: String::new(),
      description: String::new(),
    }
  }

  fn rule(status: RuleStatus, action: RuleAction) -> RuleOutcome {
    RuleOutcome {
      rule_id: "r".into(),
      name: "Rule".into(),
      category: "general".into(),
      status,
      action,
      validations: Vec::new(),
    }
  }

  fn engine() -> DecisionEngine {
    DecisionEngine::new(Thresholds::default(), DecisionConfig::default())
  }

  #[test]
  fn clean_low_score_auto_approves() {
    let d = engine().decide(&impact(12), &[], &[], &ReviewSignals::default());
    assert_eq!(d.action, DecisionAction::AutoApprove);
    assert_eq!(d.confidence, 1.0);
    assert_eq!(d.factors.len(), 3);
  }

  #[test]
  fn score_bands_select_action() {
    let e = engine();
    let none = ReviewSignals::default();
    assert_eq!(e.decide(&impact(20), &[], &[], &none).action, DecisionAction::AutoApprove);
    assert_eq!(
      e.decide(&impact(35), &[], &[], &none).action,
      DecisionAction::AutoApproveComment
    );
    assert_eq!(e.decide(&impact(55), &[], &[], &none).action, DecisionAction::RequireReview);
    assert_eq!(
      e.decide(&impact(80), &[], &[], &none).action,
      DecisionAction::RequireSeniorReview
    );
    assert_eq!(e.decide(&impact(95), &[], &[], &none).action, DecisionAction::Block);
  }

  #[test]
  fn critical_finding_blocks_even_at_low_score() {
    let findings = [finding(FindingKind::Secret, Severity::Critical)];
    let d = engine().decide(&impact(0), &findings, &[], &ReviewSignals::default());
    assert_eq!(d.action, DecisionAction::Block);
    assert!(d.reasoning.contains("critical security finding"));
  }

  #[test]
  fn blocking_rule_blocks() {
    let rules = [rule(RuleStatus::Failed, RuleAction::Block)];
    let d = engine().decide(&impact(5), &[], &rules, &ReviewSignals::default());
    assert_eq!(d.action, DecisionAction::Block);
    assert!(d.recommendations.iter().any(|r| r.contains("Rule")));
  }

  #[test]
  fn failing_ci_blocks() {
    let signals = ReviewSignals {
      approvals: Some(2),
      ci_status: Some(CiStatus::Failure),
    };
    let d = engine().decide(&impact(5), &[], &[], &signals);
    assert_eq!(d.action, DecisionAction::Block);
    assert_eq!(d.factors.len(), 5);
  }

  #[test]
  fn ci_error_blocks_like_failure() {
    let signals = ReviewSignals {
      approvals: None,
      ci_status: Some(CiStatus::Error),
    };
    let d = engine().decide(&impact(5), &[], &[], &signals);
    assert_eq!(d.action, DecisionAction::Block);
    assert!(d.reasoning.contains("CI checks failing"));
  }

  #[test]
  fn floor_uses_unrounded_confidence() {
    let e = engine();
    assert!(e.below_floor(0.4996));
    assert_eq!(round3(0.4996), 0.5);
    assert!(!e.below_floor(0.5));
  }

  #[test]
  fn low_confidence_forces_review() {
    // 0.40 × 0.2 + 0.30 × 1.0 + 0.30 × 0.7 = 0.59
    let config = DecisionConfig {
      min_confidence: 0.6,
    };
    let findings = [finding(FindingKind::Injection, Severity::High)];
    let rules = [rule(RuleStatus::Warning, RuleAction::Warn)];
    let d = DecisionEngine::new(Thresholds::default(), config).decide(
      &impact(5),
      &findings,
      &rules,
      &ReviewSignals::default(),
    );
    assert_eq!(d.confidence, 0.59);
    assert_eq!(d.action, DecisionAction::RequireReview);
    assert!(d.reasoning.contains("below minimum"));
  }

  #[test]
  fn low_confidence_never_downgrades_hard_block() {
    let config = DecisionConfig {
      min_confidence: 1.0,
    };
    let findings = [finding(FindingKind::Secret, Severity::Critical)];
    let d = DecisionEngine::new(Thresholds::default(), config).decide(
      &impact(5),
      &findings,
      &[],
      &ReviewSignals::default(),
    );
    assert_eq!(d.action, DecisionAction::Block);
  }

  #[test]
  fn confidence_is_not_renormalized_with_partial_signals() {
    // Approvals present, CI absent: 0.35 + 0.25 + 0.25 + 0.10, no CI weight.
    let signals = ReviewSignals {
      approvals: Some(3),
      ci_status: None,
    };
    let d = engine().decide(&impact(0), &[], &[], &signals);
    assert_eq!(d.confidence, 0.95);
    assert_eq!(d.action, DecisionAction::AutoApprove);
  }

  #[test]
  fn factor_scores_follow_tables() {
    assert_eq!(security_score(&[finding(FindingKind::Dependency, Severity::Medium)]), 0.6);
    assert_eq!(security_score(&[finding(FindingKind::Secret, Severity::High)]), 0.2);
    assert_eq!(blast_radius_score(40), 0.8);
    assert_eq!(blast_radius_score(61), 0.4);
    assert_eq!(blast_radius_score(81), 0.2);
    assert_eq!(policy_score(&[rule(RuleStatus::Skipped, RuleAction::Allow)]), 1.0);
    assert_eq!(policy_score(&[rule(RuleStatus::Passed, RuleAction::Allow)]), 1.0);
    assert_eq!(approvals_score(0), 0.5);
    assert_eq!(approvals_score(1), 0.7);
    assert_eq!(ci_score(CiStatus::Pending), 0.5);
    assert_eq!(ci_score(CiStatus::Unknown), 0.6);
  }

  #[test]
  fn pending_ci_adds_wait_step() {
    let signals = ReviewSignals {
      approvals: None,
      ci_status: Some(CiStatus::Pending),
    };
    let d = engine().decide(&impact(10), &[], &[], &signals);
    assert!(d.recommendations.iter().any(|r| r.contains("Wait for CI")));
    assert!(d.next_steps.iter().any(|s| s.contains("once CI completes")));
  }

  #[test]
  fn dependency_findings_recommend_audit() {
    let findings = [finding(FindingKind::Dependency, Severity::Medium)];
    let d = engine().decide(&impact(10), &findings, &[], &ReviewSignals::default());
    assert!(d.recommendations.iter().any(|r| r.contains("dependencies")));
    assert!(!d.recommendations.iter().any(|r| r.contains("security findings")));
  }
}
