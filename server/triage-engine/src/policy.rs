//! Policy rules: branch-scoped validations over the PR and the scorer outputs.
//!
//! Rules come from a declarative table keyed by config flags, filtered once when the
//! evaluator is built, followed by any custom rules from the policies config.

use serde::{Deserialize, Serialize};

use crate::config::{Frameworks, PoliciesConfig, TeamConfig};
use crate::path_match::{self, Glob};
use crate::types::{
  Escalation, Finding, ImpactResult, PullRequestSnapshot, RuleAction, RuleOutcome, RuleStatus,
  Severity, ValidationOutcome, ValidationStatus,
};

fn default_max_score() -> u8 {
  60
}

fn default_min_severity() -> Severity {
  Severity::High
}

fn default_max_files() -> usize {
  50
}

fn default_category() -> String {
  "general".to_string()
}

/// One validation and its parameters. Unknown `type` tags deserialize to `Unsupported`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Validation {
  BlastRadius {
    #[serde(default = "default_max_score")]
    max_score: u8,
    #[serde(default)]
    blocking: bool,
  },
  Security {
    #[serde(default = "default_min_severity")]
    min_severity: Severity,
    #[serde(default)]
    blocking: bool,
  },
  /// Empty `patterns` falls back to the team's blocked paths.
  BlockedPath {
    #[serde(default)]
    patterns: Vec<String>,
  },
  FileCount {
    #[serde(default = "default_max_files")]
    max_files: usize,
  },
  #[serde(other)]
  Unsupported,
}

impl Validation {
  pub fn kind(&self) -> &'static str {
    match self {
      Self::BlastRadius { .. } => "blast_radius",
      Self::Security { .. } => "security",
      Self::BlockedPath { .. } => "blocked_path",
      Self::FileCount { .. } => "file_count",
      Self::Unsupported => "unsupported",
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
  /// Empty means every branch.
  #[serde(default)]
  pub target_branches: Vec<String>,
}

impl RuleCondition {
  pub fn applies_to(&self, branch: &str) -> bool {
    self.target_branches.is_empty() || self.target_branches.iter().any(|b| b == branch)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
  pub id: String,
  pub name: String,
  #[serde(default = "default_category")]
  pub category: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub condition: Option<RuleCondition>,
  #[serde(default)]
  pub validations: Vec<Validation>,
}

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

enum Gate {
  Always,
  Framework(fn(&Frameworks) -> bool),
}

struct RuleTemplate {
  gate: Gate,
  build: fn(&PoliciesConfig) -> PolicyRule,
}

fn protected(policies: &PoliciesConfig) -> Option<RuleCondition> {
  Some(RuleCondition {
    target_branches: policies.protected_branches.clone(),
  })
}

const RULE_TABLE: &[RuleTemplate] = &[
  RuleTemplate {
    gate: Gate::Always,
    build: |p| PolicyRule {
      id: "branch-protection".into(),
      name: "Branch protection".into(),
      category: "workflow".into(),
      condition: protected(p),
      validations: vec![Validation::FileCount {
        max_files: p.max_files,
      }],
    },
  },
  RuleTemplate {
    gate: Gate::Framework(|f| f.soc2),
    build: |p| PolicyRule {
      id: "no-hardcoded-secrets".into(),
      name: "No hardcoded secrets".into(),
      category: "soc2".into(),
      condition: protected(p),
      validations: vec![Validation::Security {
        min_severity: Severity::High,
        blocking: true,
      }],
    },
  },
  RuleTemplate {
    gate: Gate::Framework(|f| f.soc2),
    build: |p| PolicyRule {
      id: "blast-radius-ceiling".into(),
      name: "Blast radius ceiling".into(),
      category: "soc2".into(),
      condition: protected(p),
      validations: vec![Validation::BlastRadius {
        max_score: p.blast_radius_ceiling,
        blocking: false,
      }],
    },
  },
];

/// Built-in and framework rules enabled by the config, in table order.
pub fn builtin_rules(policies: &PoliciesConfig) -> Vec<PolicyRule> {
  RULE_TABLE
    .iter()
    .filter(|t| match &t.gate {
      Gate::Always => true,
      Gate::Framework(enabled) => enabled(&policies.frameworks),
    })
    .map(|t| (t.build)(policies))
    .collect()
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

struct PreparedRule {
  rule: PolicyRule,
  /// Compiled globs per validation index; empty for non-path validations.
  globs: Vec<Vec<Glob>>,
}

/// Immutable rule list plus compiled path patterns.
pub struct PolicyEvaluator {
  rules: Vec<PreparedRule>,
}

impl PolicyEvaluator {
  pub fn new(policies: &PoliciesConfig, team: &TeamConfig) -> Self {
    let team_blocked = path_match::compile_all(&team.blocked_paths);
    let rules = builtin_rules(policies)
      .into_iter()
      .chain(policies.rules.iter().cloned())
      .map(|rule| {
        let globs = rule
          .validations
          .iter()
          .map(|v| match v {
            Validation::BlockedPath { patterns } if patterns.is_empty() => team_blocked.clone(),
            Validation::BlockedPath { patterns } => path_match::compile_all(patterns),
            _ => Vec::new(),
          })
          .collect();
        PreparedRule { rule, globs }
      })
      .collect();
    Self { rules }
  }

  pub fn rules(&self) -> impl Iterator<Item = &PolicyRule> {
    self.rules.iter().map(|r| &r.rule)
  }

  pub fn evaluate(
    &self,
    pr: &PullRequestSnapshot,
    impact: &ImpactResult,
    findings: &[Finding],
  ) -> Vec<RuleOutcome> {
    self
      .rules
      .iter()
      .map(|prepared| evaluate_rule(prepared, pr, impact, findings))
      .collect()
  }
}

fn evaluate_rule(
  prepared: &PreparedRule,
  pr: &PullRequestSnapshot,
  impact: &ImpactResult,
  findings: &[Finding],
) -> RuleOutcome {
  let rule = &prepared.rule;
  let applies = rule
    .condition
    .as_ref()
    .map_or(true, |c| c.applies_to(&pr.target_branch));
  if !applies {
    return RuleOutcome {
      rule_id: rule.id.clone(),
      name: rule.name.clone(),
      category: rule.category.clone(),
      status: RuleStatus::Skipped,
      action: RuleAction::Allow,
      validations: Vec::new(),
    };
  }

  let validations: Vec<ValidationOutcome> = rule
    .validations
    .iter()
    .zip(&prepared.globs)
    .map(|(v, globs)| run_validation(v, globs, pr, impact, findings))
    .collect();
  let (status, action) = reduce(&validations);

  RuleOutcome {
    rule_id: rule.id.clone(),
    name: rule.name.clone(),
    category: rule.category.clone(),
    status,
    action,
    validations,
  }
}

/// Any blocking failure fails the rule; any other failure makes it a warning.
pub fn reduce(validations: &[ValidationOutcome]) -> (RuleStatus, RuleAction) {
  let failed = validations
    .iter()
    .filter(|v| v.status == ValidationStatus::Failed);
  let mut any_failed = false;
  for v in failed {
    if v.escalation == Some(Escalation::Block) {
      return (RuleStatus::Failed, RuleAction::Block);
    }
    any_failed = true;
  }
  if any_failed {
    (RuleStatus::Warning, RuleAction::Warn)
  } else {
    (RuleStatus::Passed, RuleAction::Allow)
  }
}

fn escalation(blocking: bool) -> Escalation {
  if blocking {
    Escalation::Block
  } else {
    Escalation::Warn
  }
}

fn outcome(
  v: &Validation,
  failed: bool,
  escalation: Escalation,
  message: String,
) -> ValidationOutcome {
  ValidationOutcome {
    kind: v.kind().to_string(),
    status: if failed {
      ValidationStatus::Failed
    } else {
      ValidationStatus::Passed
    },
    escalation: failed.then_some(escalation),
    message,
  }
}

fn run_validation(
  v: &Validation,
  globs: &[Glob],
  pr: &PullRequestSnapshot,
  impact: &ImpactResult,
  findings: &[Finding],
) -> ValidationOutcome {
  match v {
    Validation::BlastRadius {
      max_score,
      blocking,
    } => {
      let failed = impact.score > *max_score;
      let message = if failed {
        format!("Blast radius {} exceeds {}", impact.score, max_score)
      } else {
        format!("Blast radius {} within {}", impact.score, max_score)
      };
      outcome(v, failed, escalation(*blocking), message)
    }
    Validation::Security {
      min_severity,
      blocking,
    } => {
      let offending = findings
        .iter()
        .filter(|f| f.severity.at_least(*min_severity))
        .count();
      let message = if offending > 0 {
        format!(
          "{} finding(s) at or above {} severity",
          offending,
          min_severity.as_str()
        )
      } else {
        format!("No findings at or above {} severity", min_severity.as_str())
      };
      outcome(v, offending > 0, escalation(*blocking), message)
    }
    Validation::BlockedPath { .. } => {
      let hits: Vec<&str> = pr
        .files
        .iter()
        .filter(|f| path_match::any_match(globs, &f.path))
        .map(|f| f.path.as_str())
        .collect();
      let message = if hits.is_empty() {
        "No blocked paths touched".to_string()
      } else {
        format!("Blocked paths touched: {}", hits.join(", "))
      };
      outcome(v, !hits.is_empty(), Escalation::Block, message)
    }
    Validation::FileCount { max_files } => {
      let count = pr.files.len();
      let failed = count > *max_files;
      let message = if failed {
        format!("{} files changed, limit is {}", count, max_files)
      } else {
        format!("{} files changed", count)
      };
      outcome(v, failed, Escalation::Warn, message)
    }
    Validation::Unsupported => ValidationOutcome {
      kind: v.kind().to_string(),
      status: ValidationStatus::Skipped,
      escalation: None,
      message: "Unsupported validation type".to_string(),
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::{
    Confidence, FileChange, FileStatus, FindingKind, ImpactBreakdown, ImpactLevel, SubImpact,
  };

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

  fn pr(branch: &str, paths: &[&str]) -> PullRequestSnapshot {
    PullRequestSnapshot {
      number: 3,
      title: "rules".into(),
      body: None,
      author: "dev".into(),
      source_branch: "feature".into(),
      target_branch: branch.into(),
      additions: 0,
      deletions: 0,
      files: paths
        .iter()
        .map(|p| FileChange {
          path: (*p).into(),
          status: FileStatus::Modified,
          additions: 1,
          deletions: 0,
          changes: 1,
          patch: None,
        })
        .collect(),
    }
  }

  fn finding(severity: Severity) -> Finding {
    Finding {
      kind: FindingKind::Secret,
      pattern: Some("aws_access_key".into()),
      severity,
      confidence: Confidence::High,
      location: "a.ts:1".into(),
      snippet: "AKIA****MPLE".into(),
      description: "test".into(),
    }
  }

  fn soc2() -> PoliciesConfig {
    PoliciesConfig {
      frameworks: Frameworks { soc2: true },
      ..PoliciesConfig::default()
    }
  }

  #[test]
  fn default_table_has_only_branch_protection() {
    let ids: Vec<_> = builtin_rules(&PoliciesConfig::default())
      .into_iter()
      .map(|r| r.id)
      .collect();
    assert_eq!(ids, vec!["branch-protection"]);
  }

  #[test]
  fn soc2_adds_two_rules() {
    let ids: Vec<_> = builtin_rules(&soc2()).into_iter().map(|r| r.id).collect();
    assert_eq!(
      ids,
      vec!["branch-protection", "no-hardcoded-secrets", "blast-radius-ceiling"]
    );
  }

  #[test]
  fn unprotected_branch_skips_rules() {
    let evaluator = PolicyEvaluator::new(&soc2(), &TeamConfig::default());
    let outcomes = evaluator.evaluate(&pr("develop", &["a.rs"]), &impact(90), &[
      finding(Severity::Critical),
    ]);
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| o.status == RuleStatus::Skipped));
    assert!(outcomes.iter().all(|o| o.validations.is_empty()));
  }

  #[test]
  fn blocking_security_failure_blocks_rule() {
    let evaluator = PolicyEvaluator::new(&soc2(), &TeamConfig::default());
    let outcomes = evaluator.evaluate(&pr("main", &["a.rs"]), &impact(10), &[
      finding(Severity::High),
    ]);
    let secrets = outcomes
      .iter()
      .find(|o| o.rule_id == "no-hardcoded-secrets")
      .unwrap();
    assert_eq!(secrets.status, RuleStatus::Failed);
    assert_eq!(secrets.action, RuleAction::Block);
  }

  #[test]
  fn medium_finding_below_threshold_passes() {
    let evaluator = PolicyEvaluator::new(&soc2(), &TeamConfig::default());
    let outcomes = evaluator.evaluate(&pr("main", &["a.rs"]), &impact(10), &[
      finding(Severity::Medium),
    ]);
    assert!(outcomes.iter().all(|o| o.status == RuleStatus::Passed));
  }

  #[test]
  fn blast_radius_ceiling_warns() {
    let evaluator = PolicyEvaluator::new(&soc2(), &TeamConfig::default());
    let outcomes = evaluator.evaluate(&pr("main", &["a.rs"]), &impact(61), &[]);
    let ceiling = outcomes
      .iter()
      .find(|o| o.rule_id == "blast-radius-ceiling")
      .unwrap();
    assert_eq!(ceiling.status, RuleStatus::Warning);
    assert_eq!(ceiling.action, RuleAction::Warn);
    assert_eq!(
      ceiling.validations[0].escalation,
      Some(Escalation::Warn)
    );
  }

  #[test]
  fn file_count_over_limit_warns() {
    let policies = PoliciesConfig {
      max_files: 2,
      ..PoliciesConfig::default()
    };
    let evaluator = PolicyEvaluator::new(&policies, &TeamConfig::default());
    let outcomes = evaluator.evaluate(&pr("master", &["a", "b", "c"]), &impact(0), &[]);
    assert_eq!(outcomes[0].status, RuleStatus::Warning);
    assert!(outcomes[0].validations[0].message.contains("limit is 2"));
  }

  #[test]
  fn blocked_path_uses_team_patterns_and_always_blocks() {
    let team = TeamConfig {
      blocked_paths: vec!["infra/prod/**".into()],
      ..TeamConfig::default()
    };
    let policies = PoliciesConfig {
      rules: vec![PolicyRule {
        id: "no-prod-infra".into(),
        name: "No prod infra".into(),
        category: "infra".into(),
        condition: None,
        validations: vec![Validation::BlockedPath { patterns: vec![] }],
      }],
      ..PoliciesConfig::default()
    };
    let evaluator = PolicyEvaluator::new(&policies, &team);
    let outcomes = evaluator.evaluate(
      &pr("feature-x", &["infra/prod/main.tf", "src/a.rs"]),
      &impact(0),
      &[],
    );
    assert_eq!(outcomes[0].status, RuleStatus::Skipped);
    assert_eq!(outcomes[1].status, RuleStatus::Failed);
    assert_eq!(outcomes[1].action, RuleAction::Block);
    assert!(outcomes[1].validations[0].message.contains("infra/prod/main.tf"));
  }

  #[test]
  fn non_blocking_security_failure_warns() {
    let policies = PoliciesConfig {
      rules: vec![PolicyRule {
        id: "review-secrets".into(),
        name: "Review secrets".into(),
        category: "security".into(),
        condition: None,
        validations: vec![Validation::Security {
          min_severity: Severity::High,
          blocking: false,
        }],
      }],
      ..PoliciesConfig::default()
    };
    let evaluator = PolicyEvaluator::new(&policies, &TeamConfig::default());
    let outcomes = evaluator.evaluate(&pr("main", &["a.ts"]), &impact(0), &[finding(Severity::High)]);
    let custom = &outcomes[1];
    assert_eq!(custom.validations[0].status, ValidationStatus::Failed);
    assert_eq!(custom.validations[0].escalation, Some(Escalation::Warn));
    assert_eq!(custom.status, RuleStatus::Warning);
    assert_eq!(custom.action, RuleAction::Warn);
  }

  #[test]
  fn unknown_validation_type_is_skipped() {
    let raw = r#"{
      "id": "custom", "name": "Custom",
      "validations": [{"type": "vulnerability_db", "feed": "x"}, {"type": "file_count", "max_files": 1}]
    }"#;
    let rule: PolicyRule = serde_json::from_str(raw).unwrap();
    assert_eq!(rule.category, "general");
    assert_eq!(rule.validations[0], Validation::Unsupported);

    let policies = PoliciesConfig {
      protected_branches: vec![],
      rules: vec![rule],
      ..PoliciesConfig::default()
    };
    let evaluator = PolicyEvaluator::new(&policies, &TeamConfig::default());
    let outcomes = evaluator.evaluate(&pr("main", &["a"]), &impact(0), &[]);
    let custom = &outcomes[1];
    assert_eq!(custom.validations[0].status, ValidationStatus::Skipped);
    assert_eq!(custom.validations[1].status, ValidationStatus::Passed);
    assert_eq!(custom.status, RuleStatus::Passed);
  }

  #[test]
  fn reduce_prefers_block_over_warn() {
    let warn = ValidationOutcome {
      kind: "file_count".into(),
      status: ValidationStatus::Failed,
      escalation: Some(Escalation::Warn),
      message: String::new(),
    };
    let block = ValidationOutcome {
      escalation: Some(Escalation::Block),
      ..warn.clone()
    };
    assert_eq!(reduce(&[warn.clone()]), (RuleStatus::Warning, RuleAction::Warn));
    assert_eq!(reduce(&[warn, block]), (RuleStatus::Failed, RuleAction::Block));
    assert_eq!(reduce(&[]), (RuleStatus::Passed, RuleAction::Allow));
  }
}
