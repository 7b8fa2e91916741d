//! Core types for the triage engine (JSON contracts + stage outputs).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Inbound types (JSON contract: what the caller sends)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
  Added,
  Modified,
  Removed,
  Renamed,
}

/// One changed file as reported by the code host. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
  pub path: String,
  pub status: FileStatus,
  #[serde(default)]
  pub additions: u32,
  #[serde(default)]
  pub deletions: u32,
  /// Total changed lines (additions + deletions as reported upstream).
  #[serde(default)]
  pub changes: u32,
  /// Unified diff text; large or binary files come without one.
  #[serde(default)]
  pub patch: Option<String>,
}

impl FileChange {
  /// Upstream `changes` when reported, otherwise additions + deletions.
  pub fn changed_lines(&self) -> u32 {
    if self.changes > 0 {
      self.changes
    } else {
      self.additions.saturating_add(self.deletions)
    }
  }
}

/// Immutable pull-request snapshot; the input to every pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestSnapshot {
  pub number: u64,
  pub title: String,
  #[serde(default)]
  pub body: Option<String>,
  pub author: String,
  pub source_branch: String,
  pub target_branch: String,
  #[serde(default)]
  pub additions: u32,
  #[serde(default)]
  pub deletions: u32,
  #[serde(default)]
  pub files: Vec<FileChange>,
}

/// CI status as reported by the code host. Anything unrecognised is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CiStatus {
  Success,
  Pending,
  Failure,
  Error,
  #[serde(other)]
  Unknown,
}

impl CiStatus {
  pub fn from_str_loose(s: &str) -> Self {
    match s.to_ascii_lowercase().as_str() {
      "success" | "passed" | "green" => Self::Success,
      "pending" | "running" | "queued" => Self::Pending,
      "failure" | "failed" | "red" => Self::Failure,
      "error" | "errored" => Self::Error,
      _ => Self::Unknown,
    }
  }

  pub fn is_failing(self) -> bool {
    matches!(self, Self::Failure | Self::Error)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Success => "success",
      Self::Pending => "pending",
      Self::Failure => "failure",
      Self::Error => "error",
      Self::Unknown => "unknown",
    }
  }
}

/// Optional review signals that feed the decision stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSignals {
  #[serde(default)]
  pub approvals: Option<u32>,
  #[serde(default)]
  pub ci_status: Option<CiStatus>,
}

/// One request: a snapshot plus whatever review signals the caller fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
  pub pull_request: PullRequestSnapshot,
  #[serde(default, flatten)]
  pub signals: ReviewSignals,
}

// ---------------------------------------------------------------------------
// Ordered enums (severity, confidence, impact level)
// ---------------------------------------------------------------------------

/// Finding severity; total order low < medium < high < critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Low,
  Medium,
  High,
  Critical,
}

impl Severity {
  pub fn rank(self) -> u8 {
    match self {
      Self::Low => 0,
      Self::Medium => 1,
      Self::High => 2,
      Self::Critical => 3,
    }
  }

  pub fn at_least(self, min: Severity) -> bool {
    self >= min
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Low => "low",
      Self::Medium => "medium",
      Self::High => "high",
      Self::Critical => "critical",
    }
  }
}

impl PartialOrd for Severity {
  fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Severity {
  fn cmp(&self, other: &Self) -> std::cmp::Ordering {
    self.rank().cmp(&other.rank())
  }
}

/// Detection confidence; total order low < medium < high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
  Low,
  Medium,
  High,
}

impl Confidence {
  pub fn rank(self) -> u8 {
    match self {
      Self::Low => 0,
      Self::Medium => 1,
      Self::High => 2,
    }
  }
}

impl PartialOrd for Confidence {
  fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Confidence {
  fn cmp(&self, other: &Self) -> std::cmp::Ordering {
    self.rank().cmp(&other.rank())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
  Low,
  Medium,
  High,
  Critical,
}

// ---------------------------------------------------------------------------
// Blast radius
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSignalKind {
  BlockedPath,
  ConfigChange,
  AuthChange,
  CriticalPath,
}

/// A contextual multiplier triggered by one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSignal {
  pub kind: RiskSignalKind,
  pub multiplier: f64,
  pub file: String,
}

/// Counts that contributed to a sub-score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpactBreakdown {
  pub files: usize,
  pub lines: u32,
  #[serde(default, skip_serializing_if = "is_zero")]
  pub critical_files: usize,
  #[serde(default, skip_serializing_if = "is_zero")]
  pub safe_files: usize,
  #[serde(default, skip_serializing_if = "is_zero_f64")]
  pub critical_points: f64,
  #[serde(default, skip_serializing_if = "is_zero_f64")]
  pub safe_reduction: f64,
}

fn is_zero(n: &usize) -> bool {
  *n == 0
}

fn is_zero_f64(n: &f64) -> bool {
  *n == 0.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubImpact {
  pub score: f64,
  pub level: ImpactLevel,
  pub breakdown: ImpactBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactResult {
  /// Final blast-radius score, 0–100.
  pub score: u8,
  pub code: SubImpact,
  pub test: SubImpact,
  pub dependency: SubImpact,
  pub risk_signals: Vec<RiskSignal>,
}

// ---------------------------------------------------------------------------
// Security findings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingKind {
  Secret,
  Injection,
  Dependency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
  pub kind: FindingKind,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub pattern: Option<String>,
  pub severity: Severity,
  pub confidence: Confidence,
  /// `file:line`, or the bare path for file-level findings.
  pub location: String,
  pub snippet: String,
  pub description: String,
}

// ---------------------------------------------------------------------------
// Policy outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
  Passed,
  Failed,
  Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Escalation {
  Block,
  Warn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
  pub kind: String,
  pub status: ValidationStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub escalation: Option<Escalation>,
  pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
  Passed,
  Warning,
  Failed,
  Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
  Allow,
  Warn,
  Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
  pub rule_id: String,
  pub name: String,
  pub category: String,
  pub status: RuleStatus,
  pub action: RuleAction,
  pub validations: Vec<ValidationOutcome>,
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
  AutoApprove,
  AutoApproveComment,
  RequireReview,
  RequireSeniorReview,
  Block,
}

impl DecisionAction {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::AutoApprove => "auto_approve",
      Self::AutoApproveComment => "auto_approve_comment",
      Self::RequireReview => "require_review",
      Self::RequireSeniorReview => "require_senior_review",
      Self::Block => "block",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorName {
  SecurityFindings,
  BlastRadius,
  PolicyCompliance,
  Approvals,
  CiStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorImpact {
  Positive,
  Neutral,
  Negative,
}

impl FactorImpact {
  pub fn from_score(score: f64) -> Self {
    if score >= 0.8 {
      Self::Positive
    } else if score >= 0.5 {
      Self::Neutral
    } else {
      Self::Negative
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionFactor {
  pub name: FactorName,
  pub impact: FactorImpact,
  /// Normalized factor score in [0, 1].
  pub score: f64,
  pub weight: f64,
  pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
  pub id: Uuid,
  pub action: DecisionAction,
  /// Weighted factor sum in [0, 1]; not renormalized when optional factors are absent.
  pub confidence: f64,
  pub reasoning: String,
  pub factors: Vec<DecisionFactor>,
  pub recommendations: Vec<String>,
  pub next_steps: Vec<String>,
  pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Pipeline output (JSON contract: what we emit)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
  pub impact: ImpactResult,
  pub findings: Vec<Finding>,
  pub rules: Vec<RuleOutcome>,
  pub decision: Decision,
}
